//! Check-in states
//!
//! States a student's device walks through for one attempt, the reasons an
//! attempt can fail, and the outcome of the final ledger write.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why an attempt ended in a failure state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum FailureReason {
    SessionNotFound,
    SessionEnded,
    OutsideGeofence { detail: String },
    LocationTimedOut,
    CameraUnavailable { detail: String },
    NotEnrolled,
    NoMatch { reason: String },
    ServiceError { detail: String },
    ServiceTimedOut,
}

impl FailureReason {
    /// Message shown to the student
    pub fn message(&self) -> String {
        match self {
            FailureReason::SessionNotFound => "This attendance session does not exist".to_string(),
            FailureReason::SessionEnded => "Session ended".to_string(),
            FailureReason::OutsideGeofence { detail } => {
                format!("Location check failed: {}", detail)
            }
            FailureReason::LocationTimedOut => {
                "Location check timed out, please try again".to_string()
            }
            FailureReason::CameraUnavailable { detail } => {
                format!("Could not access the camera: {}", detail)
            }
            FailureReason::NotEnrolled => {
                "No enrolled face found. Please enroll your face before checking in".to_string()
            }
            FailureReason::NoMatch { reason } if reason.trim().is_empty() => {
                "Face did not match the enrolled photo".to_string()
            }
            FailureReason::NoMatch { reason } => format!("Face verification failed: {}", reason),
            FailureReason::ServiceError { detail } => {
                format!("Face verification service error: {}", detail)
            }
            FailureReason::ServiceTimedOut => {
                "Face verification timed out, please try again".to_string()
            }
        }
    }
}

/// Result of writing a successful verification to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    /// Roster and history written
    Recorded,
    /// Student was already on the roster; history repaired
    AlreadyRecorded,
    /// On the roster, history entry still missing
    HistoryPending,
    /// Roster write could not be confirmed; a new attempt is safe
    LedgerUnconfirmed,
}

/// State of one check-in attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckInState {
    Idle,
    Locating,
    LocationOk,
    LocationFail { reason: FailureReason },
    DeviceFail { reason: FailureReason },
    CameraOn,
    Verifying,
    VerifiedOk { confidence: f64, commit: CommitOutcome },
    VerifiedFail { reason: FailureReason },
}

impl CheckInState {
    pub fn name(&self) -> &'static str {
        match self {
            CheckInState::Idle => "idle",
            CheckInState::Locating => "locating",
            CheckInState::LocationOk => "location_ok",
            CheckInState::LocationFail { .. } => "location_fail",
            CheckInState::DeviceFail { .. } => "device_fail",
            CheckInState::CameraOn => "camera_on",
            CheckInState::Verifying => "verifying",
            CheckInState::VerifiedOk { .. } => "verified_ok",
            CheckInState::VerifiedFail { .. } => "verified_fail",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckInState::LocationFail { .. }
                | CheckInState::DeviceFail { .. }
                | CheckInState::VerifiedOk { .. }
                | CheckInState::VerifiedFail { .. }
        )
    }

    /// Progress indicator in percent
    ///
    /// Failure states keep the value of the step they failed at.
    pub fn progress(&self) -> u8 {
        match self {
            CheckInState::Idle => 0,
            CheckInState::Locating | CheckInState::LocationFail { .. } => 10,
            CheckInState::LocationOk | CheckInState::DeviceFail { .. } => 33,
            CheckInState::CameraOn => 66,
            CheckInState::Verifying | CheckInState::VerifiedFail { .. } => 80,
            CheckInState::VerifiedOk { .. } => 100,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            CheckInState::LocationFail { reason }
            | CheckInState::DeviceFail { reason }
            | CheckInState::VerifiedFail { reason } => Some(reason),
            _ => None,
        }
    }
}

/// One entry of an attempt's trace
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInTransition {
    pub state: CheckInState,
    pub progress: u8,
    pub at: DateTime<Utc>,
}

impl CheckInTransition {
    pub fn new(state: CheckInState, at: DateTime<Utc>) -> Self {
        Self {
            progress: state.progress(),
            state,
            at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!CheckInState::Idle.is_terminal());
        assert!(!CheckInState::CameraOn.is_terminal());
        assert!(
            CheckInState::DeviceFail {
                reason: FailureReason::CameraUnavailable {
                    detail: "denied".into()
                }
            }
            .is_terminal()
        );
        assert!(
            CheckInState::VerifiedOk {
                confidence: 0.9,
                commit: CommitOutcome::Recorded
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_progress_values() {
        assert_eq!(CheckInState::Locating.progress(), 10);
        assert_eq!(CheckInState::LocationOk.progress(), 33);
        assert_eq!(CheckInState::CameraOn.progress(), 66);
        assert_eq!(CheckInState::Verifying.progress(), 80);
        assert_eq!(
            CheckInState::VerifiedOk {
                confidence: 1.0,
                commit: CommitOutcome::Recorded
            }
            .progress(),
            100
        );
    }

    #[test]
    fn test_state_wire_format() {
        let state = CheckInState::VerifiedFail {
            reason: FailureReason::NoMatch {
                reason: "no face detected".into(),
            },
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "verified_fail");
        assert_eq!(json["reason"]["code"], "no_match");
        assert_eq!(json["reason"]["reason"], "no face detected");
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(FailureReason::SessionEnded.message(), "Session ended");
        assert_eq!(
            FailureReason::NoMatch {
                reason: "no face detected".into()
            }
            .message(),
            "Face verification failed: no face detected"
        );
        assert_eq!(
            FailureReason::NoMatch { reason: "".into() }.message(),
            "Face did not match the enrolled photo"
        );
    }
}
