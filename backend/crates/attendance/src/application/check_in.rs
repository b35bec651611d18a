//! Check-in State Machine
//!
//! Drives one student's attempt through session check, location check,
//! camera capture, face verification and the ledger write. Each attempt
//! is its own value; concurrent students only meet in the ledger.

use crate::application::config::AttendanceConfig;
use crate::domain::check_in::{CheckInState, CheckInTransition, CommitOutcome, FailureReason};
use crate::domain::entities::{
    AttendanceHistoryEntry, CheckInRecord, LectureSession, StudentProfile,
};
use crate::domain::repository::{AppendCheckIn, AttendanceLedger, SessionRepository};
use crate::domain::services::{
    ActiveCamera, Camera, FaceMatchService, LocationCheck, LocationVerdict,
};
use crate::domain::value_objects::{GeoPoint, SessionId};
use crate::error::{AttendanceError, AttendanceResult};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Everything the attempt needs to know about the student and the session
#[derive(Debug, Clone)]
pub struct CheckInContext {
    pub session_id: SessionId,
    pub student: StudentProfile,
    /// Device position, if the browser shared one
    pub position: Option<GeoPoint>,
}

/// Check-in State Machine
pub struct CheckInStateMachine<R, F, L, C>
where
    R: SessionRepository + AttendanceLedger + Send + Sync + 'static,
    F: FaceMatchService + Send + Sync + 'static,
    L: LocationCheck + Send + Sync + 'static,
    C: Camera + Send + Sync + 'static,
{
    repo: Arc<R>,
    face_match: Arc<F>,
    location: Arc<L>,
    camera: Arc<C>,
    config: Arc<AttendanceConfig>,
    context: CheckInContext,
    state: CheckInState,
    session: Option<LectureSession>,
    active_camera: Option<ActiveCamera>,
    trace: Vec<CheckInTransition>,
    observer: Option<mpsc::UnboundedSender<CheckInTransition>>,
}

impl<R, F, L, C> CheckInStateMachine<R, F, L, C>
where
    R: SessionRepository + AttendanceLedger + Send + Sync + 'static,
    F: FaceMatchService + Send + Sync + 'static,
    L: LocationCheck + Send + Sync + 'static,
    C: Camera + Send + Sync + 'static,
{
    pub fn new(
        repo: Arc<R>,
        face_match: Arc<F>,
        location: Arc<L>,
        camera: Arc<C>,
        config: Arc<AttendanceConfig>,
        context: CheckInContext,
    ) -> Self {
        Self {
            repo,
            face_match,
            location,
            camera,
            config,
            context,
            state: CheckInState::Idle,
            session: None,
            active_camera: None,
            trace: vec![CheckInTransition::new(CheckInState::Idle, Utc::now())],
            observer: None,
        }
    }

    /// Forward every transition to `observer`
    pub fn observe(mut self, observer: mpsc::UnboundedSender<CheckInTransition>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> &CheckInState {
        &self.state
    }

    /// Transitions of the current attempt, starting with `idle`
    pub fn trace(&self) -> &[CheckInTransition] {
        &self.trace
    }

    pub fn camera_active(&self) -> bool {
        self.active_camera.is_some()
    }

    /// Check the session, then the location, then open the camera
    pub async fn start(&mut self) -> AttendanceResult<&CheckInState> {
        self.expect_state(matches!(self.state, CheckInState::Idle), "start")?;

        let session = match self.repo.find_session(&self.context.session_id).await? {
            Some(session) => session,
            None => {
                self.transition(CheckInState::VerifiedFail {
                    reason: FailureReason::SessionNotFound,
                });
                return Ok(&self.state);
            }
        };
        if !session.active {
            self.transition(CheckInState::VerifiedFail {
                reason: FailureReason::SessionEnded,
            });
            return Ok(&self.state);
        }

        self.transition(CheckInState::Locating);
        let verdict = timeout(
            self.config.location_timeout,
            self.location
                .check(self.context.position.as_ref(), session.geofence.as_ref()),
        )
        .await;
        self.session = Some(session);

        match verdict {
            Ok(LocationVerdict::Allowed) => self.transition(CheckInState::LocationOk),
            Ok(LocationVerdict::Denied { reason }) => {
                self.transition(CheckInState::LocationFail {
                    reason: FailureReason::OutsideGeofence { detail: reason },
                });
                return Ok(&self.state);
            }
            Err(_) => {
                self.transition(CheckInState::LocationFail {
                    reason: FailureReason::LocationTimedOut,
                });
                return Ok(&self.state);
            }
        }

        match timeout(self.config.camera_timeout, self.camera.acquire()).await {
            Ok(Ok(stream)) => {
                self.active_camera = Some(ActiveCamera::new(stream));
                self.transition(CheckInState::CameraOn);
            }
            Ok(Err(e)) => self.transition(CheckInState::DeviceFail {
                reason: FailureReason::CameraUnavailable {
                    detail: e.to_string(),
                },
            }),
            Err(_) => self.transition(CheckInState::DeviceFail {
                reason: FailureReason::CameraUnavailable {
                    detail: "camera did not start in time".to_string(),
                },
            }),
        }

        Ok(&self.state)
    }

    /// Take one frame, release the camera and verify it
    pub async fn capture(&mut self) -> AttendanceResult<&CheckInState> {
        self.expect_state(matches!(self.state, CheckInState::CameraOn), "capture")?;

        let camera = self
            .active_camera
            .take()
            .ok_or_else(|| AttendanceError::Internal("camera stream missing".to_string()))?;

        let frame = match camera.capture_and_release() {
            Ok(frame) => frame,
            Err(e) => {
                self.transition(CheckInState::DeviceFail {
                    reason: FailureReason::CameraUnavailable {
                        detail: e.to_string(),
                    },
                });
                return Ok(&self.state);
            }
        };

        tracing::debug!(
            session_id = %self.context.session_id,
            student_id = %self.context.student.student_id,
            photo = %frame.digest(),
            "Frame captured"
        );
        self.transition(CheckInState::Verifying);

        let Some(enrolled) = self.context.student.enrolled_face.as_ref() else {
            self.transition(CheckInState::VerifiedFail {
                reason: FailureReason::NotEnrolled,
            });
            return Ok(&self.state);
        };

        let label = self.context.student.name();
        let verdict = timeout(
            self.config.face_match_timeout,
            self.face_match.compare(&frame, &enrolled.photo, &label),
        )
        .await;

        match verdict {
            Ok(Ok(verdict)) if verdict.is_match => {
                self.commit(verdict.confidence.clamp(0.0, 1.0)).await;
            }
            Ok(Ok(verdict)) => self.transition(CheckInState::VerifiedFail {
                reason: FailureReason::NoMatch {
                    reason: verdict.reason,
                },
            }),
            Ok(Err(e)) => {
                e.log();
                self.transition(CheckInState::VerifiedFail {
                    reason: FailureReason::ServiceError {
                        detail: e.to_string(),
                    },
                });
            }
            Err(_) => self.transition(CheckInState::VerifiedFail {
                reason: FailureReason::ServiceTimedOut,
            }),
        }

        Ok(&self.state)
    }

    /// Begin a new attempt from `idle`
    pub fn restart(&mut self) -> AttendanceResult<&CheckInState> {
        self.expect_state(self.state.is_terminal(), "restart")?;

        self.active_camera = None;
        self.session = None;
        self.state = CheckInState::Idle;
        self.trace = vec![CheckInTransition::new(CheckInState::Idle, Utc::now())];
        tracing::info!(
            session_id = %self.context.session_id,
            student_id = %self.context.student.student_id,
            "Check-in restarted"
        );

        Ok(&self.state)
    }

    /// Run a whole attempt, capturing as soon as the camera is on
    pub async fn run(&mut self) -> AttendanceResult<CheckInState> {
        self.start().await?;
        if matches!(self.state, CheckInState::CameraOn) {
            self.capture().await?;
        }
        Ok(self.state.clone())
    }

    /// Write the roster record, then the history entry
    async fn commit(&mut self, confidence: f64) {
        let Some(session) = self.session.clone() else {
            self.transition(CheckInState::VerifiedFail {
                reason: FailureReason::SessionNotFound,
            });
            return;
        };

        let now = Utc::now();
        let record = CheckInRecord::for_student(&self.context.student, now);

        let appended = self
            .repo
            .append_check_in(&self.context.session_id, &record)
            .await;

        let recorded = match appended {
            Ok(AppendCheckIn::Recorded) => CommitOutcome::Recorded,
            Ok(AppendCheckIn::Duplicate) => CommitOutcome::AlreadyRecorded,
            Ok(AppendCheckIn::AlreadyEnded) => {
                self.transition(CheckInState::VerifiedFail {
                    reason: FailureReason::SessionEnded,
                });
                return;
            }
            Err(AttendanceError::SessionNotFound) => {
                self.transition(CheckInState::VerifiedFail {
                    reason: FailureReason::SessionNotFound,
                });
                return;
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.context.session_id,
                    student_id = %self.context.student.student_id,
                    error = %e,
                    "Check-in verified but ledger write unconfirmed"
                );
                self.transition(CheckInState::VerifiedOk {
                    confidence,
                    commit: CommitOutcome::LedgerUnconfirmed,
                });
                return;
            }
        };

        let entry = AttendanceHistoryEntry::present(&session, now);
        let commit = match self
            .repo
            .append_history(&self.context.student.student_id, &entry)
            .await
        {
            Ok(()) => recorded,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.context.session_id,
                    student_id = %self.context.student.student_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "History entry pending"
                );
                CommitOutcome::HistoryPending
            }
        };

        self.transition(CheckInState::VerifiedOk { confidence, commit });
    }

    fn expect_state(&self, allowed: bool, action: &'static str) -> AttendanceResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(AttendanceError::InvalidTransition {
                from: self.state.name(),
                action,
            })
        }
    }

    fn transition(&mut self, next: CheckInState) {
        match next.failure() {
            Some(reason) => tracing::warn!(
                session_id = %self.context.session_id,
                student_id = %self.context.student.student_id,
                from = self.state.name(),
                state = next.name(),
                reason = %reason.message(),
                "Check-in failed"
            ),
            None => tracing::info!(
                session_id = %self.context.session_id,
                student_id = %self.context.student.student_id,
                from = self.state.name(),
                state = next.name(),
                progress = next.progress(),
                "Check-in transition"
            ),
        }

        let transition = CheckInTransition::new(next.clone(), Utc::now());
        let closed = self
            .observer
            .as_ref()
            .is_some_and(|observer| observer.send(transition.clone()).is_err());
        if closed {
            self.observer = None;
        }

        self.trace.push(transition);
        self.state = next;
    }
}
