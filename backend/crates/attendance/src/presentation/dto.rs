//! API DTOs (Data Transfer Objects)

use crate::domain::check_in::{CheckInState, CheckInTransition, CommitOutcome};
use crate::domain::entities::{AttendanceHistoryEntry, StudentProfile};
use crate::domain::value_objects::{
    GeoPoint, Geofence, LectureDetails, ProfessorId, SessionId, StudentId,
};
use chrono::{DateTime, Utc};
use kernel::error::app_error::AppResult;
use serde::{Deserialize, Serialize};

/// Position as reported by the browser geolocation API
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PositionDto {
    pub latitude: f64,
    pub longitude: f64,
}

impl PositionDto {
    pub fn into_point(self) -> AppResult<GeoPoint> {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceDto {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
}

impl GeofenceDto {
    pub fn into_geofence(self) -> AppResult<Geofence> {
        Geofence::new(GeoPoint::new(self.latitude, self.longitude)?, self.radius_m)
    }
}

/// Request for POST /api/attendance/sessions
///
/// Missing lecture fields are reported by validation, not by the parser.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub professor_id: ProfessorId,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub division: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub lecture_date: String,
    #[serde(default)]
    pub lecture_time: String,
    #[serde(default)]
    pub geofence: Option<GeofenceDto>,
}

impl CreateSessionRequest {
    pub fn details(&self) -> LectureDetails {
        LectureDetails {
            department: self.department.clone(),
            year: self.year.clone(),
            division: self.division.clone(),
            subject: self.subject.clone(),
            lecture_date: self.lecture_date.clone(),
            lecture_time: self.lecture_time.clone(),
        }
    }
}

/// Response for POST /api/attendance/sessions
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub entry_url: String,
    pub details: LectureDetails,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Request for POST /api/attendance/sessions/{id}/end
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionRequest {
    pub professor_id: ProfessorId,
}

/// Response for POST /api/attendance/sessions/{id}/end
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionResponse {
    pub session_id: SessionId,
    pub active: bool,
    pub ended_at: Option<DateTime<Utc>>,
    /// `false` if the session had already been ended
    pub changed: bool,
}

/// Request for POST /api/attendance/check-in
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub session_id: String,
    pub student_id: StudentId,
    #[serde(default)]
    pub position: Option<PositionDto>,
    /// Frame captured by the browser camera
    #[serde(default)]
    pub photo_data_uri: Option<String>,
}

/// Response for POST /api/attendance/check-in
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    pub state: &'static str,
    pub progress: u8,
    pub checked_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub trace: Vec<CheckInTransition>,
}

impl CheckInResponse {
    pub fn from_attempt(state: &CheckInState, trace: &[CheckInTransition]) -> Self {
        let (checked_in, confidence, commit) = match state {
            CheckInState::VerifiedOk { confidence, commit } => {
                (true, Some(*confidence), Some(*commit))
            }
            _ => (false, None, None),
        };

        Self {
            state: state.name(),
            progress: state.progress(),
            checked_in,
            confidence,
            commit,
            message: state.failure().map(|reason| reason.message()),
            trace: trace.to_vec(),
        }
    }
}

/// Request for PUT /api/attendance/students/{id}/profile
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub roll_no: Option<String>,
}

/// Response for student profile routes
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub student_id: StudentId,
    pub email: String,
    pub name: String,
    pub roll_no: String,
    pub enrolled: bool,
    pub enrolled_at: Option<DateTime<Utc>>,
}

impl From<&StudentProfile> for ProfileResponse {
    fn from(profile: &StudentProfile) -> Self {
        Self {
            student_id: profile.student_id,
            email: profile.email.to_string(),
            name: profile.name(),
            roll_no: profile.roll_no(),
            enrolled: profile.is_enrolled(),
            enrolled_at: profile.enrolled_face.as_ref().map(|f| f.enrolled_at),
        }
    }
}

/// Request for POST /api/attendance/students/{id}/enrollment
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRequest {
    pub photo_data_uri: String,
}

/// Response for POST /api/attendance/students/{id}/enrollment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentResponse {
    pub student_id: StudentId,
    pub enrolled_at: DateTime<Utc>,
    pub message: String,
}

/// Response for GET /api/attendance/students/{id}/history
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub student_id: StudentId,
    pub entries: Vec<AttendanceHistoryEntry>,
}

/// Request for POST /api/attendance/entry-url/resolve
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveEntryUrlRequest {
    /// Text decoded from the QR code
    pub text: String,
}

/// Response for POST /api/attendance/entry-url/resolve
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveEntryUrlResponse {
    pub session_id: SessionId,
    pub subject: String,
    pub active: bool,
}
