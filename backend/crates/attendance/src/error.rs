//! Attendance Error Types
//!
//! Attendance-specific error variants that integrate with the unified
//! `kernel::error::AppError` system.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Attendance-specific result type alias
pub type AttendanceResult<T> = Result<T, AttendanceError>;

/// Attendance-specific error variants
#[derive(Debug, Error)]
pub enum AttendanceError {
    /// No session with the given id
    #[error("Session not found")]
    SessionNotFound,

    /// Session exists but is no longer accepting check-ins
    #[error("Session has ended")]
    SessionEnded,

    /// No profile for the given student
    #[error("Student not found")]
    StudentNotFound,

    /// Caller does not own the session
    #[error("Only the professor who opened the session can end it")]
    NotSessionOwner,

    /// Action not allowed in the current check-in state
    #[error("Cannot {action} while in state {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },

    /// Face service refused the enrollment photo
    #[error("Enrollment rejected: {0}")]
    EnrollmentRejected(String),

    /// Face service returned an error or an unreadable answer
    #[error("Face service error: {0}")]
    FaceService(String),

    /// Face service did not answer in time
    #[error("Face service timed out")]
    FaceServiceTimeout,

    /// Malformed input
    #[error("{0}")]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AttendanceError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttendanceError::SessionNotFound | AttendanceError::StudentNotFound => {
                ErrorKind::NotFound
            }
            AttendanceError::SessionEnded => ErrorKind::Gone,
            AttendanceError::NotSessionOwner => ErrorKind::Forbidden,
            AttendanceError::InvalidTransition { .. } => ErrorKind::Conflict,
            AttendanceError::EnrollmentRejected(_) => ErrorKind::UnprocessableEntity,
            AttendanceError::FaceService(_) => ErrorKind::BadGateway,
            AttendanceError::FaceServiceTimeout => ErrorKind::GatewayTimeout,
            AttendanceError::Validation(_) => ErrorKind::BadRequest,
            AttendanceError::Database(_) | AttendanceError::Internal(_) => {
                ErrorKind::InternalServerError
            }
        }
    }

    /// Whether repeating the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AttendanceError::Database(_)
                | AttendanceError::FaceService(_)
                | AttendanceError::FaceServiceTimeout
        )
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            AttendanceError::Database(e) => {
                tracing::error!(error = %e, "Attendance database error");
            }
            AttendanceError::Internal(msg) => {
                tracing::error!(message = %msg, "Attendance internal error");
            }
            AttendanceError::FaceService(msg) => {
                tracing::warn!(message = %msg, "Face service failure");
            }
            AttendanceError::FaceServiceTimeout => {
                tracing::warn!("Face service timeout");
            }
            AttendanceError::NotSessionOwner => {
                tracing::warn!("Session end attempted by non-owner");
            }
            _ => {
                tracing::debug!(error = %self, "Attendance error");
            }
        }
    }

    /// Convert into the unified application error
    pub fn to_app_error(&self) -> AppError {
        let err = AppError::new(self.kind(), self.to_string());
        match self {
            AttendanceError::SessionEnded => {
                err.with_action("Ask your professor to open a new session")
            }
            AttendanceError::EnrollmentRejected(_) => {
                err.with_action("Retake the photo with your face clearly visible")
            }
            // Storage details stay in the logs
            AttendanceError::Database(_) => AppError::internal("Database error"),
            _ => err,
        }
    }
}

impl From<AppError> for AttendanceError {
    fn from(err: AppError) -> Self {
        match err.kind() {
            ErrorKind::BadRequest | ErrorKind::UnprocessableEntity => {
                AttendanceError::Validation(err.message().to_string())
            }
            _ => AttendanceError::Internal(err.to_string()),
        }
    }
}

impl From<AttendanceError> for AppError {
    fn from(err: AttendanceError) -> Self {
        err.to_app_error()
    }
}

impl IntoResponse for AttendanceError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}
