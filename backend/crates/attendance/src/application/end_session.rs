//! End Session Use Case

use crate::domain::repository::SessionRepository;
use crate::domain::value_objects::{ProfessorId, SessionId};
use crate::error::{AttendanceError, AttendanceResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Output DTO for end session
#[derive(Debug, Clone)]
pub struct EndSessionOutput {
    pub session_id: SessionId,
    pub ended_at: Option<DateTime<Utc>>,
    /// `false` when the session had already been ended
    pub changed: bool,
}

/// End Session Use Case
///
/// Ending is idempotent and never reactivates a session.
pub struct EndSessionUseCase<R>
where
    R: SessionRepository,
{
    repo: Arc<R>,
}

impl<R> EndSessionUseCase<R>
where
    R: SessionRepository,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub async fn execute(
        &self,
        session_id: SessionId,
        professor_id: ProfessorId,
    ) -> AttendanceResult<EndSessionOutput> {
        let session = self
            .repo
            .find_session(&session_id)
            .await?
            .ok_or(AttendanceError::SessionNotFound)?;

        if !session.is_owned_by(&professor_id) {
            tracing::warn!(
                session_id = %session_id,
                professor_id = %professor_id,
                "End requested by a professor who does not own the session"
            );
            return Err(AttendanceError::NotSessionOwner);
        }

        if !session.active {
            tracing::info!(session_id = %session_id, "Session already ended");
            return Ok(EndSessionOutput {
                session_id,
                ended_at: session.ended_at,
                changed: false,
            });
        }

        let now = Utc::now();
        let changed = self.repo.end_session(&session_id, now).await?;

        let ended_at = if changed {
            tracing::info!(session_id = %session_id, "Attendance session ended");
            Some(now)
        } else {
            // Lost a race with another end request
            self.repo
                .find_session(&session_id)
                .await?
                .and_then(|s| s.ended_at)
        };

        Ok(EndSessionOutput {
            session_id,
            ended_at,
            changed,
        })
    }
}
