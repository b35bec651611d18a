//! Create Session Use Case

use crate::application::config::AttendanceConfig;
use crate::domain::entities::LectureSession;
use crate::domain::entry_url::entry_url;
use crate::domain::repository::SessionRepository;
use crate::domain::value_objects::{Geofence, LectureDetails, ProfessorId};
use crate::error::AttendanceResult;
use std::sync::Arc;

/// Input DTO for create session
#[derive(Debug, Clone)]
pub struct CreateSessionInput {
    pub professor_id: ProfessorId,
    pub details: LectureDetails,
    pub geofence: Option<Geofence>,
}

/// Output DTO for create session
#[derive(Debug, Clone)]
pub struct CreateSessionOutput {
    pub session: LectureSession,
    /// Link encoded in the QR code
    pub entry_url: String,
}

/// Create Session Use Case
pub struct CreateSessionUseCase<R>
where
    R: SessionRepository,
{
    repo: Arc<R>,
    config: Arc<AttendanceConfig>,
}

impl<R> CreateSessionUseCase<R>
where
    R: SessionRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AttendanceConfig>) -> Self {
        Self { repo, config }
    }

    pub async fn execute(&self, input: CreateSessionInput) -> AttendanceResult<CreateSessionOutput> {
        let details = input.details.validate()?;
        let session = LectureSession::open(input.professor_id, details, input.geofence);

        let entry_url = entry_url(&self.config.public_base_url, &session.id)?;
        self.repo.create_session(&session).await?;

        tracing::info!(
            session_id = %session.id,
            professor_id = %session.professor_id,
            subject = %session.details.subject,
            geofenced = session.geofence.is_some(),
            "Attendance session opened"
        );

        Ok(CreateSessionOutput { session, entry_url })
    }
}
