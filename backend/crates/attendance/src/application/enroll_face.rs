//! Enroll Face Use Case

use crate::application::config::AttendanceConfig;
use crate::domain::entities::EnrolledFace;
use crate::domain::repository::StudentProfileRepository;
use crate::domain::services::FaceMatchService;
use crate::domain::value_objects::{Photo, StudentId};
use crate::error::{AttendanceError, AttendanceResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::timeout;

/// Output DTO for enroll face
#[derive(Debug, Clone)]
pub struct EnrollFaceOutput {
    pub student_id: StudentId,
    pub enrolled_at: DateTime<Utc>,
    pub message: String,
}

/// Enroll Face Use Case
///
/// The face service acts as a gate: the photo is stored only when the
/// service accepts it. A new enrollment replaces the previous one.
pub struct EnrollFaceUseCase<R, F>
where
    R: StudentProfileRepository,
    F: FaceMatchService,
{
    repo: Arc<R>,
    face_match: Arc<F>,
    config: Arc<AttendanceConfig>,
}

impl<R, F> EnrollFaceUseCase<R, F>
where
    R: StudentProfileRepository,
    F: FaceMatchService,
{
    pub fn new(repo: Arc<R>, face_match: Arc<F>, config: Arc<AttendanceConfig>) -> Self {
        Self {
            repo,
            face_match,
            config,
        }
    }

    pub async fn execute(
        &self,
        student_id: StudentId,
        photo: Photo,
    ) -> AttendanceResult<EnrollFaceOutput> {
        if self.repo.find_profile(&student_id).await?.is_none() {
            return Err(AttendanceError::StudentNotFound);
        }

        let receipt = timeout(
            self.config.face_match_timeout,
            self.face_match.enroll(&photo, &student_id),
        )
        .await
        .map_err(|_| AttendanceError::FaceServiceTimeout)??;

        if !receipt.success {
            tracing::info!(
                student_id = %student_id,
                photo = %photo.digest(),
                message = %receipt.message,
                "Enrollment rejected by face service"
            );
            return Err(AttendanceError::EnrollmentRejected(receipt.message));
        }

        let face = EnrolledFace {
            photo,
            enrolled_at: Utc::now(),
        };
        self.repo.set_enrolled_face(&student_id, &face).await?;

        tracing::info!(
            student_id = %student_id,
            photo = %face.photo.digest(),
            "Face enrolled"
        );

        Ok(EnrollFaceOutput {
            student_id,
            enrolled_at: face.enrolled_at,
            message: receipt.message,
        })
    }
}
