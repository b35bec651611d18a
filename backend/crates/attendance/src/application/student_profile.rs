//! Student Profile Use Cases
//!
//! Profile upsert and attendance history listing.

use crate::domain::entities::{AttendanceHistoryEntry, StudentProfile};
use crate::domain::repository::StudentProfileRepository;
use crate::domain::value_objects::{Email, StudentId};
use crate::error::{AttendanceError, AttendanceResult};
use std::sync::Arc;

/// Input DTO for update profile
#[derive(Debug, Clone)]
pub struct UpdateProfileInput {
    pub student_id: StudentId,
    pub email: Email,
    pub display_name: Option<String>,
    pub roll_no: Option<String>,
}

/// Student Profile Use Case
pub struct StudentProfileUseCase<R>
where
    R: StudentProfileRepository,
{
    repo: Arc<R>,
}

impl<R> StudentProfileUseCase<R>
where
    R: StudentProfileRepository,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Create or update a profile, keeping any enrolled face
    pub async fn update(&self, input: UpdateProfileInput) -> AttendanceResult<StudentProfile> {
        let existing = self.repo.find_profile(&input.student_id).await?;

        let profile = StudentProfile {
            student_id: input.student_id,
            email: input.email,
            display_name: normalize(input.display_name),
            roll_no: normalize(input.roll_no),
            enrolled_face: existing.and_then(|p| p.enrolled_face),
        };
        self.repo.upsert_profile(&profile).await?;

        tracing::info!(student_id = %profile.student_id, "Student profile saved");

        Ok(profile)
    }

    pub async fn get(&self, student_id: &StudentId) -> AttendanceResult<StudentProfile> {
        self.repo
            .find_profile(student_id)
            .await?
            .ok_or(AttendanceError::StudentNotFound)
    }

    /// Attendance history, newest first
    pub async fn history(
        &self,
        student_id: &StudentId,
    ) -> AttendanceResult<Vec<AttendanceHistoryEntry>> {
        if self.repo.find_profile(student_id).await?.is_none() {
            return Err(AttendanceError::StudentNotFound);
        }
        self.repo.history(student_id).await
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
