//! Lecture metadata and attendance status

use kernel::error::app_error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Scheduling details copied into a session at creation
///
/// Values are kept verbatim. Only presence is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LectureDetails {
    pub department: String,
    pub year: String,
    pub division: String,
    pub subject: String,
    pub lecture_date: String,
    pub lecture_time: String,
}

impl LectureDetails {
    /// Check that every field is filled in
    pub fn validate(self) -> AppResult<Self> {
        let fields = [
            ("department", &self.department),
            ("year", &self.year),
            ("division", &self.division),
            ("subject", &self.subject),
            ("lectureDate", &self.lecture_date),
            ("lectureTime", &self.lecture_time),
        ];

        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(self)
        } else {
            Err(AppError::bad_request(format!(
                "Missing lecture details: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Outcome stored in a student's attendance history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }

    pub fn from_db(value: &str) -> AppResult<Self> {
        match value {
            "Present" => Ok(AttendanceStatus::Present),
            "Absent" => Ok(AttendanceStatus::Absent),
            other => Err(AppError::internal(format!(
                "Unknown attendance status: {}",
                other
            ))),
        }
    }
}
