//! Domain Entities
//!
//! Core business entities for the attendance domain.

use crate::domain::value_objects::{
    AttendanceStatus, Email, Geofence, LectureDetails, Photo, ProfessorId, SessionId, StudentId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of id characters used for the fallback roll number
const ROLL_NO_PREFIX_LEN: usize = 4;

/// Lecture session - one professor-initiated attendance window
#[derive(Debug, Clone)]
pub struct LectureSession {
    pub id: SessionId,
    pub professor_id: ProfessorId,
    pub details: LectureDetails,
    pub geofence: Option<Geofence>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl LectureSession {
    /// Open a new, active session
    pub fn open(
        professor_id: ProfessorId,
        details: LectureDetails,
        geofence: Option<Geofence>,
    ) -> Self {
        Self {
            id: SessionId::generate(),
            professor_id,
            details,
            geofence,
            active: true,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn is_owned_by(&self, professor_id: &ProfessorId) -> bool {
        &self.professor_id == professor_id
    }
}

/// One student's entry in a session's roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRecord {
    pub student_id: StudentId,
    pub name: String,
    pub roll_no: String,
    pub email: Email,
    pub checked_in_at: DateTime<Utc>,
}

impl CheckInRecord {
    pub fn for_student(profile: &StudentProfile, checked_in_at: DateTime<Utc>) -> Self {
        Self {
            student_id: profile.student_id,
            name: profile.name(),
            roll_no: profile.roll_no(),
            email: profile.email.clone(),
            checked_in_at,
        }
    }
}

/// Reference photo a student registered for face matching
#[derive(Debug, Clone)]
pub struct EnrolledFace {
    pub photo: Photo,
    pub enrolled_at: DateTime<Utc>,
}

/// Student profile
#[derive(Debug, Clone)]
pub struct StudentProfile {
    pub student_id: StudentId,
    pub email: Email,
    pub display_name: Option<String>,
    pub roll_no: Option<String>,
    pub enrolled_face: Option<EnrolledFace>,
}

impl StudentProfile {
    pub fn new(student_id: StudentId, email: Email) -> Self {
        Self {
            student_id,
            email,
            display_name: None,
            roll_no: None,
            enrolled_face: None,
        }
    }

    /// Display name, falling back to the email local part
    pub fn name(&self) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.email.local_part().to_string(),
        }
    }

    /// Roll number, falling back to `S` plus the start of the student id
    pub fn roll_no(&self) -> String {
        match self.roll_no.as_deref().map(str::trim) {
            Some(roll) if !roll.is_empty() => roll.to_string(),
            _ => {
                let id = self.student_id.to_string();
                format!("S{}", &id[..ROLL_NO_PREFIX_LEN])
            }
        }
    }

    pub fn is_enrolled(&self) -> bool {
        self.enrolled_face.is_some()
    }
}

/// One line of a student's attendance history
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceHistoryEntry {
    pub session_id: SessionId,
    pub subject: String,
    pub date: String,
    pub status: AttendanceStatus,
    pub recorded_at: DateTime<Utc>,
}

impl AttendanceHistoryEntry {
    pub fn present(session: &LectureSession, recorded_at: DateTime<Utc>) -> Self {
        Self {
            session_id: session.id.clone(),
            subject: session.details.subject.clone(),
            date: session.details.lecture_date.clone(),
            status: AttendanceStatus::Present,
            recorded_at,
        }
    }
}
