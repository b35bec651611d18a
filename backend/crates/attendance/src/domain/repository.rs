//! Repository Traits
//!
//! Interfaces for data persistence. Implementations are in the infra layer.

use crate::domain::entities::{
    AttendanceHistoryEntry, CheckInRecord, EnrolledFace, LectureSession, StudentProfile,
};
use crate::domain::value_objects::{SessionId, StudentId};
use crate::error::AttendanceResult;
use chrono::{DateTime, Utc};

/// Result of appending a check-in to a session's roster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendCheckIn {
    /// A new record was written
    Recorded,
    /// The student was already on the roster; nothing changed
    Duplicate,
    /// The session was inactive at write time; nothing changed
    AlreadyEnded,
}

/// Session repository trait
#[trait_variant::make(SessionRepository: Send)]
pub trait LocalSessionRepository {
    /// Persist a newly opened session
    async fn create_session(&self, session: &LectureSession) -> AttendanceResult<()>;

    /// Get session by id
    async fn find_session(&self, session_id: &SessionId) -> AttendanceResult<Option<LectureSession>>;

    /// Flip the active flag to false
    ///
    /// Returns `true` if this call ended the session, `false` if it was
    /// already ended. Fails with `SessionNotFound` for unknown ids.
    async fn end_session(
        &self,
        session_id: &SessionId,
        ended_at: DateTime<Utc>,
    ) -> AttendanceResult<bool>;

    /// Check-in records of a session in commit order
    async fn roster(&self, session_id: &SessionId) -> AttendanceResult<Vec<CheckInRecord>>;
}

/// Attendance ledger trait
#[trait_variant::make(AttendanceLedger: Send)]
pub trait LocalAttendanceLedger {
    /// Add a student to a session's roster
    ///
    /// Keyed by (session, student). The active flag is read together with
    /// the write. Fails with `SessionNotFound` for unknown sessions.
    async fn append_check_in(
        &self,
        session_id: &SessionId,
        record: &CheckInRecord,
    ) -> AttendanceResult<AppendCheckIn>;

    /// Upsert an entry into a student's attendance history
    async fn append_history(
        &self,
        student_id: &StudentId,
        entry: &AttendanceHistoryEntry,
    ) -> AttendanceResult<()>;
}

/// Student profile repository trait
#[trait_variant::make(StudentProfileRepository: Send)]
pub trait LocalStudentProfileRepository {
    /// Get profile by student id
    async fn find_profile(&self, student_id: &StudentId) -> AttendanceResult<Option<StudentProfile>>;

    /// Create or update name, roll number and email
    ///
    /// The enrolled face is left untouched.
    async fn upsert_profile(&self, profile: &StudentProfile) -> AttendanceResult<()>;

    /// Replace the enrolled face. Fails with `StudentNotFound` if no profile exists.
    async fn set_enrolled_face(
        &self,
        student_id: &StudentId,
        face: &EnrolledFace,
    ) -> AttendanceResult<()>;

    /// Attendance history, newest first
    async fn history(&self, student_id: &StudentId) -> AttendanceResult<Vec<AttendanceHistoryEntry>>;
}

/// Everything the HTTP layer needs from one store
pub trait AttendanceStore:
    SessionRepository + AttendanceLedger + StudentProfileRepository + Send + Sync + 'static
{
}

impl<T> AttendanceStore for T where
    T: SessionRepository + AttendanceLedger + StudentProfileRepository + Send + Sync + 'static
{
}
