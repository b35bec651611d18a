//! In-memory Repository Implementation
//!
//! Keeps everything in one mutex-guarded map set. Used by tests and local
//! runs without a database; semantics match the PostgreSQL repository.

use crate::domain::entities::{
    AttendanceHistoryEntry, CheckInRecord, EnrolledFace, LectureSession, StudentProfile,
};
use crate::domain::events::{SessionChange, SessionFeed};
use crate::domain::repository::{
    AppendCheckIn, AttendanceLedger, SessionRepository, StudentProfileRepository,
};
use crate::domain::value_objects::{SessionId, StudentId};
use crate::error::{AttendanceError, AttendanceResult};
use crate::infra::live_feed::SessionFeedHub;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct StoreState {
    sessions: HashMap<SessionId, LectureSession>,
    rosters: HashMap<SessionId, Vec<CheckInRecord>>,
    profiles: HashMap<StudentId, StudentProfile>,
    history: HashMap<StudentId, Vec<AttendanceHistoryEntry>>,
}

/// In-memory store for sessions, ledger and profiles
#[derive(Clone)]
pub struct InMemoryAttendanceStore {
    state: Arc<Mutex<StoreState>>,
    feed: Arc<SessionFeedHub>,
}

impl InMemoryAttendanceStore {
    /// Create an empty store publishing to `feed`
    pub fn new(feed: Arc<SessionFeedHub>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            feed,
        }
    }

    pub fn feed(&self) -> Arc<SessionFeedHub> {
        self.feed.clone()
    }

    /// Number of roster records of a session
    pub fn roster_len(&self, session_id: &SessionId) -> usize {
        self.lock().rosters.get(session_id).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionRepository for InMemoryAttendanceStore {
    async fn create_session(&self, session: &LectureSession) -> AttendanceResult<()> {
        let mut state = self.lock();
        if state.sessions.contains_key(&session.id) {
            return Err(AttendanceError::Internal(format!(
                "session {} already exists",
                session.id
            )));
        }
        state.sessions.insert(session.id.clone(), session.clone());
        state.rosters.insert(session.id.clone(), Vec::new());
        Ok(())
    }

    async fn find_session(&self, session_id: &SessionId) -> AttendanceResult<Option<LectureSession>> {
        Ok(self.lock().sessions.get(session_id).cloned())
    }

    async fn end_session(
        &self,
        session_id: &SessionId,
        ended_at: DateTime<Utc>,
    ) -> AttendanceResult<bool> {
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or(AttendanceError::SessionNotFound)?;

        if !session.active {
            return Ok(false);
        }
        session.active = false;
        session.ended_at = Some(ended_at);

        self.feed.publish(SessionChange::Ended {
            session_id: session_id.clone(),
            ended_at,
        });
        Ok(true)
    }

    async fn roster(&self, session_id: &SessionId) -> AttendanceResult<Vec<CheckInRecord>> {
        Ok(self
            .lock()
            .rosters
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl AttendanceLedger for InMemoryAttendanceStore {
    async fn append_check_in(
        &self,
        session_id: &SessionId,
        record: &CheckInRecord,
    ) -> AttendanceResult<AppendCheckIn> {
        let mut state = self.lock();
        let active = state
            .sessions
            .get(session_id)
            .map(|s| s.active)
            .ok_or(AttendanceError::SessionNotFound)?;

        if !active {
            return Ok(AppendCheckIn::AlreadyEnded);
        }

        let roster = state.rosters.entry(session_id.clone()).or_default();
        if roster.iter().any(|r| r.student_id == record.student_id) {
            return Ok(AppendCheckIn::Duplicate);
        }
        roster.push(record.clone());

        // Published under the lock so subscribers see commit order
        self.feed.publish(SessionChange::CheckedIn {
            session_id: session_id.clone(),
            record: record.clone(),
        });
        Ok(AppendCheckIn::Recorded)
    }

    async fn append_history(
        &self,
        student_id: &StudentId,
        entry: &AttendanceHistoryEntry,
    ) -> AttendanceResult<()> {
        let mut state = self.lock();
        let history = state.history.entry(*student_id).or_default();
        // First entry per session wins
        if !history.iter().any(|e| e.session_id == entry.session_id) {
            history.push(entry.clone());
        }
        Ok(())
    }
}

impl StudentProfileRepository for InMemoryAttendanceStore {
    async fn find_profile(&self, student_id: &StudentId) -> AttendanceResult<Option<StudentProfile>> {
        Ok(self.lock().profiles.get(student_id).cloned())
    }

    async fn upsert_profile(&self, profile: &StudentProfile) -> AttendanceResult<()> {
        self.lock()
            .profiles
            .entry(profile.student_id)
            .and_modify(|existing| {
                existing.email = profile.email.clone();
                existing.display_name = profile.display_name.clone();
                existing.roll_no = profile.roll_no.clone();
            })
            .or_insert_with(|| profile.clone());
        Ok(())
    }

    async fn set_enrolled_face(
        &self,
        student_id: &StudentId,
        face: &EnrolledFace,
    ) -> AttendanceResult<()> {
        let mut state = self.lock();
        let profile = state
            .profiles
            .get_mut(student_id)
            .ok_or(AttendanceError::StudentNotFound)?;
        profile.enrolled_face = Some(face.clone());
        Ok(())
    }

    async fn history(&self, student_id: &StudentId) -> AttendanceResult<Vec<AttendanceHistoryEntry>> {
        let mut entries = self
            .lock()
            .history
            .get(student_id)
            .cloned()
            .unwrap_or_default();
        entries.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(entries)
    }
}
