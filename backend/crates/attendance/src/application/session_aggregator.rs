//! Session Aggregator
//!
//! Read-only live view of one session for the professor's dashboard:
//! roster, distinct check-in count and active/ended status. The view is
//! loaded from the ledger once and then kept current from the session's
//! change feed.

use crate::domain::entities::{CheckInRecord, LectureSession};
use crate::domain::events::{SessionChange, SessionFeed};
use crate::domain::repository::SessionRepository;
use crate::domain::value_objects::{LectureDetails, SessionId};
use crate::error::{AttendanceError, AttendanceResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// Aggregated state of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: SessionId,
    pub details: LectureDetails,
    pub active: bool,
    pub ended_at: Option<DateTime<Utc>>,
    pub roster: Vec<CheckInRecord>,
    /// Distinct students on the roster
    pub count: usize,
}

impl SessionView {
    pub fn new(session: &LectureSession, roster: Vec<CheckInRecord>) -> Self {
        let mut view = Self {
            session_id: session.id.clone(),
            details: session.details.clone(),
            active: session.active,
            ended_at: session.ended_at,
            roster: Vec::with_capacity(roster.len()),
            count: 0,
        };
        for record in roster {
            view.add(record);
        }
        view
    }

    /// Apply one change. Returns `true` if the view changed.
    ///
    /// Changes already reflected in the view are ignored, so replaying a
    /// change is harmless.
    pub fn apply(&mut self, change: &SessionChange) -> bool {
        if change.session_id() != &self.session_id {
            return false;
        }

        match change {
            SessionChange::CheckedIn { record, .. } => self.add(record.clone()),
            SessionChange::Ended { ended_at, .. } => {
                if !self.active {
                    return false;
                }
                self.active = false;
                self.ended_at = Some(*ended_at);
                true
            }
            SessionChange::Resync { .. } => false,
        }
    }

    pub fn contains(&self, record: &CheckInRecord) -> bool {
        self.roster.iter().any(|r| r.student_id == record.student_id)
    }

    fn add(&mut self, record: CheckInRecord) -> bool {
        if self.contains(&record) {
            return false;
        }
        self.roster.push(record);
        self.count = self.roster.len();
        true
    }
}

/// Session Aggregator
pub struct SessionAggregator<R, F>
where
    R: SessionRepository + Send + Sync + 'static,
    F: SessionFeed + 'static,
{
    repo: Arc<R>,
    feed: Arc<F>,
}

impl<R, F> SessionAggregator<R, F>
where
    R: SessionRepository + Send + Sync + 'static,
    F: SessionFeed + 'static,
{
    pub fn new(repo: Arc<R>, feed: Arc<F>) -> Self {
        Self { repo, feed }
    }

    /// Current view loaded from the ledger
    pub async fn snapshot(&self, session_id: &SessionId) -> AttendanceResult<SessionView> {
        load_view(self.repo.as_ref(), session_id).await
    }

    /// Live view that follows the session's change feed
    pub async fn watch(&self, session_id: &SessionId) -> AttendanceResult<LiveSessionView<R>> {
        // Subscribe before loading so nothing committed in between is missed
        let changes = self.feed.subscribe(session_id);
        let view = load_view(self.repo.as_ref(), session_id).await?;

        tracing::debug!(session_id = %session_id, count = view.count, "Live view opened");

        Ok(LiveSessionView {
            repo: self.repo.clone(),
            changes,
            view,
        })
    }
}

/// A session view kept current by its change feed
pub struct LiveSessionView<R>
where
    R: SessionRepository + Send + Sync + 'static,
{
    repo: Arc<R>,
    changes: broadcast::Receiver<SessionChange>,
    view: SessionView,
}

impl<R> LiveSessionView<R>
where
    R: SessionRepository + Send + Sync + 'static,
{
    pub fn view(&self) -> &SessionView {
        &self.view
    }

    /// Wait for the next change that alters the view
    ///
    /// Returns `None` once the feed is closed. A receiver that fell behind,
    /// or a feed that asks for a resync, reloads the view from the ledger.
    pub async fn changed(&mut self) -> AttendanceResult<Option<&SessionView>> {
        loop {
            match self.changes.recv().await {
                Ok(SessionChange::Resync { .. }) => {
                    tracing::info!(
                        session_id = %self.view.session_id,
                        "Live view resync requested, reloading from ledger"
                    );
                    self.reload().await?;
                    return Ok(Some(&self.view));
                }
                Ok(change) => {
                    if self.view.apply(&change) {
                        return Ok(Some(&self.view));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        session_id = %self.view.session_id,
                        skipped,
                        "Live view lagged, reloading from ledger"
                    );
                    self.reload().await?;
                    return Ok(Some(&self.view));
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    async fn reload(&mut self) -> AttendanceResult<()> {
        let reloaded = load_view(self.repo.as_ref(), &self.view.session_id).await?;
        // The active flag never goes back to true
        let ended = !self.view.active;
        self.view = reloaded;
        if ended {
            self.view.active = false;
        }
        Ok(())
    }
}

async fn load_view<R>(repo: &R, session_id: &SessionId) -> AttendanceResult<SessionView>
where
    R: SessionRepository + Sync,
{
    let session = repo
        .find_session(session_id)
        .await?
        .ok_or(AttendanceError::SessionNotFound)?;
    let roster = repo.roster(session_id).await?;
    Ok(SessionView::new(&session, roster))
}
