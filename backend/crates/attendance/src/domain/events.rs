//! Session change events
//!
//! Check-ins and the end of a session travel on the same per-session
//! feed, so a subscriber sees them in the order they were committed.

use crate::domain::entities::CheckInRecord;
use crate::domain::value_objects::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A committed change to one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionChange {
    /// A student was added to the roster
    CheckedIn {
        session_id: SessionId,
        record: CheckInRecord,
    },
    /// The session stopped accepting check-ins
    Ended {
        session_id: SessionId,
        ended_at: DateTime<Utc>,
    },
    /// Changes may have been lost upstream; reload from the ledger
    Resync { session_id: SessionId },
}

impl SessionChange {
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionChange::CheckedIn { session_id, .. }
            | SessionChange::Ended { session_id, .. }
            | SessionChange::Resync { session_id } => session_id,
        }
    }
}

/// Per-session publish/subscribe channel
pub trait SessionFeed: Send + Sync {
    /// Receive every change published after this call
    fn subscribe(&self, session_id: &SessionId) -> broadcast::Receiver<SessionChange>;

    /// Deliver a change to current subscribers
    fn publish(&self, change: SessionChange);

    /// Ask every subscriber to reload. Returns the number of sessions told.
    fn resync_all(&self) -> usize;
}
