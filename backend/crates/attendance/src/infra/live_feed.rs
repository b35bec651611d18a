//! Live feed hub
//!
//! One broadcast channel per session, created on first use and dropped
//! once its last viewer has gone.

use crate::domain::events::{SessionChange, SessionFeed};
use crate::domain::value_objects::SessionId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Per-session broadcast channels
pub struct SessionFeedHub {
    channels: Mutex<HashMap<SessionId, broadcast::Sender<SessionChange>>>,
    capacity: usize,
}

impl SessionFeedHub {
    /// Create a hub buffering `capacity` changes per session
    pub fn new(capacity: usize) -> Self {
        tracing::info!(capacity, "Session feed hub initialized");
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of live subscribers of a session
    pub fn subscriber_count(&self, session_id: &SessionId) -> usize {
        self.lock()
            .get(session_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of sessions with an open channel
    pub fn channel_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, broadcast::Sender<SessionChange>>> {
        // The map holds no invariant a panicking holder could break
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Drop channels whose viewers have all gone
fn prune(channels: &mut HashMap<SessionId, broadcast::Sender<SessionChange>>) -> usize {
    let before = channels.len();
    channels.retain(|_, tx| tx.receiver_count() > 0);
    before - channels.len()
}

impl SessionFeed for SessionFeedHub {
    fn subscribe(&self, session_id: &SessionId) -> broadcast::Receiver<SessionChange> {
        let mut channels = self.lock();
        let pruned = prune(&mut channels);
        if pruned > 0 {
            tracing::debug!(pruned, "Idle session channels dropped");
        }
        channels
            .entry(session_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    fn publish(&self, change: SessionChange) {
        let mut channels = self.lock();
        let session_id = change.session_id().clone();
        let Some(tx) = channels.get(&session_id) else {
            tracing::debug!(session_id = %session_id, "No live viewers");
            return;
        };

        match tx.send(change) {
            Ok(receivers) => {
                tracing::debug!(session_id = %session_id, receivers, "Session change published")
            }
            Err(_) => {
                channels.remove(&session_id);
                tracing::debug!(session_id = %session_id, "No live viewers, channel dropped");
            }
        }
    }

    fn resync_all(&self) -> usize {
        let mut channels = self.lock();
        prune(&mut channels);
        for (session_id, tx) in channels.iter() {
            let _ = tx.send(SessionChange::Resync {
                session_id: session_id.clone(),
            });
        }
        channels.len()
    }
}
