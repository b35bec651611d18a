//! PostgreSQL change notifications
//!
//! Triggers on `attendance_check_ins` and `attendance_sessions` call
//! `pg_notify` with a JSON encoded [`SessionChange`]. This listener forwards
//! them to the in-process feed, so every API instance sees every commit.
//! When the connection drops the listener reconnects itself and asks every
//! live view to resync, since anything sent in between is gone.

use crate::domain::events::{SessionChange, SessionFeed};
use crate::error::AttendanceResult;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Channel the triggers notify on
pub const CHANGE_CHANNEL: &str = "attendance_session_changes";

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Start listening and forward notifications to `feed` in a background task
///
/// Connection errors during startup are returned. Notifications sent while
/// the connection is down are lost, so after every reconnect all live views
/// are told to reload from the ledger.
pub async fn spawn_change_listener<F>(pool: PgPool, feed: Arc<F>) -> AttendanceResult<JoinHandle<()>>
where
    F: SessionFeed + 'static,
{
    let listener = connect(&pool).await?;
    tracing::info!(channel = CHANGE_CHANNEL, "Listening for session changes");

    Ok(tokio::spawn(forward_changes(pool, listener, feed)))
}

async fn forward_changes<F>(pool: PgPool, mut listener: PgListener, feed: Arc<F>)
where
    F: SessionFeed + 'static,
{
    loop {
        let lost = match listener.try_recv().await {
            Ok(Some(notification)) => {
                if let Some(change) = parse_notification(notification.payload()) {
                    feed.publish(change);
                }
                continue;
            }
            Ok(None) => "connection closed".to_string(),
            Err(e) => e.to_string(),
        };

        tracing::warn!(error = %lost, "Session change listener disconnected");
        listener = reconnect(&pool).await;
        let sessions = feed.resync_all();
        tracing::info!(sessions, "Session change listener reconnected, live views resyncing");
    }
}

async fn connect(pool: &PgPool) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANGE_CHANNEL).await?;
    Ok(listener)
}

async fn reconnect(pool: &PgPool) -> PgListener {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        tokio::time::sleep(backoff).await;
        match connect(pool).await {
            Ok(listener) => return listener,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_in_ms = backoff.as_millis() as u64,
                    "Session change listener reconnect failed"
                );
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// Decode a trigger payload
pub fn parse_notification(payload: &str) -> Option<SessionChange> {
    match serde_json::from_str(payload) {
        Ok(change) => Some(change),
        Err(e) => {
            tracing::warn!(error = %e, "Malformed session change notification");
            None
        }
    }
}
