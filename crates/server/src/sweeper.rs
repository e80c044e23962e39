//! Background expiry of idle upload sessions.

use crate::metrics;
use depot_uploads::Uploads;
use std::time::Duration;

/// Spawn a background task that periodically expires idle upload sessions
/// and releases their chunks.
///
/// Returns a handle that can be used to stop the task.
pub fn spawn_session_sweeper(uploads: Uploads, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let expired = uploads.sweep_expired().await;
            if expired > 0 {
                metrics::UPLOAD_SESSIONS_EXPIRED.inc_by(expired as u64);
                tracing::info!(expired, "Session sweeper expired idle uploads");
            }
            metrics::ACTIVE_UPLOAD_SESSIONS.set(uploads.active_sessions() as i64);
        }
    })
}
