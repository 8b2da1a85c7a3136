//! Scheduled cleanup of expired sessions.

use crate::db::{Database, SessionKind};
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    for kind in [SessionKind::Auth, SessionKind::Data] {
        match db.sessions(kind).cleanup_expired().await {
            Ok(count) if count > 0 => {
                info!(kind = kind.as_str(), "Cleaned up {} expired sessions", count)
            }
            Ok(_) => {}
            Err(e) => error!(kind = kind.as_str(), "Failed to clean up sessions: {}", e),
        }
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
