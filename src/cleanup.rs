//! Scheduled cleanup of expired tokens.

use crate::db::Database;
use crate::jwt::now_secs;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    let now = match now_secs() {
        Ok(now) => now,
        Err(e) => {
            error!("Skipping cleanup: {}", e);
            return;
        }
    };

    // Expired refresh tokens, including spent ones kept for reuse detection
    match db.tokens().delete_expired(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired refresh tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired refresh tokens: {}", e),
    }

    match db.users().clear_expired_reset_tokens(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired password reset tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up password reset tokens: {}", e),
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
