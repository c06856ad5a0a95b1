//! Time-based purge of stored exchanges and analytics.
//!
//! Conversation rows and analytics events carry their own `created_at`, so
//! each table is trimmed independently against the same cutoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::analytics_repo::AnalyticsRepo;
use super::conversation_repo::ConversationRepo;
use super::db::Database;
use crate::Result;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Start the hourly purge loop. It exits when `cancel` fires.
#[must_use]
pub fn spawn_retention_task(
    db: Arc<Database>,
    retention_days: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while !cancel.is_cancelled() {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = purge(&db, retention_days).await {
                        error!(%err, retention_days, "stored history purge failed");
                    }
                }
            }
        }
        debug!("retention loop stopped");
    })
}

/// Oldest `created_at` that survives a purge run at `now`.
#[must_use]
pub fn cutoff(now: DateTime<Utc>, retention_days: u32) -> DateTime<Utc> {
    now - chrono::Duration::days(i64::from(retention_days))
}

/// Delete exchanges and analytics events older than `retention_days`.
///
/// Returns `(conversations, events)` removed.
///
/// # Errors
///
/// Returns `AppError::Db` if a delete fails.
pub async fn purge(db: &Arc<Database>, retention_days: u32) -> Result<(u64, u64)> {
    let before = cutoff(Utc::now(), retention_days);

    let conversations = ConversationRepo::new(Arc::clone(db))
        .purge_before(before)
        .await?;
    let events = AnalyticsRepo::new(Arc::clone(db))
        .purge_before(before)
        .await?;

    if conversations > 0 || events > 0 {
        info!(%before, conversations, events, "expired history purged");
    }
    Ok((conversations, events))
}
