//! Periodic removal of idle conversation state.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::engine::Engine;

/// Spawn the idle-state sweeper.
///
/// Every `interval` it drops conversations idle past the configured TTL and
/// expired dedup entries, until `cancel` fires.
#[must_use]
pub fn spawn_state_sweeper(
    engine: Engine,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; nothing is idle yet.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("state sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    engine.sweep_idle();
                }
            }
        }
    })
}
