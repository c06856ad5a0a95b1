//! Cancellable delayed actions keyed by `(sender, purpose)`.
//!
//! Each armed timer is a spawned task racing a sleep against its own
//! child [`CancellationToken`]. Arming a key that already has a timer
//! replaces it: the old token is cancelled and the new deadline wins.
//! When a timer fires its registry entry is removed *before* the action
//! runs, so the action is free to re-arm the same key.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use super::shard::ShardedMap;

/// What a per-sender timer is for. At most one timer per purpose per sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    /// Closes the sender's batch window.
    BatchFlush,
    /// Fires the sender's armed follow-up sequence.
    FollowUp,
}

impl fmt::Display for TimerPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BatchFlush => f.write_str("batch_flush"),
            Self::FollowUp => f.write_str("follow_up"),
        }
    }
}

/// Registry key of a timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// Sender the timer belongs to.
    pub sender_id: String,
    /// Purpose of the timer.
    pub purpose: TimerPurpose,
}

impl TimerKey {
    /// Batch-flush timer key for `sender_id`.
    #[must_use]
    pub fn batch(sender_id: &str) -> Self {
        Self {
            sender_id: sender_id.to_owned(),
            purpose: TimerPurpose::BatchFlush,
        }
    }

    /// Follow-up timer key for `sender_id`.
    #[must_use]
    pub fn follow_up(sender_id: &str) -> Self {
        Self {
            sender_id: sender_id.to_owned(),
            purpose: TimerPurpose::FollowUp,
        }
    }
}

struct ArmedTimer {
    generation: u64,
    cancel: CancellationToken,
    deadline: Instant,
}

/// Registry of outstanding timers.
pub struct TimerRegistry {
    root: CancellationToken,
    timers: Arc<ShardedMap<TimerKey, ArmedTimer>>,
    next_generation: AtomicU64,
}

impl TimerRegistry {
    /// Create a registry whose timers are all cancelled when `root` is.
    #[must_use]
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            timers: Arc::new(ShardedMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Arm `action` to run once `delay` has elapsed.
    ///
    /// Returns `true` if an outstanding timer for the same key was replaced.
    pub fn arm<F>(&self, key: TimerKey, delay: Duration, action: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.root.child_token();
        let deadline = Instant::now() + delay;

        let replaced = self.timers.with(&key, |map| {
            map.insert(
                key.clone(),
                ArmedTimer {
                    generation,
                    cancel: cancel.clone(),
                    deadline,
                },
            )
        });
        if let Some(ref old) = replaced {
            old.cancel.cancel();
        }

        let timers = Arc::clone(&self.timers);
        let span = info_span!("timer", sender_id = %key.sender_id, purpose = %key.purpose);
        tokio::spawn(
            async move {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("timer cancelled before firing");
                    }
                    () = tokio::time::sleep_until(deadline) => {
                        timers.with(&key, |map| {
                            if map.get(&key).is_some_and(|t| t.generation == generation) {
                                map.remove(&key);
                            }
                        });
                        debug!("timer fired");
                        action.await;
                    }
                }
            }
            .instrument(span),
        );

        replaced.is_some()
    }

    /// Cancel the timer for `key`. Returns `true` if one was outstanding.
    pub fn cancel(&self, key: &TimerKey) -> bool {
        let removed = self.timers.with(key, |map| map.remove(key));
        match removed {
            Some(timer) => {
                timer.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a timer is outstanding for `key`.
    #[must_use]
    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.timers.with(key, |map| map.contains_key(key))
    }

    /// Deadline of the outstanding timer for `key`.
    #[must_use]
    pub fn deadline(&self, key: &TimerKey) -> Option<Instant> {
        self.timers.with(key, |map| map.get(key).map(|t| t.deadline))
    }

    /// Number of outstanding timers.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    /// Cancel every outstanding timer.
    pub fn cancel_all(&self) -> usize {
        self.timers.retain(|_, timer| {
            timer.cancel.cancel();
            false
        })
    }
}
