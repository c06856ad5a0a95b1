//! Inbound duplicate suppression.
//!
//! Platforms redeliver webhooks on timeouts and users double-tap send.
//! An event is dropped when its platform message id was already processed,
//! or when the same sender sent identical text within the dedup window.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::shard::ShardedMap;

/// Bounded, insertion-ordered set of processed platform message ids.
///
/// When the set grows past `capacity` the oldest ids are evicted until
/// only `retain` remain. This is a hard cap rather than precise LRU.
struct RecentIds {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
    retain: usize,
}

impl RecentIds {
    fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record `id`; returns `false` if it was already present.
    fn insert(&mut self, id: &str) -> bool {
        if !self.seen.insert(id.to_owned()) {
            return false;
        }
        self.order.push_back(id.to_owned());
        if self.order.len() > self.capacity {
            while self.order.len() > self.retain {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
        }
        true
    }
}

/// Duplicate filter shared by all inbound handlers.
pub struct DedupFilter {
    window: Duration,
    ids: Mutex<RecentIds>,
    last_text: ShardedMap<String, (String, Instant)>,
}

impl DedupFilter {
    /// Create a filter.
    ///
    /// `capacity` is the id-set size that triggers pruning; `retain` is how
    /// many of the most recent ids survive a prune.
    #[must_use]
    pub fn new(window: Duration, capacity: usize, retain: usize) -> Self {
        Self {
            window,
            ids: Mutex::new(RecentIds {
                seen: HashSet::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
                retain: retain.min(capacity),
            }),
            last_text: ShardedMap::new(),
        }
    }

    /// Decide whether an inbound event should be processed, recording it if so.
    ///
    /// Text comparison only applies to non-empty text, so attachment-only
    /// messages are filtered by message id alone.
    pub fn should_process(
        &self,
        sender_id: &str,
        platform_message_id: Option<&str>,
        text: &str,
        now: Instant,
    ) -> bool {
        // The shared id set is never held across the per-sender text check.
        if let Some(mid) = platform_message_id {
            if self.lock_ids().contains(mid) {
                debug!(sender_id, mid, "duplicate message id dropped");
                return false;
            }
        }

        let accepted = self.last_text.with(sender_id, |map| {
            if !text.is_empty() {
                if let Some((last, seen_at)) = map.get(sender_id) {
                    if last == text && now.saturating_duration_since(*seen_at) < self.window {
                        return false;
                    }
                }
                map.insert(sender_id.to_owned(), (text.to_owned(), now));
            }
            true
        });

        if !accepted {
            debug!(sender_id, "duplicate text within dedup window dropped");
            return false;
        }

        // A redelivery racing this one may have recorded the id meanwhile.
        if let Some(mid) = platform_message_id {
            if !self.lock_ids().insert(mid) {
                debug!(sender_id, mid, "duplicate message id dropped");
                return false;
            }
        }
        true
    }

    fn lock_ids(&self) -> MutexGuard<'_, RecentIds> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop remembered texts older than the dedup window.
    ///
    /// Returns the number of entries removed.
    pub fn prune_expired(&self, now: Instant) -> usize {
        self.last_text
            .retain(|_, (_, seen_at)| now.saturating_duration_since(*seen_at) < self.window)
    }

    /// Number of message ids currently remembered.
    #[must_use]
    pub fn remembered_ids(&self) -> usize {
        self.lock_ids().seen.len()
    }
}
