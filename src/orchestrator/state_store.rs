//! In-memory per-user conversation state.

use std::time::Duration;

use tokio::time::Instant;

use super::detector::{derived_triggers, Detection};
use super::shard::ShardedMap;
use crate::models::conversation::ConversationState;

/// Result of recording one unit of user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activity {
    /// Whether the state was created by this call.
    pub is_new: bool,
    /// Lifetime message count after this activity.
    pub message_count: u32,
}

/// Conversation states keyed by sender, with per-shard locking.
#[derive(Default)]
pub struct ConversationStateStore {
    states: ShardedMap<String, ConversationState>,
}

impl ConversationStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted user event, creating the state on first contact.
    pub fn record_activity(&self, sender_id: &str, now: Instant) -> Activity {
        self.states.with(sender_id, |map| {
            let is_new = !map.contains_key(sender_id);
            let state = map
                .entry(sender_id.to_owned())
                .or_insert_with(|| ConversationState::new(sender_id, now));
            state.touch(now);
            state.message_count = state.message_count.saturating_add(1);
            Activity {
                is_new,
                message_count: state.message_count,
            }
        })
    }

    /// Merge one turn's detection into the sender's cumulative state.
    ///
    /// Adds categories, triggers, interests, and the derived
    /// `multiple_categories` / `first_visit` triggers, and replaces the
    /// urgency with the turn's. Returns the updated snapshot, or `None` if
    /// the sender has no state.
    pub fn apply_detection(
        &self,
        sender_id: &str,
        detection: &Detection,
    ) -> Option<ConversationState> {
        self.update(sender_id, |state| {
            for category in &detection.categories {
                state.categories_seen.insert(category.clone());
                state.add_interest(category);
            }
            state
                .triggers_seen
                .extend(detection.triggers.iter().cloned());
            for derived in derived_triggers(state.categories_seen.len(), state.message_count) {
                state.triggers_seen.insert(derived.to_owned());
            }
            state.urgency = detection.urgency;
            state.clone()
        })
    }

    /// Mutate the sender's state in place under its shard lock.
    pub fn update<R>(
        &self,
        sender_id: &str,
        f: impl FnOnce(&mut ConversationState) -> R,
    ) -> Option<R> {
        self.states.with(sender_id, |map| map.get_mut(sender_id).map(f))
    }

    /// Snapshot of the sender's state.
    #[must_use]
    pub fn snapshot(&self, sender_id: &str) -> Option<ConversationState> {
        self.states.with(sender_id, |map| map.get(sender_id).cloned())
    }

    /// Drop states idle for at least `ttl`, keeping any with a follow-up armed.
    ///
    /// Returns the ids of the removed senders.
    pub fn sweep_idle(&self, now: Instant, ttl: Duration) -> Vec<String> {
        let mut removed = Vec::new();
        self.states.retain(|sender_id, state| {
            let keep = state.follow_up_armed || state.idle_for(now) < ttl;
            if !keep {
                removed.push(sender_id.clone());
            }
            keep
        });
        removed
    }

    /// Number of tracked conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no conversation is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
