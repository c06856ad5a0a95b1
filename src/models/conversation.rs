//! Per-user conversation state tracked by the orchestration engine.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// How pressing the user's need appears from their wording.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Relaxed browsing ("just looking", "no rush").
    Low,
    /// No signal either way.
    #[default]
    Normal,
    /// Time-sensitive request ("asap", "urgent").
    High,
}

impl Urgency {
    /// Stable lowercase label used in logs and analytics payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

/// Mutable record of one user's conversation.
///
/// Created lazily on the first accepted message, updated on every
/// processed turn, and dropped by the sweeper after a long idle period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    /// Platform-scoped user identifier.
    pub sender_id: String,
    /// Wall-clock time of the first accepted message.
    pub started_at: DateTime<Utc>,
    /// Wall-clock time of the most recent user activity.
    pub last_activity_at: DateTime<Utc>,
    /// Monotonic time of the most recent user activity.
    pub last_activity: Instant,
    /// Lifetime count of accepted user events.
    pub message_count: u32,
    /// Every product category the user has mentioned.
    pub categories_seen: BTreeSet<String>,
    /// Every trigger detected so far, including derived ones.
    pub triggers_seen: BTreeSet<String>,
    /// Interests in first-mention order, without duplicates.
    pub interests: Vec<String>,
    /// Urgency inferred from the latest turn.
    pub urgency: Urgency,
    /// Follow-up sequence currently armed, if any.
    pub active_sequence: Option<String>,
    /// Guards against arming a second follow-up timer.
    pub follow_up_armed: bool,
}

impl ConversationState {
    /// Fresh state for a user first seen at `now`.
    #[must_use]
    pub fn new(sender_id: impl Into<String>, now: Instant) -> Self {
        let wall = Utc::now();
        Self {
            sender_id: sender_id.into(),
            started_at: wall,
            last_activity_at: wall,
            last_activity: now,
            message_count: 0,
            categories_seen: BTreeSet::new(),
            triggers_seen: BTreeSet::new(),
            interests: Vec::new(),
            urgency: Urgency::Normal,
            active_sequence: None,
            follow_up_armed: false,
        }
    }

    /// Record user activity at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
        self.last_activity_at = Utc::now();
    }

    /// Append an interest unless it is already present.
    pub fn add_interest(&mut self, interest: &str) {
        if !self.interests.iter().any(|existing| existing == interest) {
            self.interests.push(interest.to_owned());
        }
    }

    /// Time since the last user activity.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Clear follow-up bookkeeping (state machine back to idle).
    pub fn clear_follow_up(&mut self) {
        self.follow_up_armed = false;
        self.active_sequence = None;
    }
}
