//! Proactive follow-up scheduling.
//!
//! Per sender: `Idle -> Armed(seq) -> Fired -> (Idle | Armed(next))`.
//! A follow-up is armed only while none is outstanding. Activity does not
//! cancel it; instead the fire re-checks inactivity and becomes a silent
//! no-op when the user came back.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use super::analytics::AnalyticsRecorder;
use super::delivery::Delivery;
use super::state_store::ConversationStateStore;
use super::timers::{TimerKey, TimerRegistry};
use crate::config::FollowUpConfig;
use crate::models::analytics::event_types;
use crate::models::follow_up::{FollowUpCatalog, FollowUpSequenceDefinition};
use crate::models::history::ConversationRecord;
use crate::persistence::ConversationStore;
use crate::Result;

/// Tunables for the scheduler.
#[derive(Debug, Clone)]
pub struct FollowUpSettings {
    /// Master switch.
    pub enabled: bool,
    /// Share of a sequence's delay the user must have been idle for it to send.
    pub inactivity_ratio: f64,
    /// Pause between the messages of one sequence.
    pub pause: Duration,
    /// Sequences in priority order.
    pub catalog: Arc<FollowUpCatalog>,
}

impl FollowUpSettings {
    /// Build settings from the `[follow_up]` section.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configured sequences are invalid.
    pub fn from_config(config: &FollowUpConfig, pause: Duration) -> Result<Self> {
        Ok(Self {
            enabled: config.enabled,
            inactivity_ratio: config.inactivity_ratio,
            pause,
            catalog: Arc::new(config.catalog()?),
        })
    }
}

impl Default for FollowUpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            inactivity_ratio: 0.8,
            pause: Duration::from_millis(3000),
            catalog: Arc::new(FollowUpCatalog::builtin()),
        }
    }
}

/// Outcome of a follow-up timer firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// Messages went out; carries the chained sequence, if one was armed.
    Sent {
        /// Sequence armed next.
        next: Option<String>,
    },
    /// The user had been active too recently.
    Skipped,
    /// The conversation state was gone or the sequence unknown.
    Stale,
    /// Sending failed.
    Failed,
}

/// Arms and fires follow-up sequences.
pub struct FollowUpScheduler {
    settings: FollowUpSettings,
    states: Arc<ConversationStateStore>,
    timers: Arc<TimerRegistry>,
    delivery: Delivery,
    analytics: AnalyticsRecorder,
    store: Arc<dyn ConversationStore>,
}

impl FollowUpScheduler {
    /// Create a scheduler sharing the engine's state and timers.
    #[must_use]
    pub fn new(
        settings: FollowUpSettings,
        states: Arc<ConversationStateStore>,
        timers: Arc<TimerRegistry>,
        delivery: Delivery,
        analytics: AnalyticsRecorder,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            settings,
            states,
            timers,
            delivery,
            analytics,
            store,
        }
    }

    /// Catalog in use.
    #[must_use]
    pub fn catalog(&self) -> &FollowUpCatalog {
        &self.settings.catalog
    }

    /// Arm the highest-priority matching sequence unless one is already armed.
    ///
    /// Returns the armed sequence id.
    pub fn maybe_arm(self: &Arc<Self>, sender_id: &str) -> Option<String> {
        if !self.settings.enabled {
            return None;
        }
        let (sequence_id, delay) = self
            .states
            .update(sender_id, |state| {
                if state.follow_up_armed {
                    return None;
                }
                let sequence = self.settings.catalog.select(&state.triggers_seen)?;
                state.follow_up_armed = true;
                state.active_sequence = Some(sequence.id.clone());
                Some((sequence.id.clone(), sequence.delay()))
            })
            .flatten()?;

        info!(sender_id, sequence_id, delay_secs = delay.as_secs(), "follow-up armed");
        self.arm_timer(sender_id, sequence_id.clone(), delay);
        Some(sequence_id)
    }

    fn arm_timer(self: &Arc<Self>, sender_id: &str, sequence_id: String, delay: Duration) {
        let this = Arc::clone(self);
        let sender = sender_id.to_owned();
        self.timers.arm(TimerKey::follow_up(sender_id), delay, async move {
            let span = info_span!("follow_up", sender_id = %sender, sequence_id = %sequence_id);
            this.fire(&sender, &sequence_id).instrument(span).await;
        });
    }

    /// Run a due follow-up for `sender_id`.
    pub async fn fire(self: &Arc<Self>, sender_id: &str, sequence_id: &str) -> FireOutcome {
        let Some(sequence) = self.settings.catalog.get(sequence_id).cloned() else {
            warn!("armed sequence no longer in catalog");
            self.states.update(sender_id, |s| s.clear_follow_up());
            return FireOutcome::Stale;
        };
        let Some(state) = self.states.snapshot(sender_id) else {
            debug!("conversation state gone; follow-up dropped");
            return FireOutcome::Stale;
        };

        let idle = state.idle_for(Instant::now());
        let required = sequence.delay().mul_f64(self.settings.inactivity_ratio);
        if idle < required {
            info!(idle_secs = idle.as_secs(), "user active since arming; follow-up skipped");
            self.states.update(sender_id, |s| s.clear_follow_up());
            self.analytics.record(
                event_types::FOLLOW_UP_SKIPPED,
                sender_id,
                json!({ "sequence_id": sequence.id, "idle_seconds": idle.as_secs() }),
            );
            return FireOutcome::Skipped;
        }

        if let Err(err) = self
            .delivery
            .deliver_sequence(sender_id, &sequence.messages, self.settings.pause)
            .await
        {
            warn!(%err, "follow-up delivery failed");
            self.states.update(sender_id, |s| s.clear_follow_up());
            self.analytics.record(
                event_types::DELIVERY_FAILED,
                sender_id,
                json!({ "sequence_id": sequence.id, "error": err.to_string() }),
            );
            return FireOutcome::Failed;
        }

        info!(messages = sequence.messages.len(), "follow-up sent");
        self.analytics.record(
            event_types::FOLLOW_UP_SENT,
            sender_id,
            json!({ "sequence_id": sequence.id, "messages": sequence.messages.len() }),
        );
        self.persist(sender_id, &sequence).await;

        let next = self.chain(sender_id, &sequence);
        FireOutcome::Sent { next }
    }

    fn chain(
        self: &Arc<Self>,
        sender_id: &str,
        sequence: &FollowUpSequenceDefinition,
    ) -> Option<String> {
        let next = sequence
            .next
            .as_deref()
            .and_then(|id| self.settings.catalog.get(id))
            .map(|next| (next.id.clone(), next.delay()));

        let Some((next_id, delay)) = next else {
            self.states.update(sender_id, |s| s.clear_follow_up());
            return None;
        };
        let still_tracked = self
            .states
            .update(sender_id, |s| {
                s.follow_up_armed = true;
                s.active_sequence = Some(next_id.clone());
            })
            .is_some();
        if !still_tracked {
            return None;
        }
        info!(next = %next_id, delay_secs = delay.as_secs(), "chained follow-up armed");
        self.arm_timer(sender_id, next_id.clone(), delay);
        Some(next_id)
    }

    async fn persist(&self, sender_id: &str, sequence: &FollowUpSequenceDefinition) {
        let record = ConversationRecord::new(sender_id, "", sequence.messages.join("\n"), Vec::new());
        if let Err(err) = self.store.save_conversation(&record).await {
            warn!(%err, "failed to store follow-up in history");
        }
    }
}
