//! Per-user conversation orchestration engine.
//!
//! Inbound events pass the dedup filter, join the sender's fixed-window
//! batch, and on window close run the flush pipeline:
//! history -> generate (with retry) -> split -> paced delivery -> persist
//! -> trigger detection -> follow-up arming.
//!
//! All per-sender maps are sharded; one sender's work never waits on
//! another's. Flushes for one sender are serialized by a per-sender
//! async lock so replies go out in batch order.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::analytics::AnalyticsRecorder;
use super::batcher::{AppendOutcome, Batch, BatchAggregator};
use super::dedup::DedupFilter;
use super::delivery::Delivery;
use super::detector::detect;
use super::follow_up::{FollowUpScheduler, FollowUpSettings};
use super::postback::PostbackAction;
use super::shard::ShardedMap;
use super::splitter::{has_visible_text, split_response};
use super::state_store::ConversationStateStore;
use super::timers::{TimerKey, TimerRegistry};
use crate::config::{
    BatchingConfig, DedupConfig, DeliveryConfig, GenerationConfig, GlobalConfig, StateConfig,
};
use crate::llm::ReplyGenerator;
use crate::models::analytics::event_types;
use crate::models::conversation::ConversationState;
use crate::models::event::{InboundEvent, PostbackEvent};
use crate::models::history::{ConversationRecord, HistoryTurn};
use crate::models::user::UserProfile;
use crate::persistence::ConversationStore;
use crate::platform::Platform;
use crate::{AppError, Result};

/// Engine tunables, normally derived from [`GlobalConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Fixed batch window measured from the first message.
    pub batch_window: Duration,
    /// Exchanges of history passed to the generator.
    pub history_limit: u32,
    /// Identical-text suppression window.
    pub dedup_window: Duration,
    /// Message-id set size that triggers pruning.
    pub dedup_capacity: usize,
    /// Message ids kept after a prune.
    pub dedup_retain: usize,
    /// Total generation attempts per flush.
    pub max_attempts: u32,
    /// Pause between generation attempts.
    pub retry_delay: Duration,
    /// Reply used when every attempt came back empty.
    pub fallback_message: String,
    /// Sent once when delivering a reply fails.
    pub apology_message: String,
    /// Typing indicator time before each message.
    pub typing_delay: Duration,
    /// Pause after the first half of an auto-split reply.
    pub auto_split_wait_ms: u64,
    /// Conversation state idle lifetime.
    pub idle_ttl: Duration,
    /// Follow-up scheduler tunables.
    pub follow_up: FollowUpSettings,
}

impl EngineSettings {
    /// Derive settings from the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the follow-up catalog is invalid.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        Ok(Self {
            batch_window: config.batch_window(),
            history_limit: config.batching.history_limit,
            dedup_window: Duration::from_secs(config.dedup.window_seconds),
            dedup_capacity: config.dedup.capacity,
            dedup_retain: config.dedup.retain,
            max_attempts: config.generation.max_attempts,
            retry_delay: Duration::from_millis(config.generation.retry_delay_ms),
            fallback_message: config.generation.fallback_message.clone(),
            apology_message: config.generation.apology_message.clone(),
            typing_delay: Duration::from_millis(config.delivery.typing_delay_ms),
            auto_split_wait_ms: config.delivery.auto_split_wait_ms,
            idle_ttl: config.idle_ttl(),
            follow_up: FollowUpSettings::from_config(
                &config.follow_up,
                Duration::from_millis(config.delivery.follow_up_pause_ms),
            )?,
        })
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        let batching = BatchingConfig::default();
        let dedup = DedupConfig::default();
        let generation = GenerationConfig::default();
        let delivery = DeliveryConfig::default();
        let state = StateConfig::default();
        Self {
            batch_window: Duration::from_secs(batching.window_seconds),
            history_limit: batching.history_limit,
            dedup_window: Duration::from_secs(dedup.window_seconds),
            dedup_capacity: dedup.capacity,
            dedup_retain: dedup.retain,
            max_attempts: generation.max_attempts,
            retry_delay: Duration::from_millis(generation.retry_delay_ms),
            fallback_message: generation.fallback_message,
            apology_message: generation.apology_message,
            typing_delay: Duration::from_millis(delivery.typing_delay_ms),
            auto_split_wait_ms: delivery.auto_split_wait_ms,
            idle_ttl: Duration::from_secs(state.idle_ttl_hours * 3600),
            follow_up: FollowUpSettings::default(),
        }
    }
}

/// External services the engine calls.
#[derive(Clone)]
pub struct Collaborators {
    /// Messaging platform used for all outbound traffic.
    pub platform: Arc<dyn Platform>,
    /// Reply generator.
    pub generator: Arc<dyn ReplyGenerator>,
    /// Persistence.
    pub store: Arc<dyn ConversationStore>,
}

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Dropped by the dedup filter.
    Duplicate,
    /// Carried neither text nor images.
    Ignored,
    /// Added to the sender's batch.
    Batched {
        /// Whether this message opened the batch (and armed its timer).
        new_batch: bool,
    },
}

/// Result of one generation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    /// Text to deliver.
    pub text: String,
    /// Attempts made.
    pub attempts: u32,
    /// Whether the fallback message replaced an empty result.
    pub fell_back: bool,
}

/// Orchestration engine handle. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    settings: EngineSettings,
    dedup: DedupFilter,
    batches: BatchAggregator,
    states: Arc<ConversationStateStore>,
    timers: Arc<TimerRegistry>,
    flush_locks: ShardedMap<String, Arc<Mutex<()>>>,
    scheduler: Arc<FollowUpScheduler>,
    delivery: Delivery,
    analytics: AnalyticsRecorder,
    platform: Arc<dyn Platform>,
    generator: Arc<dyn ReplyGenerator>,
    store: Arc<dyn ConversationStore>,
}

impl Engine {
    /// Build an engine. All timers are cancelled when `cancel` is.
    #[must_use]
    pub fn new(
        settings: EngineSettings,
        collaborators: Collaborators,
        cancel: &CancellationToken,
    ) -> Self {
        let Collaborators {
            platform,
            generator,
            store,
        } = collaborators;
        let states = Arc::new(ConversationStateStore::new());
        let timers = Arc::new(TimerRegistry::new(cancel.child_token()));
        let delivery = Delivery::new(Arc::clone(&platform), settings.typing_delay);
        let analytics = AnalyticsRecorder::new(Arc::clone(&store));
        let scheduler = Arc::new(FollowUpScheduler::new(
            settings.follow_up.clone(),
            Arc::clone(&states),
            Arc::clone(&timers),
            delivery.clone(),
            analytics.clone(),
            Arc::clone(&store),
        ));

        Self {
            inner: Arc::new(EngineInner {
                dedup: DedupFilter::new(
                    settings.dedup_window,
                    settings.dedup_capacity,
                    settings.dedup_retain,
                ),
                batches: BatchAggregator::new(settings.batch_window),
                states,
                timers,
                flush_locks: ShardedMap::new(),
                scheduler,
                delivery,
                analytics,
                platform,
                generator,
                store,
                settings,
            }),
        }
    }

    /// Accept one inbound message.
    ///
    /// Returns once the message is deduplicated and batched; the reply is
    /// produced later by the batch timer.
    pub fn handle_message(&self, event: InboundEvent) -> HandleOutcome {
        self.inner.handle_message(event)
    }

    /// Answer a button click immediately, bypassing batching.
    ///
    /// # Errors
    ///
    /// Returns the platform error if the reply could not be delivered.
    pub async fn handle_postback(&self, event: PostbackEvent) -> Result<()> {
        self.inner.handle_postback(event).await
    }

    /// Drop idle conversation states and expired dedup texts.
    ///
    /// Returns the number of conversations removed.
    pub fn sweep_idle(&self) -> usize {
        self.inner.sweep_idle(Instant::now())
    }

    /// Cancel every outstanding batch and follow-up timer.
    pub fn shutdown(&self) {
        let cancelled = self.inner.timers.cancel_all();
        info!(cancelled, "engine timers cancelled");
    }

    /// Snapshot of a sender's conversation state.
    #[must_use]
    pub fn conversation(&self, sender_id: &str) -> Option<ConversationState> {
        self.inner.states.snapshot(sender_id)
    }

    /// Snapshot of a sender's open batch.
    #[must_use]
    pub fn pending_batch(&self, sender_id: &str) -> Option<Batch> {
        self.inner.batches.pending(sender_id)
    }

    /// When the sender's armed follow-up is due.
    #[must_use]
    pub fn follow_up_deadline(&self, sender_id: &str) -> Option<Instant> {
        self.inner.timers.deadline(&TimerKey::follow_up(sender_id))
    }

    /// Number of outstanding timers of any purpose.
    #[must_use]
    pub fn armed_timers(&self) -> usize {
        self.inner.timers.armed_count()
    }

    /// Generate a reply, retrying empty or failed attempts, falling back last.
    pub async fn generate_with_retry(
        &self,
        prompt: &str,
        history: &[HistoryTurn],
        images: &[String],
    ) -> Generated {
        self.inner.generate_with_retry(prompt, history, images).await
    }
}

impl EngineInner {
    fn handle_message(self: &Arc<Self>, event: InboundEvent) -> HandleOutcome {
        if event.is_empty() {
            debug!(sender_id = %event.sender_id, "empty event ignored");
            return HandleOutcome::Ignored;
        }
        let sender_id = event.sender_id.as_str();
        let text = event.trimmed_text();
        let now = Instant::now();

        if !self
            .dedup
            .should_process(sender_id, event.platform_message_id.as_deref(), text, now)
        {
            return HandleOutcome::Duplicate;
        }

        let activity = self.states.record_activity(sender_id, now);
        if activity.is_new {
            self.spawn_bootstrap(sender_id);
        }
        self.analytics.record(
            event_types::MESSAGE_RECEIVED,
            sender_id,
            json!({ "chars": text.len(), "images": event.image_urls.len() }),
        );

        let outcome = self
            .batches
            .append(sender_id, Some(text), &event.image_urls, now);
        let new_batch = outcome == AppendOutcome::Started;
        if new_batch {
            self.arm_flush(sender_id);
        }
        debug!(sender_id, new_batch, "message batched");
        HandleOutcome::Batched { new_batch }
    }

    fn arm_flush(self: &Arc<Self>, sender_id: &str) {
        let this = Arc::clone(self);
        let sender = sender_id.to_owned();
        self.timers.arm(
            TimerKey::batch(sender_id),
            self.batches.window(),
            async move {
                let span = info_span!("flush", sender_id = %sender);
                this.flush(&sender).instrument(span).await;
            },
        );
    }

    fn flush_lock(&self, sender_id: &str) -> Arc<Mutex<()>> {
        self.flush_locks.with(sender_id, |map| {
            Arc::clone(
                map.entry(sender_id.to_owned())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        })
    }

    async fn flush(self: &Arc<Self>, sender_id: &str) {
        // Taken before the lock: later messages open a new batch right away.
        let Some(batch) = self.batches.take(sender_id) else {
            return;
        };
        let lock = self.flush_lock(sender_id);
        let _guard = lock.lock().await;

        let prompt = batch.combined_text();
        info!(
            messages = batch.messages.len(),
            images = batch.images.len(),
            "batch flushing"
        );
        self.analytics.record(
            event_types::BATCH_FLUSHED,
            sender_id,
            json!({ "messages": batch.messages.len(), "images": batch.images.len() }),
        );

        let history = self.history(sender_id).await;
        let generated = self
            .generate_with_retry(&prompt, &history, &batch.images)
            .await;
        if generated.fell_back {
            self.analytics.record(
                event_types::GENERATION_FALLBACK,
                sender_id,
                json!({ "attempts": generated.attempts }),
            );
        }

        let messages = split_response(&generated.text, self.settings.auto_split_wait_ms);
        if messages.is_empty() {
            let err = AppError::Generation("reply has no deliverable text".into());
            self.recover_delivery(sender_id, &err).await;
            self.after_turn(sender_id, &prompt);
            return;
        }
        match self.delivery.deliver(sender_id, &messages).await {
            Ok(()) => {
                self.analytics.record(
                    event_types::REPLY_SENT,
                    sender_id,
                    json!({ "parts": messages.len(), "fallback": generated.fell_back }),
                );
                let record =
                    ConversationRecord::new(sender_id, &prompt, &generated.text, batch.images);
                self.persist(&record).await;
            }
            Err(err) => self.recover_delivery(sender_id, &err).await,
        }

        self.after_turn(sender_id, &prompt);
    }

    fn after_turn(self: &Arc<Self>, sender_id: &str, text: &str) {
        let detection = detect(text);
        let Some(state) = self.states.apply_detection(sender_id, &detection) else {
            return;
        };
        debug!(
            triggers = ?state.triggers_seen,
            urgency = state.urgency.as_str(),
            "conversation state updated"
        );
        self.scheduler.maybe_arm(sender_id);
    }

    async fn generate_with_retry(
        &self,
        prompt: &str,
        history: &[HistoryTurn],
        images: &[String],
    ) -> Generated {
        let max_attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.generator.generate_reply(prompt, history, images).await {
                Ok(reply) if has_visible_text(&reply) => {
                    return Generated {
                        text: reply,
                        attempts: attempt,
                        fell_back: false,
                    };
                }
                Ok(_) => warn!(attempt, "generator returned a reply with no visible text"),
                Err(err) => warn!(attempt, %err, "generation attempt failed"),
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }
        warn!(max_attempts, "generation exhausted; sending fallback");
        Generated {
            text: self.settings.fallback_message.clone(),
            attempts: max_attempts,
            fell_back: true,
        }
    }

    async fn history(&self, sender_id: &str) -> Vec<HistoryTurn> {
        match self
            .store
            .get_conversation_history(sender_id, self.settings.history_limit)
            .await
        {
            Ok(history) => history,
            Err(err) => {
                warn!(%err, "history unavailable; generating without it");
                Vec::new()
            }
        }
    }

    async fn persist(&self, record: &ConversationRecord) {
        if let Err(err) = self.store.save_conversation(record).await {
            warn!(%err, "failed to store conversation");
        }
    }

    async fn recover_delivery(&self, sender_id: &str, err: &AppError) {
        error!(%err, "reply delivery failed");
        self.analytics.record(
            event_types::DELIVERY_FAILED,
            sender_id,
            json!({ "error": err.to_string() }),
        );
        if let Err(apology_err) = self
            .platform
            .send_message(sender_id, &self.settings.apology_message)
            .await
        {
            error!(err = %apology_err, "apology delivery failed");
        }
    }

    async fn handle_postback(self: &Arc<Self>, event: PostbackEvent) -> Result<()> {
        let span = info_span!("postback", sender_id = %event.sender_id, payload = %event.payload);
        self.answer_postback(&event).instrument(span).await
    }

    async fn answer_postback(self: &Arc<Self>, event: &PostbackEvent) -> Result<()> {
        let sender_id = event.sender_id.as_str();
        let activity = self.states.record_activity(sender_id, Instant::now());
        if activity.is_new {
            self.spawn_bootstrap(sender_id);
        }
        self.analytics.record(
            event_types::POSTBACK_CLICKED,
            sender_id,
            json!({ "payload": event.payload, "title": event.title }),
        );

        let lock = self.flush_lock(sender_id);
        let _guard = lock.lock().await;

        let action = PostbackAction::parse(&event.payload);
        let reply = match action.canned_reply() {
            Some(canned) => canned.to_owned(),
            None => {
                let prompt = action.prompt(event.title.as_deref());
                let history = self.history(sender_id).await;
                self.generate_with_retry(&prompt, &history, &[]).await.text
            }
        };

        let messages = split_response(&reply, self.settings.auto_split_wait_ms);
        if let Err(err) = self.delivery.deliver(sender_id, &messages).await {
            self.recover_delivery(sender_id, &err).await;
            return Err(err);
        }
        info!(parts = messages.len(), "postback answered");

        let user_message = event.title.as_deref().unwrap_or(&event.payload);
        self.persist(&ConversationRecord::new(sender_id, user_message, reply, Vec::new()))
            .await;
        Ok(())
    }

    fn spawn_bootstrap(&self, sender_id: &str) {
        let platform = Arc::clone(&self.platform);
        let store = Arc::clone(&self.store);
        let sender = sender_id.to_owned();
        tokio::spawn(async move {
            bootstrap_user(platform.as_ref(), store.as_ref(), &sender).await;
        });
    }

    fn sweep_idle(&self, now: Instant) -> usize {
        let removed = self.states.sweep_idle(now, self.settings.idle_ttl);
        let texts = self.dedup.prune_expired(now);
        for sender_id in &removed {
            self.flush_locks.with(sender_id.as_str(), |map| {
                if map.get(sender_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                    map.remove(sender_id);
                }
            });
        }
        if !removed.is_empty() || texts > 0 {
            info!(conversations = removed.len(), texts, "idle state swept");
        }
        removed.len()
    }
}

/// Store a profile for a sender seen for the first time.
///
/// Already-known users are left untouched. A failed profile lookup stores
/// an anonymous profile; storage failures are only logged.
pub async fn bootstrap_user(
    platform: &dyn Platform,
    store: &dyn ConversationStore,
    sender_id: &str,
) {
    match store.get_user(sender_id).await {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(err) => {
            warn!(sender_id, %err, "user lookup failed");
            return;
        }
    }
    let profile = match platform.get_user_profile(sender_id).await {
        Ok(profile) => profile,
        Err(err) => {
            warn!(sender_id, %err, "profile fetch failed; storing anonymous user");
            UserProfile::anonymous(sender_id, platform.name())
        }
    };
    match store.save_user(&profile).await {
        Ok(()) => info!(sender_id, name = %profile.name, "new user stored"),
        Err(err) => warn!(sender_id, %err, "failed to store user"),
    }
}
