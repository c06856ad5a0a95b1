//! Shared fakes and builders for engine integration tests.
//!
//! Every fake records its calls with the (paused) tokio clock offset from
//! construction so tests can assert pacing precisely.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use concierge::llm::ReplyGenerator;
use concierge::models::analytics::AnalyticsEvent;
use concierge::models::history::{ConversationRecord, HistoryTurn};
use concierge::models::user::UserProfile;
use concierge::orchestrator::{Collaborators, Engine, EngineSettings};
use concierge::persistence::ConversationStore;
use concierge::platform::Platform;
use concierge::{AppError, Result};

/// One outbound platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    /// Typing indicator toggled.
    Typing { recipient: String, on: bool, at: Duration },
    /// Message delivered.
    Send { recipient: String, text: String, at: Duration },
}

/// Platform fake recording typing indicators and sends.
pub struct FakePlatform {
    start: Instant,
    calls: Mutex<Vec<PlatformCall>>,
    failing_sends: AtomicUsize,
    send_attempts: AtomicUsize,
    profile_fails: AtomicBool,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            calls: Mutex::new(Vec::new()),
            failing_sends: AtomicUsize::new(0),
            send_attempts: AtomicUsize::new(0),
            profile_fails: AtomicBool::new(false),
        }
    }

    /// Make the next `count` sends fail.
    pub fn fail_next_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    pub fn fail_profiles(&self) {
        self.profile_fails.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Successful sends as `(recipient, text, offset)`.
    pub fn sends(&self) -> Vec<(String, String, Duration)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Send {
                    recipient,
                    text,
                    at,
                } => Some((recipient, text, at)),
                PlatformCall::Typing { .. } => None,
            })
            .collect()
    }

    /// Texts successfully sent to `recipient`.
    pub fn texts_to(&self, recipient: &str) -> Vec<String> {
        self.sends()
            .into_iter()
            .filter(|(to, _, _)| to == recipient)
            .map(|(_, text, _)| text)
            .collect()
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }
}

impl Platform for FakePlatform {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn send_message<'a>(
        &'a self,
        recipient_id: &'a str,
        text: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.send_attempts.fetch_add(1, Ordering::SeqCst);
            let should_fail = self
                .failing_sends
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                return Err(AppError::Platform("send rejected".into()));
            }
            self.calls.lock().unwrap().push(PlatformCall::Send {
                recipient: recipient_id.to_owned(),
                text: text.to_owned(),
                at: self.start.elapsed(),
            });
            Ok(())
        }
        .boxed()
    }

    fn send_typing_indicator<'a>(
        &'a self,
        recipient_id: &'a str,
        on: bool,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.calls.lock().unwrap().push(PlatformCall::Typing {
                recipient: recipient_id.to_owned(),
                on,
                at: self.start.elapsed(),
            });
            Ok(())
        }
        .boxed()
    }

    fn get_user_profile<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<UserProfile>> {
        async move {
            if self.profile_fails.load(Ordering::SeqCst) {
                return Err(AppError::Platform("profile unavailable".into()));
            }
            Ok(UserProfile::new(user_id, "Alex Doe", None, "fake"))
        }
        .boxed()
    }
}

/// One generator invocation.
#[derive(Debug, Clone)]
pub struct GenerationCall {
    pub prompt: String,
    pub history: Vec<HistoryTurn>,
    pub images: Vec<String>,
    pub at: Duration,
}

/// Generator fake replaying scripted responses, then a default reply.
pub struct FakeGenerator {
    start: Instant,
    script: Mutex<VecDeque<Result<String>>>,
    default_reply: String,
    calls: Mutex<Vec<GenerationCall>>,
    latency: Mutex<Duration>,
}

impl FakeGenerator {
    pub fn new(default_reply: &str) -> Self {
        Self {
            start: Instant::now(),
            script: Mutex::new(VecDeque::new()),
            default_reply: default_reply.to_owned(),
            calls: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Queue responses returned before the default reply.
    pub fn script(&self, responses: Vec<Result<String>>) {
        self.script.lock().unwrap().extend(responses);
    }

    pub fn calls(&self) -> Vec<GenerationCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Make every later generation take `latency` to answer.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }
}

impl ReplyGenerator for FakeGenerator {
    fn generate_reply<'a>(
        &'a self,
        prompt: &'a str,
        history: &'a [HistoryTurn],
        images: &'a [String],
    ) -> BoxFuture<'a, Result<String>> {
        async move {
            self.calls.lock().unwrap().push(GenerationCall {
                prompt: prompt.to_owned(),
                history: history.to_vec(),
                images: images.to_vec(),
                at: self.start.elapsed(),
            });
            let scripted = self.script.lock().unwrap().pop_front();
            let latency = *self.latency.lock().unwrap();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            scripted.unwrap_or_else(|| Ok(self.default_reply.clone()))
        }
        .boxed()
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, UserProfile>>,
    conversations: Mutex<Vec<ConversationRecord>>,
    events: Mutex<Vec<AnalyticsEvent>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn user(&self, user_id: &str) -> Option<UserProfile> {
        self.users.lock().unwrap().get(user_id).cloned()
    }

    pub fn conversations(&self) -> Vec<ConversationRecord> {
        self.conversations.lock().unwrap().clone()
    }

    pub fn event_types(&self, user_id: &str) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.event_type.clone())
            .collect()
    }

    pub fn count_events(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Db("disk full".into()));
        }
        Ok(())
    }
}

impl ConversationStore for MemoryStore {
    fn get_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<UserProfile>>> {
        async move { Ok(self.user(user_id)) }.boxed()
    }

    fn save_user<'a>(&'a self, profile: &'a UserProfile) -> BoxFuture<'a, Result<()>> {
        async move {
            self.check_writable()?;
            self.users
                .lock()
                .unwrap()
                .insert(profile.user_id.clone(), profile.clone());
            Ok(())
        }
        .boxed()
    }

    fn save_conversation<'a>(
        &'a self,
        record: &'a ConversationRecord,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.check_writable()?;
            self.conversations.lock().unwrap().push(record.clone());
            Ok(())
        }
        .boxed()
    }

    fn get_conversation_history<'a>(
        &'a self,
        user_id: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<HistoryTurn>>> {
        async move {
            let records: Vec<ConversationRecord> = self
                .conversations()
                .into_iter()
                .filter(|r| r.user_id == user_id)
                .collect();
            let skip = records.len().saturating_sub(limit as usize);
            Ok(records
                .into_iter()
                .skip(skip)
                .flat_map(ConversationRecord::into_turns)
                .collect())
        }
        .boxed()
    }

    fn log_analytics_event<'a>(&'a self, event: &'a AnalyticsEvent) -> BoxFuture<'a, Result<()>> {
        async move {
            self.check_writable()?;
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
        .boxed()
    }
}

/// An engine wired to fresh fakes.
pub struct Harness {
    pub engine: Engine,
    pub platform: Arc<FakePlatform>,
    pub generator: Arc<FakeGenerator>,
    pub store: Arc<MemoryStore>,
    pub cancel: CancellationToken,
}

pub fn harness() -> Harness {
    harness_with(EngineSettings::default())
}

pub fn harness_with(settings: EngineSettings) -> Harness {
    let platform = Arc::new(FakePlatform::new());
    let generator = Arc::new(FakeGenerator::new("Happy to help!"));
    let store = Arc::new(MemoryStore::default());
    let cancel = CancellationToken::new();
    let engine = Engine::new(
        settings,
        Collaborators {
            platform: Arc::clone(&platform) as Arc<dyn Platform>,
            generator: Arc::clone(&generator) as Arc<dyn ReplyGenerator>,
            store: Arc::clone(&store) as Arc<dyn ConversationStore>,
        },
        &cancel,
    );
    Harness {
        engine,
        platform,
        generator,
        store,
        cancel,
    }
}

/// Advance the paused clock by `secs` seconds, letting due timers run.
pub async fn advance_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
