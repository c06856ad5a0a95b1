//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::models::follow_up::{FollowUpCatalog, FollowUpSequenceDefinition};
use crate::{AppError, Result};

/// Keychain service name under which credentials are stored.
const KEYRING_SERVICE: &str = "concierge";

/// Messaging platform the bot is deployed on.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    /// Facebook Messenger via the Graph Send API.
    Messenger,
    /// Telegram via the Bot API.
    Telegram,
}

impl PlatformKind {
    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Messenger => "messenger",
            Self::Telegram => "telegram",
        }
    }
}

/// Batch window settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BatchingConfig {
    /// Fixed window, measured from the first message of a batch.
    #[serde(default = "default_batch_window")]
    pub window_seconds: u64,
    /// Number of stored exchanges handed to the generator as history.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_batch_window(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_batch_window() -> u64 {
    30
}

fn default_history_limit() -> u32 {
    10
}

/// Duplicate suppression settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DedupConfig {
    /// Window during which identical text from the same sender is dropped.
    #[serde(default = "default_dedup_window")]
    pub window_seconds: u64,
    /// Message-id set size that triggers pruning.
    #[serde(default = "default_dedup_capacity")]
    pub capacity: usize,
    /// Number of most recent ids kept after pruning.
    #[serde(default = "default_dedup_retain")]
    pub retain: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_dedup_window(),
            capacity: default_dedup_capacity(),
            retain: default_dedup_retain(),
        }
    }
}

fn default_dedup_window() -> u64 {
    5
}

fn default_dedup_capacity() -> usize {
    1000
}

fn default_dedup_retain() -> usize {
    500
}

/// Reply generation retry policy.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GenerationConfig {
    /// Total generation attempts before falling back.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Sent when every attempt came back empty or failed.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    /// Sent once when delivering a reply fails.
    #[serde(default = "default_apology_message")]
    pub apology_message: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            fallback_message: default_fallback_message(),
            apology_message: default_apology_message(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_fallback_message() -> String {
    "Thanks for your message! Let me check on that and get back to you shortly.".into()
}

fn default_apology_message() -> String {
    "Sorry, something went wrong on our side. Please try again in a moment.".into()
}

/// Human-paced delivery timing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DeliveryConfig {
    /// Typing indicator duration before each message.
    #[serde(default = "default_typing_delay_ms")]
    pub typing_delay_ms: u64,
    /// Pause between the messages of a follow-up sequence.
    #[serde(default = "default_follow_up_pause_ms")]
    pub follow_up_pause_ms: u64,
    /// Pause after the first half of an automatically split reply.
    #[serde(default = "default_auto_split_wait_ms")]
    pub auto_split_wait_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            typing_delay_ms: default_typing_delay_ms(),
            follow_up_pause_ms: default_follow_up_pause_ms(),
            auto_split_wait_ms: default_auto_split_wait_ms(),
        }
    }
}

fn default_typing_delay_ms() -> u64 {
    1500
}

fn default_follow_up_pause_ms() -> u64 {
    3000
}

fn default_auto_split_wait_ms() -> u64 {
    2000
}

/// Proactive follow-up settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct FollowUpConfig {
    /// Whether follow-ups are armed at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fraction of the delay the user must have been idle for a fire to send.
    #[serde(default = "default_inactivity_ratio")]
    pub inactivity_ratio: f64,
    /// Replacement catalog in priority order; empty keeps the built-in one.
    #[serde(default)]
    pub sequences: Vec<FollowUpSequenceDefinition>,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inactivity_ratio: default_inactivity_ratio(),
            sequences: Vec::new(),
        }
    }
}

impl FollowUpConfig {
    /// Resolve the effective catalog.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configured sequences are invalid.
    pub fn catalog(&self) -> Result<FollowUpCatalog> {
        if self.sequences.is_empty() {
            Ok(FollowUpCatalog::builtin())
        } else {
            FollowUpCatalog::from_definitions(self.sequences.clone())
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_inactivity_ratio() -> f64 {
    0.8
}

/// In-memory conversation state lifetime.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StateConfig {
    /// Idle time after which a conversation state is dropped.
    #[serde(default = "default_idle_ttl_hours")]
    pub idle_ttl_hours: u64,
    /// How often the sweeper runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            idle_ttl_hours: default_idle_ttl_hours(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_idle_ttl_hours() -> u64 {
    24
}

fn default_sweep_interval() -> u64 {
    3600
}

/// OpenAI-compatible reply generator endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// Base URL up to and including the API version (e.g. `https://api.openai.com/v1`).
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// System prompt prepended to every request.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Request timeout.
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    /// API key (populated at runtime, may stay empty for local servers).
    #[serde(skip)]
    pub api_key: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            system_prompt: default_system_prompt(),
            timeout_seconds: default_llm_timeout(),
            api_key: String::new(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}

fn default_system_prompt() -> String {
    "You are a friendly sales assistant for a furniture store. Answer briefly and warmly. \
     You may split a longer answer into two chat bubbles with ||WAIT:<milliseconds>||."
        .into()
}

fn default_llm_timeout() -> u64 {
    60
}

/// Facebook Messenger settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MessengerConfig {
    /// Graph API base URL including the version.
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,
    /// Token echoed during the webhook verification handshake.
    #[serde(default)]
    pub verify_token: String,
    /// Page access token (populated at runtime).
    #[serde(skip)]
    pub page_access_token: String,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            graph_api_base: default_graph_api_base(),
            verify_token: String::new(),
            page_access_token: String::new(),
        }
    }
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com/v19.0".into()
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TelegramConfig {
    /// Bot API base URL.
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    /// Bot token (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
            bot_token: String::new(),
        }
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}

fn default_http_port() -> u16 {
    3000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("concierge.db")
}

fn default_retention_days() -> u32 {
    90
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Messaging platform the bot answers on.
    pub platform: PlatformKind,
    /// HTTP port for the webhook listener.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// `SQLite` database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Days before stored conversations and analytics are purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Batch window settings.
    #[serde(default)]
    pub batching: BatchingConfig,
    /// Duplicate suppression settings.
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Generation retry policy and canned texts.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Delivery pacing.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Follow-up scheduler settings.
    #[serde(default)]
    pub follow_up: FollowUpConfig,
    /// Conversation state lifetime.
    #[serde(default)]
    pub state: StateConfig,
    /// Reply generator endpoint.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Messenger settings.
    #[serde(default)]
    pub messenger: MessengerConfig,
    /// Telegram settings.
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load platform and LLM credentials from OS keychain with env-var fallback.
    ///
    /// The platform token is required; the LLM API key is optional so that
    /// local OpenAI-compatible servers work without one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the platform token cannot be found.
    pub async fn load_credentials(&mut self) -> Result<()> {
        match self.platform {
            PlatformKind::Messenger => {
                self.messenger.page_access_token =
                    load_credential("messenger_page_token", "MESSENGER_PAGE_TOKEN").await?;
            }
            PlatformKind::Telegram => {
                self.telegram.bot_token =
                    load_credential("telegram_bot_token", "TELEGRAM_BOT_TOKEN").await?;
            }
        }
        self.llm.api_key = match load_credential("llm_api_key", "LLM_API_KEY").await {
            Ok(key) => key,
            Err(err) => {
                warn!(%err, "no llm api key configured; sending unauthenticated requests");
                String::new()
            }
        };
        Ok(())
    }

    /// Batch window as a [`Duration`].
    #[must_use]
    pub fn batch_window(&self) -> Duration {
        Duration::from_secs(self.batching.window_seconds)
    }

    /// Conversation idle lifetime as a [`Duration`].
    #[must_use]
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.state.idle_ttl_hours * 3600)
    }

    /// Sweeper period as a [`Duration`].
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.state.sweep_interval_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.batching.window_seconds == 0 {
            return Err(AppError::Config(
                "batching.window_seconds must be greater than zero".into(),
            ));
        }

        if self.generation.max_attempts == 0 {
            return Err(AppError::Config(
                "generation.max_attempts must be greater than zero".into(),
            ));
        }

        if self.dedup.capacity == 0 || self.dedup.retain >= self.dedup.capacity {
            return Err(AppError::Config(
                "dedup.retain must be smaller than a non-zero dedup.capacity".into(),
            ));
        }

        let ratio = self.follow_up.inactivity_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(AppError::Config(
                "follow_up.inactivity_ratio must be in (0, 1]".into(),
            ));
        }

        if self.state.sweep_interval_seconds == 0 {
            return Err(AppError::Config(
                "state.sweep_interval_seconds must be greater than zero".into(),
            ));
        }

        self.follow_up.catalog()?;
        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
