//! Telegram Bot API adapter.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::Platform;
use crate::config::TelegramConfig;
use crate::models::event::{InboundEvent, PostbackEvent, WebhookEvent};
use crate::models::user::UserProfile;
use crate::{AppError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on `getFile` while a webhook request waits for it.
pub const PHOTO_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Telegram Bot API client.
pub struct TelegramPlatform {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatInfo {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    #[serde(default)]
    file_path: Option<String>,
}

impl TelegramPlatform {
    /// Create a client from the Telegram configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the bot token is missing or the HTTP
    /// client cannot be built.
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(AppError::Config("telegram bot token is not loaded".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let url = format!("{}/bot{}/{method}", self.api_base, self.bot_token);
        let res = self.client.post(&url).json(&body).send().await?;
        let status = res.status();
        let envelope: ApiEnvelope<T> = res.json().await?;
        if !envelope.ok {
            let reason = envelope.description.unwrap_or_else(|| status.to_string());
            return Err(AppError::Platform(format!("{method} failed: {reason}")));
        }
        envelope
            .result
            .ok_or_else(|| AppError::Platform(format!("{method} returned no result")))
    }

    /// Resolve a Telegram `file_id` into a downloadable URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Platform` if `getFile` fails, or `AppError::NotFound`
    /// if Telegram no longer holds the file.
    pub async fn file_url(&self, file_id: &str) -> Result<String> {
        let info: FileInfo = self.call("getFile", json!({ "file_id": file_id })).await?;
        let path = info
            .file_path
            .ok_or_else(|| AppError::NotFound(format!("telegram file {file_id}")))?;
        Ok(format!("{}/file/bot{}/{path}", self.api_base, self.bot_token))
    }

    /// Normalize an update, resolving an attached photo into a URL.
    ///
    /// A photo that cannot be resolved within [`PHOTO_RESOLVE_TIMEOUT`] is
    /// dropped; the caption still goes through.
    pub async fn resolve_update(&self, update: TelegramUpdate) -> Option<WebhookEvent> {
        let mut images = Vec::new();
        if let Some(file_id) = update.photo_file_id() {
            match tokio::time::timeout(PHOTO_RESOLVE_TIMEOUT, self.file_url(file_id)).await {
                Ok(Ok(url)) => images.push(url),
                Ok(Err(err)) => warn!(%err, "failed to resolve telegram photo"),
                Err(_) => warn!(file_id, "telegram photo lookup timed out"),
            }
        }
        update.into_event(images)
    }
}

impl Platform for TelegramPlatform {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn send_message<'a>(
        &'a self,
        recipient_id: &'a str,
        text: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            debug!(recipient_id, "telegram send");
            let _: serde_json::Value = self
                .call("sendMessage", json!({ "chat_id": recipient_id, "text": text }))
                .await?;
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
            // Telegram clears the indicator itself when the next message lands.
            if !on {
                return Ok(());
            }
            let _: bool = self
                .call(
                    "sendChatAction",
                    json!({ "chat_id": recipient_id, "action": "typing" }),
                )
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn get_user_profile<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<UserProfile>> {
        async move {
            let chat: ChatInfo = self.call("getChat", json!({ "chat_id": user_id })).await?;
            let name = [chat.first_name, chat.last_name]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            let name = if name.is_empty() { chat.title } else { Some(name) };
            Ok(match name {
                Some(name) => UserProfile::new(user_id, name, None, "telegram"),
                None => UserProfile::anonymous(user_id, "telegram"),
            })
        }
        .boxed()
    }
}

/// One Telegram webhook update.
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    /// Monotonic update id.
    pub update_id: i64,
    /// New incoming message.
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    /// Inline keyboard button press.
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// Incoming message.
#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    /// Message id, unique within the chat.
    pub message_id: i64,
    /// Chat the message belongs to.
    pub chat: TelegramChat,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub date: Option<i64>,
    /// Message text.
    #[serde(default)]
    pub text: Option<String>,
    /// Photo caption.
    #[serde(default)]
    pub caption: Option<String>,
    /// Available photo sizes, smallest first.
    #[serde(default)]
    pub photo: Vec<PhotoSize>,
}

/// Chat reference.
#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    /// Chat id.
    pub id: i64,
}

/// One photo size.
#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    /// File identifier for `getFile`.
    pub file_id: String,
}

/// Inline keyboard button press.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Query id.
    pub id: String,
    /// Message the keyboard was attached to.
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    /// Button callback data.
    #[serde(default)]
    pub data: Option<String>,
}

impl TelegramUpdate {
    /// Largest attached photo, if any.
    #[must_use]
    pub fn photo_file_id(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|m| m.photo.last())
            .map(|p| p.file_id.as_str())
    }

    /// Normalize into an engine event with already resolved image URLs.
    #[must_use]
    pub fn into_event(self, image_urls: Vec<String>) -> Option<WebhookEvent> {
        if let Some(query) = self.callback_query {
            let chat = query.message?.chat.id;
            return Some(WebhookEvent::Postback(PostbackEvent::new(
                chat.to_string(),
                query.data?,
                None,
            )));
        }
        let message = self.message?;
        let received_at = message
            .date
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);
        let chat_id = message.chat.id.to_string();
        let event = InboundEvent {
            platform_message_id: Some(format!("{chat_id}:{}", message.message_id)),
            sender_id: chat_id,
            text: message.text.or(message.caption),
            image_urls,
            received_at,
        };
        (!event.is_empty()).then_some(WebhookEvent::Message(event))
    }
}
