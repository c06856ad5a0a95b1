//! Facebook Messenger adapter: Graph Send API client and webhook payloads.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::Platform;
use crate::config::MessengerConfig;
use crate::models::event::{InboundEvent, PostbackEvent, WebhookEvent};
use crate::models::user::UserProfile;
use crate::{AppError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Messenger Send API client bound to one page.
pub struct MessengerPlatform {
    client: reqwest::Client,
    graph_api_base: String,
    page_access_token: String,
}

impl MessengerPlatform {
    /// Create a client from the Messenger configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the page access token is missing or the
    /// HTTP client cannot be built.
    pub fn new(config: &MessengerConfig) -> Result<Self> {
        if config.page_access_token.is_empty() {
            return Err(AppError::Config(
                "messenger page access token is not loaded".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            graph_api_base: config.graph_api_base.trim_end_matches('/').to_owned(),
            page_access_token: config.page_access_token.clone(),
        })
    }

    async fn post_send_api(&self, body: serde_json::Value) -> Result<()> {
        let url = format!(
            "{}/me/messages?access_token={}",
            self.graph_api_base, self.page_access_token
        );
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(AppError::Platform(format!("send api failed: {status} {text}")));
        }
        Ok(())
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<UserProfile> {
        let url = format!(
            "{}/{user_id}?fields=first_name,last_name,profile_pic&access_token={}",
            self.graph_api_base, self.page_access_token
        );
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(AppError::Platform(format!(
                "profile lookup failed: {status} {text}"
            )));
        }
        let profile: GraphProfile = res.json().await?;
        let name = [profile.first_name, profile.last_name]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            return Ok(UserProfile {
                avatar_url: profile.profile_pic,
                ..UserProfile::anonymous(user_id, "messenger")
            });
        }
        Ok(UserProfile::new(user_id, name, profile.profile_pic, "messenger"))
    }
}

impl Platform for MessengerPlatform {
    fn name(&self) -> &'static str {
        "messenger"
    }

    fn send_message<'a>(
        &'a self,
        recipient_id: &'a str,
        text: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            debug!(recipient_id, "messenger send");
            self.post_send_api(json!({
                "recipient": { "id": recipient_id },
                "messaging_type": "RESPONSE",
                "message": { "text": text },
            }))
            .await
        }
        .boxed()
    }

    fn send_typing_indicator<'a>(
        &'a self,
        recipient_id: &'a str,
        on: bool,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let action = if on { "typing_on" } else { "typing_off" };
            self.post_send_api(json!({
                "recipient": { "id": recipient_id },
                "sender_action": action,
            }))
            .await
        }
        .boxed()
    }

    fn get_user_profile<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<UserProfile>> {
        self.fetch_profile(user_id).boxed()
    }
}

#[derive(Debug, Deserialize)]
struct GraphProfile {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    profile_pic: Option<String>,
}

/// Answer the webhook subscription handshake.
///
/// Returns the challenge to echo when `mode` is `subscribe` and the token
/// matches the configured verify token.
#[must_use]
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: &str,
) -> Option<String> {
    if expected_token.is_empty() {
        return None;
    }
    match (mode, token, challenge) {
        (Some("subscribe"), Some(token), Some(challenge)) if token == expected_token => {
            Some(challenge.to_owned())
        }
        _ => None,
    }
}

/// Top-level Messenger webhook body.
#[derive(Debug, Deserialize)]
pub struct MessengerWebhook {
    /// Subscription object type; `page` for Messenger.
    pub object: String,
    /// Batched page entries.
    #[serde(default)]
    pub entry: Vec<MessengerEntry>,
}

/// One page entry.
#[derive(Debug, Deserialize)]
pub struct MessengerEntry {
    /// Messaging events for the page.
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

/// One messaging event (message or postback).
#[derive(Debug, Deserialize)]
pub struct MessagingEvent {
    /// User who triggered the event.
    pub sender: Participant,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Message body, for message events.
    #[serde(default)]
    pub message: Option<MessengerMessage>,
    /// Postback body, for button clicks.
    #[serde(default)]
    pub postback: Option<MessengerPostback>,
}

/// Sender or recipient reference.
#[derive(Debug, Deserialize)]
pub struct Participant {
    /// Page-scoped id.
    pub id: String,
}

/// Message body.
#[derive(Debug, Deserialize)]
pub struct MessengerMessage {
    /// Message id.
    #[serde(default)]
    pub mid: Option<String>,
    /// Text content.
    #[serde(default)]
    pub text: Option<String>,
    /// Set on messages sent by the page itself.
    #[serde(default)]
    pub is_echo: bool,
    /// Attachments (images, files, ...).
    #[serde(default)]
    pub attachments: Vec<MessengerAttachment>,
}

/// Message attachment.
#[derive(Debug, Deserialize)]
pub struct MessengerAttachment {
    /// Attachment type (`image`, `video`, `file`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Attachment payload.
    #[serde(default)]
    pub payload: Option<AttachmentPayload>,
}

/// Attachment payload.
#[derive(Debug, Deserialize)]
pub struct AttachmentPayload {
    /// Download URL.
    #[serde(default)]
    pub url: Option<String>,
}

/// Postback body.
#[derive(Debug, Deserialize)]
pub struct MessengerPostback {
    /// Button title.
    #[serde(default)]
    pub title: Option<String>,
    /// Button payload.
    pub payload: String,
}

impl MessengerWebhook {
    /// Normalize the webhook body into engine events.
    ///
    /// Echoes of the page's own messages and non-`page` objects are dropped.
    #[must_use]
    pub fn into_events(self) -> Vec<WebhookEvent> {
        if self.object != "page" {
            return Vec::new();
        }
        self.entry
            .into_iter()
            .flat_map(|entry| entry.messaging)
            .filter_map(MessagingEvent::into_event)
            .collect()
    }
}

impl MessagingEvent {
    fn into_event(self) -> Option<WebhookEvent> {
        let received_at = self
            .timestamp
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        if let Some(postback) = self.postback {
            return Some(WebhookEvent::Postback(PostbackEvent {
                sender_id: self.sender.id,
                payload: postback.payload,
                title: postback.title,
                received_at,
            }));
        }

        let message = self.message.filter(|m| !m.is_echo)?;
        let image_urls = message
            .attachments
            .into_iter()
            .filter(|a| a.kind == "image")
            .filter_map(|a| a.payload.and_then(|p| p.url))
            .collect();
        let event = InboundEvent {
            sender_id: self.sender.id,
            platform_message_id: message.mid,
            text: message.text,
            image_urls,
            received_at,
        };
        (!event.is_empty()).then_some(WebhookEvent::Message(event))
    }
}
