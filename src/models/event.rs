//! Inbound chat events delivered by a messaging platform webhook.

use chrono::{DateTime, Utc};

/// One user message received from the messaging platform.
///
/// Ephemeral: the engine consumes it immediately (dedup, then batching).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Platform-scoped identifier of the user who sent the message.
    pub sender_id: String,
    /// Platform message identifier, when the platform supplies one.
    pub platform_message_id: Option<String>,
    /// Message text, absent for attachment-only messages.
    pub text: Option<String>,
    /// Image attachment URLs in the order they were attached.
    pub image_urls: Vec<String>,
    /// When the webhook delivered the event.
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    /// Construct a text-only event received now.
    #[must_use]
    pub fn text(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            platform_message_id: None,
            text: Some(text.into()),
            image_urls: Vec::new(),
            received_at: Utc::now(),
        }
    }

    /// Attach the platform message identifier.
    #[must_use]
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.platform_message_id = Some(id.into());
        self
    }

    /// Attach image URLs.
    #[must_use]
    pub fn with_images(mut self, urls: Vec<String>) -> Self {
        self.image_urls = urls;
        self
    }

    /// Trimmed text, or an empty string for attachment-only events.
    #[must_use]
    pub fn trimmed_text(&self) -> &str {
        self.text.as_deref().map_or("", str::trim)
    }

    /// Whether the event carries neither text nor images.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trimmed_text().is_empty() && self.image_urls.is_empty()
    }
}

/// A button click (postback) from a structured message or persistent menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostbackEvent {
    /// Platform-scoped identifier of the user who clicked.
    pub sender_id: String,
    /// Developer-defined payload attached to the button.
    pub payload: String,
    /// Button title as displayed to the user.
    pub title: Option<String>,
    /// When the webhook delivered the event.
    pub received_at: DateTime<Utc>,
}

impl PostbackEvent {
    /// Construct a postback event received now.
    #[must_use]
    pub fn new(
        sender_id: impl Into<String>,
        payload: impl Into<String>,
        title: Option<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            payload: payload.into(),
            title,
            received_at: Utc::now(),
        }
    }
}

/// A normalized webhook event, independent of the originating platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// A user message (text and/or images).
    Message(InboundEvent),
    /// A button click.
    Postback(PostbackEvent),
}
