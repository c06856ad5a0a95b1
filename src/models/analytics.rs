//! Analytics event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type names recorded by the engine.
pub mod event_types {
    /// An inbound message passed deduplication.
    pub const MESSAGE_RECEIVED: &str = "message_received";
    /// A batch window closed and its pipeline ran.
    pub const BATCH_FLUSHED: &str = "batch_flushed";
    /// A generated reply reached the user.
    pub const REPLY_SENT: &str = "reply_sent";
    /// Generation stayed empty after all retries; the fallback was sent.
    pub const GENERATION_FALLBACK: &str = "generation_fallback";
    /// Sending a reply failed.
    pub const DELIVERY_FAILED: &str = "delivery_failed";
    /// A follow-up sequence was delivered.
    pub const FOLLOW_UP_SENT: &str = "follow_up_sent";
    /// A follow-up fired but the user had been active; nothing was sent.
    pub const FOLLOW_UP_SKIPPED: &str = "follow_up_skipped";
    /// The user clicked a button.
    pub const POSTBACK_CLICKED: &str = "postback_clicked";
}

/// A best-effort analytics record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsEvent {
    /// Unique record identifier.
    pub id: String,
    /// Event type (see [`event_types`]).
    pub event_type: String,
    /// Platform-scoped user identifier.
    pub user_id: String,
    /// Free-form JSON payload.
    pub data: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl AnalyticsEvent {
    /// Construct an event stamped now.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        user_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            user_id: user_id.into(),
            data,
            created_at: Utc::now(),
        }
    }
}
