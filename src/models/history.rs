//! Stored conversation turns and the history view handed to the generator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a history turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// The chat user.
    User,
    /// The bot.
    Assistant,
}

/// One message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryTurn {
    /// Author of the turn.
    pub role: TurnRole,
    /// Message text.
    pub text: String,
    /// When the turn happened.
    pub created_at: DateTime<Utc>,
}

/// One persisted exchange: the combined user prompt and the bot's reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationRecord {
    /// Unique record identifier.
    pub id: String,
    /// Platform-scoped user identifier.
    pub user_id: String,
    /// Combined user text for the turn.
    pub user_message: String,
    /// Text delivered back to the user.
    pub bot_reply: String,
    /// Images attached to the turn.
    pub image_urls: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ConversationRecord {
    /// Construct a record stamped now.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        user_message: impl Into<String>,
        bot_reply: impl Into<String>,
        image_urls: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            user_message: user_message.into(),
            bot_reply: bot_reply.into(),
            image_urls,
            created_at: Utc::now(),
        }
    }

    /// Expand the exchange into a user turn followed by an assistant turn.
    ///
    /// Empty sides are skipped (follow-ups have no user message).
    #[must_use]
    pub fn into_turns(self) -> Vec<HistoryTurn> {
        let mut turns = Vec::with_capacity(2);
        if !self.user_message.is_empty() {
            turns.push(HistoryTurn {
                role: TurnRole::User,
                text: self.user_message,
                created_at: self.created_at,
            });
        }
        if !self.bot_reply.is_empty() {
            turns.push(HistoryTurn {
                role: TurnRole::Assistant,
                text: self.bot_reply,
                created_at: self.created_at,
            });
        }
        turns
    }
}
