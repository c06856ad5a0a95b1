//! User profile model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat user as known to the bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    /// Platform-scoped user identifier.
    pub user_id: String,
    /// Display name reported by the platform.
    pub name: String,
    /// Profile picture URL, when the platform exposes one.
    pub avatar_url: Option<String>,
    /// Platform the user talks to the bot through (`messenger`, `telegram`).
    pub platform: String,
    /// When the bot first saw this user.
    pub first_seen_at: DateTime<Utc>,
}

impl UserProfile {
    /// Construct a profile first seen now.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        avatar_url: Option<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            avatar_url,
            platform: platform.into(),
            first_seen_at: Utc::now(),
        }
    }

    /// Placeholder profile used when the platform lookup fails.
    #[must_use]
    pub fn anonymous(user_id: impl Into<String>, platform: impl Into<String>) -> Self {
        Self::new(user_id, "Customer", None, platform)
    }
}
