//! Messaging platform abstraction.
//!
//! The [`Platform`] trait decouples the orchestration engine from the
//! messaging transport. Each supported platform provides one
//! implementation; the engine only ever sees `Arc<dyn Platform>`.

pub mod messenger;
pub mod telegram;

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::config::{GlobalConfig, PlatformKind};
use crate::models::user::UserProfile;
use crate::Result;

pub use messenger::MessengerPlatform;
pub use telegram::TelegramPlatform;

/// Outbound capabilities the engine needs from a messaging platform.
pub trait Platform: Send + Sync {
    /// Platform label stored with user profiles (`messenger`, `telegram`).
    fn name(&self) -> &'static str;

    /// Send a text message to a user.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Platform`](crate::AppError::Platform) if the API call fails.
    fn send_message<'a>(&'a self, recipient_id: &'a str, text: &'a str)
        -> BoxFuture<'a, Result<()>>;

    /// Show or hide the typing indicator in the user's chat.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Platform`](crate::AppError::Platform) if the API call fails.
    fn send_typing_indicator<'a>(&'a self, recipient_id: &'a str, on: bool)
        -> BoxFuture<'a, Result<()>>;

    /// Fetch the user's display profile.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Platform`](crate::AppError::Platform) if the API call fails.
    fn get_user_profile<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<UserProfile>>;
}

/// Build the platform selected in the configuration.
///
/// # Errors
///
/// Returns `AppError::Config` if the platform's token was not loaded or
/// its HTTP client cannot be constructed.
pub fn build_platform(config: &GlobalConfig) -> Result<Arc<dyn Platform>> {
    match config.platform {
        PlatformKind::Messenger => Ok(Arc::new(MessengerPlatform::new(&config.messenger)?)),
        PlatformKind::Telegram => Ok(Arc::new(TelegramPlatform::new(&config.telegram)?)),
    }
}
