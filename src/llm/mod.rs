//! Reply generation seam.

pub mod openai;

use futures_util::future::BoxFuture;

use crate::models::history::HistoryTurn;
use crate::Result;

pub use openai::OpenAiGenerator;

/// Produces the bot's reply to a combined user prompt.
///
/// An empty string is a valid return value; the engine treats it as a
/// transient failure and retries.
pub trait ReplyGenerator: Send + Sync {
    /// Generate a reply for `prompt` given prior `history` and attached `images`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Generation` when the backend call fails.
    fn generate_reply<'a>(
        &'a self,
        prompt: &'a str,
        history: &'a [HistoryTurn],
        images: &'a [String],
    ) -> BoxFuture<'a, Result<String>>;
}
