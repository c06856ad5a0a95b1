//! Human-paced outbound delivery.
//!
//! For each message: typing indicator on, a fixed typing delay, send, then
//! the message's `wait_after` pause. The pause after the last message is
//! skipped.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::splitter::OutgoingMessage;
use crate::platform::Platform;
use crate::Result;

/// Paced sender over a [`Platform`].
#[derive(Clone)]
pub struct Delivery {
    platform: Arc<dyn Platform>,
    typing_delay: Duration,
}

impl Delivery {
    /// Create a delivery helper with a fixed per-message typing delay.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, typing_delay: Duration) -> Self {
        Self {
            platform,
            typing_delay,
        }
    }

    /// Underlying platform.
    #[must_use]
    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    /// Deliver `messages` in order with their pauses.
    ///
    /// Stops at the first failed send.
    ///
    /// # Errors
    ///
    /// Returns the platform error of the failed send. Typing indicator
    /// failures are logged and do not abort delivery.
    pub async fn deliver(&self, recipient_id: &str, messages: &[OutgoingMessage]) -> Result<()> {
        let last = messages.len().saturating_sub(1);
        for (index, message) in messages.iter().enumerate() {
            self.send_one(recipient_id, &message.text).await?;
            if index < last && message.wait_after_ms > 0 {
                tokio::time::sleep(Duration::from_millis(message.wait_after_ms)).await;
            }
        }
        Ok(())
    }

    /// Deliver plain texts separated by a fixed `pause`.
    ///
    /// # Errors
    ///
    /// Returns the platform error of the first failed send.
    pub async fn deliver_sequence(
        &self,
        recipient_id: &str,
        texts: &[String],
        pause: Duration,
    ) -> Result<()> {
        let pause_ms = u64::try_from(pause.as_millis()).unwrap_or(u64::MAX);
        let messages: Vec<OutgoingMessage> = texts
            .iter()
            .map(|text| OutgoingMessage {
                text: text.clone(),
                wait_after_ms: pause_ms,
            })
            .collect();
        self.deliver(recipient_id, &messages).await
    }

    async fn send_one(&self, recipient_id: &str, text: &str) -> Result<()> {
        if let Err(err) = self.platform.send_typing_indicator(recipient_id, true).await {
            warn!(recipient_id, %err, "typing indicator failed");
        }
        tokio::time::sleep(self.typing_delay).await;
        self.platform.send_message(recipient_id, text).await?;
        debug!(recipient_id, chars = text.len(), "message delivered");
        Ok(())
    }
}
