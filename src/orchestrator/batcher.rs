//! Per-sender fixed-window message batching.
//!
//! The first accepted message from a sender opens a batch; later messages
//! are appended until the window, measured from that first message, closes.
//! The window never slides: continuous typing cannot postpone the reply.

use std::time::Duration;

use tokio::time::Instant;

use super::shard::ShardedMap;

/// Messages and images accumulated during one batch window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Message texts in arrival order.
    pub messages: Vec<String>,
    /// Image URLs in arrival order.
    pub images: Vec<String>,
    /// When the first message opened the batch.
    pub armed_at: Instant,
}

impl Batch {
    /// All message texts joined into one prompt, one message per line.
    #[must_use]
    pub fn combined_text(&self) -> String {
        self.messages.join("\n")
    }
}

/// Result of appending content to a sender's batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// No batch was open; a new one was created and the caller must arm its timer.
    Started,
    /// Content joined the already open batch; its timer is left untouched.
    Appended,
}

/// Open batches keyed by sender.
pub struct BatchAggregator {
    window: Duration,
    batches: ShardedMap<String, Batch>,
}

impl BatchAggregator {
    /// Create an aggregator with a fixed batch `window`.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            batches: ShardedMap::new(),
        }
    }

    /// Configured batch window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Append text and images to the sender's batch, opening one if needed.
    pub fn append(
        &self,
        sender_id: &str,
        text: Option<&str>,
        images: &[String],
        now: Instant,
    ) -> AppendOutcome {
        self.batches.with(sender_id, |map| {
            let outcome = if map.contains_key(sender_id) {
                AppendOutcome::Appended
            } else {
                AppendOutcome::Started
            };
            let batch = map.entry(sender_id.to_owned()).or_insert_with(|| Batch {
                messages: Vec::new(),
                images: Vec::new(),
                armed_at: now,
            });
            if let Some(text) = text.filter(|t| !t.is_empty()) {
                batch.messages.push(text.to_owned());
            }
            batch.images.extend(images.iter().cloned());
            outcome
        })
    }

    /// Atomically remove and return the sender's open batch.
    ///
    /// Content appended after this call opens a fresh batch.
    pub fn take(&self, sender_id: &str) -> Option<Batch> {
        self.batches.with(sender_id, |map| map.remove(sender_id))
    }

    /// Snapshot of the sender's open batch.
    #[must_use]
    pub fn pending(&self, sender_id: &str) -> Option<Batch> {
        self.batches.with(sender_id, |map| map.get(sender_id).cloned())
    }

    /// Number of open batches.
    #[must_use]
    pub fn open_batches(&self) -> usize {
        self.batches.len()
    }
}
