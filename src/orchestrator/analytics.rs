//! Fire-and-forget analytics recording.

use std::sync::Arc;

use tracing::warn;

use crate::models::analytics::AnalyticsEvent;
use crate::persistence::ConversationStore;

/// Spawns analytics writes so the user-facing path never waits on them.
#[derive(Clone)]
pub struct AnalyticsRecorder {
    store: Arc<dyn ConversationStore>,
}

impl AnalyticsRecorder {
    /// Wrap the store events are written to.
    #[must_use]
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Record an event in the background. Failures are logged and dropped.
    pub fn record(&self, event_type: &str, user_id: &str, data: serde_json::Value) {
        let store = Arc::clone(&self.store);
        let event = AnalyticsEvent::new(event_type, user_id, data);
        tokio::spawn(async move {
            if let Err(err) = store.log_analytics_event(&event).await {
                warn!(event_type = %event.event_type, %err, "analytics write failed");
            }
        });
    }
}
