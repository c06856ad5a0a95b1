//! Integration tests for the retention purge task.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use concierge::models::analytics::AnalyticsEvent;
use concierge::models::history::ConversationRecord;
use concierge::persistence::analytics_repo::AnalyticsRepo;
use concierge::persistence::conversation_repo::ConversationRepo;
use concierge::persistence::{db, retention};

#[tokio::test]
async fn purge_removes_only_expired_rows() {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let conversations = ConversationRepo::new(Arc::clone(&db));
    let analytics = AnalyticsRepo::new(Arc::clone(&db));

    let mut old = ConversationRecord::new("u1", "old question", "old answer", Vec::new());
    old.created_at = Utc::now() - Duration::days(120);
    let fresh = ConversationRecord::new("u1", "new question", "new answer", Vec::new());
    conversations.insert(&old).await.expect("insert old");
    conversations.insert(&fresh).await.expect("insert fresh");

    let mut old_event = AnalyticsEvent::new("reply_sent", "u1", json!({}));
    old_event.created_at = Utc::now() - Duration::days(91);
    let fresh_event = AnalyticsEvent::new("reply_sent", "u1", json!({}));
    analytics.insert(&old_event).await.expect("insert old event");
    analytics.insert(&fresh_event).await.expect("insert fresh event");

    let (removed_conversations, removed_events) =
        retention::purge(&db, 90).await.expect("purge");
    assert_eq!(removed_conversations, 1);
    assert_eq!(removed_events, 1);

    let remaining = conversations.recent_for_user("u1", 10).await.expect("query");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].user_message, "new question");
    assert_eq!(analytics.count_by_type("reply_sent").await.expect("count"), 1);
}

#[tokio::test]
async fn retention_task_stops_on_cancel() {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let ct = tokio_util::sync::CancellationToken::new();
    let handle = retention::spawn_retention_task(db, 30, ct.clone());

    ct.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("task exits promptly")
        .expect("task did not panic");
}
