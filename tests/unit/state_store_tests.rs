//! Unit tests for in-memory conversation state.

use std::time::Duration;

use tokio::time::Instant;

use concierge::models::conversation::Urgency;
use concierge::models::trigger;
use concierge::orchestrator::detector::detect;
use concierge::orchestrator::state_store::ConversationStateStore;

#[tokio::test(start_paused = true)]
async fn first_activity_creates_state() {
    let store = ConversationStateStore::new();
    let now = Instant::now();

    let first = store.record_activity("u1", now);
    assert!(first.is_new);
    assert_eq!(first.message_count, 1);

    let second = store.record_activity("u1", now + Duration::from_secs(1));
    assert!(!second.is_new);
    assert_eq!(second.message_count, 2);

    let state = store.snapshot("u1").expect("state");
    assert_eq!(state.last_activity, now + Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn detection_accumulates_across_turns() {
    let store = ConversationStateStore::new();
    let now = Instant::now();
    store.record_activity("u1", now);

    store.apply_detection("u1", &detect("how much is the sofa, I need it asap"));
    let state = store
        .apply_detection("u1", &detect("also a dining table, no rush"))
        .expect("state");

    assert_eq!(state.interests, vec!["sofa".to_owned(), "table".to_owned()]);
    assert!(state.triggers_seen.contains(trigger::PRICE_ASKED));
    assert!(state.triggers_seen.contains(trigger::URGENT_REQUEST));
    assert!(state.triggers_seen.contains(trigger::MULTIPLE_CATEGORIES));
    assert!(state.triggers_seen.contains(trigger::FIRST_VISIT));
    assert_eq!(state.urgency, Urgency::Low);
}

#[tokio::test(start_paused = true)]
async fn first_visit_stops_after_three_messages() {
    let store = ConversationStateStore::new();
    let now = Instant::now();
    for _ in 0..4 {
        store.record_activity("u1", now);
    }

    let state = store.apply_detection("u1", &detect("hello")).expect("state");
    assert!(!state.triggers_seen.contains(trigger::FIRST_VISIT));
}

#[tokio::test(start_paused = true)]
async fn detection_for_unknown_sender_is_ignored() {
    let store = ConversationStateStore::new();
    assert!(store.apply_detection("ghost", &detect("sofa")).is_none());
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn sweep_removes_idle_unarmed_states() {
    let store = ConversationStateStore::new();
    let now = Instant::now();
    store.record_activity("idle", now);
    store.record_activity("armed", now);
    store.record_activity("fresh", now + Duration::from_secs(3600));
    store.update("armed", |state| state.follow_up_armed = true);

    let removed = store.sweep_idle(now + Duration::from_secs(7200), Duration::from_secs(7200));
    assert_eq!(removed, vec!["idle".to_owned()]);
    assert_eq!(store.len(), 2);
}
