//! Unit tests for duplicate suppression.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use concierge::orchestrator::dedup::DedupFilter;

fn filter() -> DedupFilter {
    DedupFilter::new(Duration::from_secs(5), 1000, 500)
}

#[tokio::test(start_paused = true)]
async fn seen_message_id_is_rejected_forever() {
    let dedup = filter();
    let now = Instant::now();

    assert!(dedup.should_process("u1", Some("m1"), "hello", now));
    let later = now + Duration::from_secs(3600);
    assert!(!dedup.should_process("u1", Some("m1"), "different text", later));
}

#[tokio::test(start_paused = true)]
async fn identical_text_within_window_is_rejected() {
    let dedup = filter();
    let now = Instant::now();

    assert!(dedup.should_process("u1", None, "hello", now));
    assert!(!dedup.should_process("u1", None, "hello", now + Duration::from_millis(4999)));
    assert!(dedup.should_process("u1", None, "hello", now + Duration::from_secs(5)));
}

#[tokio::test(start_paused = true)]
async fn text_dedup_is_per_sender() {
    let dedup = filter();
    let now = Instant::now();

    assert!(dedup.should_process("u1", None, "hello", now));
    assert!(dedup.should_process("u2", None, "hello", now));
}

#[tokio::test(start_paused = true)]
async fn different_text_is_accepted() {
    let dedup = filter();
    let now = Instant::now();

    assert!(dedup.should_process("u1", None, "hello", now));
    assert!(dedup.should_process("u1", None, "hello again", now));
    assert!(dedup.should_process("u1", None, "hello", now));
}

#[tokio::test(start_paused = true)]
async fn rejected_text_does_not_record_its_id() {
    let dedup = filter();
    let now = Instant::now();

    assert!(dedup.should_process("u1", Some("m1"), "hello", now));
    assert!(!dedup.should_process("u1", Some("m2"), "hello", now));
    assert_eq!(dedup.remembered_ids(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_text_is_filtered_by_id_only() {
    let dedup = filter();
    let now = Instant::now();

    assert!(dedup.should_process("u1", Some("img1"), "", now));
    assert!(dedup.should_process("u1", Some("img2"), "", now));
    assert!(!dedup.should_process("u1", Some("img1"), "", now));
}

#[tokio::test(start_paused = true)]
async fn id_set_is_pruned_to_retain_when_over_capacity() {
    let dedup = DedupFilter::new(Duration::from_secs(5), 10, 5);
    let now = Instant::now();

    for i in 0..11 {
        assert!(dedup.should_process("u1", Some(&format!("m{i}")), "", now));
    }
    assert_eq!(dedup.remembered_ids(), 5);

    // The newest ids survive, the oldest are forgotten.
    assert!(!dedup.should_process("u1", Some("m10"), "", now));
    assert!(dedup.should_process("u1", Some("m0"), "", now));
}

#[tokio::test(start_paused = true)]
async fn prune_expired_drops_old_texts() {
    let dedup = filter();
    let now = Instant::now();

    dedup.should_process("u1", None, "a", now);
    dedup.should_process("u2", None, "b", now + Duration::from_secs(4));

    assert_eq!(dedup.prune_expired(now + Duration::from_secs(6)), 1);
}

#[test]
fn racing_redeliveries_are_accepted_once() {
    let dedup = filter();
    let now = Instant::now();
    let accepted = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let (dedup, accepted) = (&dedup, &accepted);
            scope.spawn(move || {
                let sender = format!("u{worker}");
                if dedup.should_process(&sender, Some("mid.shared"), "", now) {
                    accepted.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(dedup.remembered_ids(), 1);
}
