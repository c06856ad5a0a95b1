use std::time::Duration;

use tokio::time::Instant;

use concierge::orchestrator::batcher::{AppendOutcome, BatchAggregator};

#[tokio::test(start_paused = true)]
async fn first_append_starts_batch_and_later_ones_join() {
    let batches = BatchAggregator::new(Duration::from_secs(30));
    let t0 = Instant::now();

    assert_eq!(batches.append("u1", Some("Hi there"), &[], t0), AppendOutcome::Started);
    let t1 = t0 + Duration::from_secs(2);
    assert_eq!(
        batches.append("u1", Some("I'm looking for a sofa"), &[], t1),
        AppendOutcome::Appended
    );

    let batch = batches.take("u1").expect("open batch");
    assert_eq!(batch.armed_at, t0);
    assert_eq!(batch.combined_text(), "Hi there\nI'm looking for a sofa");
}

#[tokio::test(start_paused = true)]
async fn take_closes_the_batch() {
    let batches = BatchAggregator::new(Duration::from_secs(30));
    let now = Instant::now();

    batches.append("u1", Some("one"), &[], now);
    assert!(batches.take("u1").is_some());
    assert!(batches.take("u1").is_none());
    assert_eq!(batches.append("u1", Some("two"), &[], now), AppendOutcome::Started);
}

#[tokio::test(start_paused = true)]
async fn images_accumulate_and_empty_text_is_skipped() {
    let batches = BatchAggregator::new(Duration::from_secs(30));
    let now = Instant::now();

    batches.append("u1", Some(""), &["a.jpg".to_owned()], now);
    batches.append("u1", Some("this one"), &["b.jpg".to_owned()], now);

    let batch = batches.pending("u1").expect("open batch");
    assert_eq!(batch.messages, vec!["this one".to_owned()]);
    assert_eq!(batch.images, vec!["a.jpg".to_owned(), "b.jpg".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn batches_are_per_sender() {
    let batches = BatchAggregator::new(Duration::from_secs(30));
    let now = Instant::now();

    assert_eq!(batches.append("u1", Some("a"), &[], now), AppendOutcome::Started);
    assert_eq!(batches.append("u2", Some("b"), &[], now), AppendOutcome::Started);
    assert_eq!(batches.open_batches(), 2);
}
