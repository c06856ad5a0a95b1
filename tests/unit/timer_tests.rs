//! Unit tests for the cancellable timer registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use concierge::orchestrator::timers::{TimerKey, TimerRegistry};

fn counter_action(counter: Arc<AtomicUsize>) -> impl std::future::Future<Output = ()> + Send {
    async move {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn timer_fires_after_delay() {
    let registry = TimerRegistry::new(CancellationToken::new());
    let fired = Arc::new(AtomicUsize::new(0));
    let key = TimerKey::batch("u1");

    assert!(!registry.arm(key.clone(), Duration::from_secs(30), counter_action(Arc::clone(&fired))));
    assert!(registry.is_armed(&key));

    tokio::time::sleep(Duration::from_secs(29)).await;
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!registry.is_armed(&key));
}

#[tokio::test(start_paused = true)]
async fn rearming_replaces_previous_timer() {
    let registry = TimerRegistry::new(CancellationToken::new());
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let key = TimerKey::follow_up("u1");

    registry.arm(key.clone(), Duration::from_secs(10), counter_action(Arc::clone(&first)));
    let replaced = registry.arm(key.clone(), Duration::from_secs(20), counter_action(Arc::clone(&second)));
    assert!(replaced);
    assert_eq!(registry.armed_count(), 1);

    tokio::time::sleep(Duration::from_secs(25)).await;
    settle().await;
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_timer_never_fires() {
    let registry = TimerRegistry::new(CancellationToken::new());
    let fired = Arc::new(AtomicUsize::new(0));
    let key = TimerKey::batch("u1");

    registry.arm(key.clone(), Duration::from_secs(5), counter_action(Arc::clone(&fired)));
    assert!(registry.cancel(&key));
    assert!(!registry.cancel(&key));

    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn keys_are_independent_per_purpose_and_sender() {
    let registry = TimerRegistry::new(CancellationToken::new());
    let fired = Arc::new(AtomicUsize::new(0));

    registry.arm(TimerKey::batch("u1"), Duration::from_secs(5), counter_action(Arc::clone(&fired)));
    registry.arm(TimerKey::follow_up("u1"), Duration::from_secs(5), counter_action(Arc::clone(&fired)));
    registry.arm(TimerKey::batch("u2"), Duration::from_secs(5), counter_action(Arc::clone(&fired)));
    assert_eq!(registry.armed_count(), 3);

    registry.cancel(&TimerKey::batch("u1"));
    tokio::time::sleep(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn deadline_reports_fire_time() {
    let registry = TimerRegistry::new(CancellationToken::new());
    let key = TimerKey::follow_up("u1");
    let start = Instant::now();

    registry.arm(key.clone(), Duration::from_secs(900), async {});
    assert_eq!(registry.deadline(&key), Some(start + Duration::from_secs(900)));
    assert_eq!(registry.deadline(&TimerKey::batch("u1")), None);
}

#[tokio::test(start_paused = true)]
async fn cancel_all_and_root_token_stop_everything() {
    let root = CancellationToken::new();
    let registry = TimerRegistry::new(root.clone());
    let fired = Arc::new(AtomicUsize::new(0));

    registry.arm(TimerKey::batch("u1"), Duration::from_secs(5), counter_action(Arc::clone(&fired)));
    registry.arm(TimerKey::batch("u2"), Duration::from_secs(5), counter_action(Arc::clone(&fired)));
    assert_eq!(registry.cancel_all(), 2);
    assert_eq!(registry.armed_count(), 0);

    registry.arm(TimerKey::batch("u3"), Duration::from_secs(5), counter_action(Arc::clone(&fired)));
    root.cancel();

    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn action_may_rearm_its_own_key() {
    let registry = Arc::new(TimerRegistry::new(CancellationToken::new()));
    let fired = Arc::new(AtomicUsize::new(0));
    let key = TimerKey::follow_up("u1");

    let chained = {
        let registry = Arc::clone(&registry);
        let key = key.clone();
        let fired = Arc::clone(&fired);
        async move {
            fired.fetch_add(1, Ordering::SeqCst);
            registry.arm(key, Duration::from_secs(60), counter_action(Arc::clone(&fired)));
        }
    };
    registry.arm(key.clone(), Duration::from_secs(10), chained);

    tokio::time::sleep(Duration::from_secs(11)).await;
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(registry.is_armed(&key));

    tokio::time::sleep(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}
