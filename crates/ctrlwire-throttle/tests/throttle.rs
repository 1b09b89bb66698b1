//! Integration tests for the per-key throttle.
//!
//! Runs on paused Tokio time so window boundaries are exact.

use std::time::Duration;

use ctrlwire_throttle::{SlotState, Throttle, ThrottleConfig};
use tokio::time::{self, Instant};

// =========================================================================
// Helpers
// =========================================================================

fn throttle_ms(ms: u64) -> Throttle<String, u32> {
    Throttle::new(ThrottleConfig {
        interval_us: ms * 1_000,
    })
}

fn key(s: &str) -> String {
    s.to_string()
}

// =========================================================================
// Leading edge
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_idle_key_fires_immediately() {
    let mut t = throttle_ms(100);
    assert_eq!(t.offer(key("a"), 1), Some(1));
    assert_eq!(t.state(&key("a")), SlotState::Pending);
    assert_eq!(t.metrics().fired_leading, 1);
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_independent() {
    let mut t = throttle_ms(100);
    assert_eq!(t.offer(key("a"), 1), Some(1));
    assert_eq!(t.offer(key("b"), 2), Some(2));
    assert_eq!(t.len(), 2);
}

// =========================================================================
// Trailing edge
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_offers_inside_window_coalesce_to_latest() {
    let mut t = throttle_ms(100);
    t.offer(key("a"), 1);
    assert_eq!(t.offer(key("a"), 2), None);
    assert_eq!(t.offer(key("a"), 3), None);
    assert_eq!(t.state(&key("a")), SlotState::Cooling);

    let fired = t.wait_expired().await;
    assert_eq!(fired, vec![(key("a"), 3)]);
    assert_eq!(t.metrics().fired_trailing, 1);
    assert_eq!(t.metrics().coalesced, 1);

    // The trailing fire opened a new window.
    assert_eq!(t.state(&key("a")), SlotState::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_trailing_fire_waits_full_interval() {
    let mut t = throttle_ms(100);
    let start = Instant::now();
    t.offer(key("a"), 1);
    time::advance(Duration::from_millis(30)).await;
    t.offer(key("a"), 2);

    t.wait_expired().await;
    assert_eq!(Instant::now() - start, Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_pending_window_closes_to_idle() {
    let mut t = throttle_ms(100);
    t.offer(key("a"), 1);

    let fired = t.wait_expired().await;
    assert!(fired.is_empty());
    assert_eq!(t.state(&key("a")), SlotState::Idle);
    assert!(t.next_deadline().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_overdue_window_fires_on_offer() {
    let mut t = throttle_ms(100);
    t.offer(key("a"), 1);
    t.offer(key("a"), 2);

    // The timer was never serviced, but the window is over.
    time::advance(Duration::from_millis(150)).await;
    assert_eq!(t.offer(key("a"), 3), Some(3));
    assert_eq!(t.state(&key("a")), SlotState::Pending);
    assert_eq!(t.metrics().coalesced, 1);
}

#[tokio::test(start_paused = true)]
async fn test_offer_with_merges_queued_value() {
    let mut t = throttle_ms(100);
    t.offer(key("a"), 1);
    t.offer(key("a"), 10);
    let merged = t.offer_with(key("a"), 5, |queued, latest| queued + latest);
    assert_eq!(merged, None);

    let fired = t.wait_expired().await;
    assert_eq!(fired, vec![(key("a"), 15)]);
}

// =========================================================================
// wait_expired
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_expired_pends_when_idle() {
    let mut t = throttle_ms(100);
    let result =
        time::timeout(Duration::from_secs(5), t.wait_expired()).await;
    assert!(result.is_err(), "idle throttle should never expire");
}

#[tokio::test(start_paused = true)]
async fn test_next_deadline_is_earliest_window() {
    let mut t = throttle_ms(100);
    let start = Instant::now();
    t.offer(key("a"), 1);
    time::advance(Duration::from_millis(40)).await;
    t.offer(key("b"), 1);

    assert_eq!(t.next_deadline(), Some(start + Duration::from_millis(100)));
}
