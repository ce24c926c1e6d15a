//! Unit tests for the lifecycle controller: idempotent shutdown, intake
//! policy while draining and drain completeness.

use std::sync::Arc;
use std::time::Duration;

use discord_relay::config::IntakePolicy;
use discord_relay::relay::lifecycle::{Lifecycle, LifecycleState};
use discord_relay::relay::queue::PendingQueue;

use super::support::record;

#[test]
fn starts_running_and_accepting() {
    let lifecycle = Lifecycle::new(IntakePolicy::Reject);
    assert_eq!(lifecycle.state(), LifecycleState::Running);
    assert!(lifecycle.accepts_intake());
}

#[test]
fn second_shutdown_request_is_ignored() {
    let lifecycle = Lifecycle::new(IntakePolicy::Reject);

    assert!(lifecycle.request_shutdown(), "first request starts the drain");
    let after_first = lifecycle.state();
    assert!(!lifecycle.request_shutdown(), "second request is a no-op");

    assert_eq!(after_first, LifecycleState::Draining);
    assert_eq!(lifecycle.state(), after_first);
}

#[test]
fn reject_policy_refuses_intake_while_draining() {
    let lifecycle = Lifecycle::new(IntakePolicy::Reject);
    lifecycle.request_shutdown();
    assert!(!lifecycle.accepts_intake());
}

#[test]
fn accept_policy_keeps_intake_open_while_draining() {
    let lifecycle = Lifecycle::new(IntakePolicy::Accept);
    lifecycle.request_shutdown();
    assert!(lifecycle.accepts_intake());
}

#[tokio::test]
async fn shutdown_requested_resolves_after_request() {
    let lifecycle = Arc::new(Lifecycle::new(IntakePolicy::Reject));
    let waiter = {
        let lifecycle = Arc::clone(&lifecycle);
        tokio::spawn(async move { lifecycle.shutdown_requested().await })
    };

    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    lifecycle.request_shutdown();
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter wakes on shutdown")
        .expect("waiter task");
}

#[tokio::test]
async fn drain_before_shutdown_returns_immediately() {
    let lifecycle = Lifecycle::new(IntakePolicy::Reject);
    let queue = PendingQueue::new();
    queue.append(record("1"));

    lifecycle.drain(&queue, Duration::from_millis(10)).await;

    assert_eq!(lifecycle.state(), LifecycleState::Running);
}

#[tokio::test]
async fn drain_with_empty_queue_stops_at_once() {
    let lifecycle = Lifecycle::new(IntakePolicy::Reject);
    let queue = PendingQueue::new();
    lifecycle.request_shutdown();

    lifecycle.drain(&queue, Duration::from_secs(1)).await;

    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    assert!(!lifecycle.request_shutdown(), "stopped never restarts a drain");
}

#[tokio::test(start_paused = true)]
async fn drain_waits_while_records_remain() {
    let lifecycle = Arc::new(Lifecycle::new(IntakePolicy::Reject));
    let queue = Arc::new(PendingQueue::new());
    queue.append(record("1"));
    queue.append(record("2"));
    lifecycle.request_shutdown();

    let drain = {
        let lifecycle = Arc::clone(&lifecycle);
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { lifecycle.drain(&queue, Duration::from_secs(1)).await })
    };

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!drain.is_finished(), "drain must not finish with records queued");
    assert_eq!(lifecycle.state(), LifecycleState::Draining);

    queue.remove_prefix(1).unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!drain.is_finished(), "one record still queued");

    queue.remove_prefix(1).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(drain.is_finished());
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn stopped_refuses_intake_under_either_policy() {
    for policy in [IntakePolicy::Reject, IntakePolicy::Accept] {
        let lifecycle = Lifecycle::new(policy);
        lifecycle.request_shutdown();
        lifecycle
            .drain(&PendingQueue::new(), Duration::from_millis(10))
            .await;

        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(!lifecycle.accepts_intake(), "{policy:?} must refuse once stopped");
    }
}

#[tokio::test(start_paused = true)]
async fn second_drain_waits_for_records_queued_after_stop() {
    let lifecycle = Arc::new(Lifecycle::new(IntakePolicy::Accept));
    let queue = Arc::new(PendingQueue::new());
    lifecycle.request_shutdown();
    lifecycle.drain(&queue, Duration::from_secs(1)).await;

    // A record that slipped in between the empty check and the transition.
    queue.append(record("straggler"));
    let drain = {
        let lifecycle = Arc::clone(&lifecycle);
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { lifecycle.drain(&queue, Duration::from_secs(1)).await })
    };

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!drain.is_finished(), "final drain must wait for the straggler");

    queue.remove_prefix(1).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(drain.is_finished());
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
}
