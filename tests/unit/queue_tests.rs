//! Unit tests for the pending queue.

use discord_relay::relay::queue::PendingQueue;
use discord_relay::AppError;

use super::support::record;

fn ids(queue: &PendingQueue) -> Vec<String> {
    queue
        .snapshot()
        .records
        .into_iter()
        .map(|record| record.message_id)
        .collect()
}

#[test]
fn append_preserves_arrival_order() {
    let queue = PendingQueue::new();
    queue.append(record("1"));
    queue.append(record("2"));
    queue.append(record("3"));

    assert_eq!(queue.len(), 3);
    assert_eq!(ids(&queue), vec!["1", "2", "3"]);
}

#[test]
fn snapshot_does_not_see_later_appends() {
    let queue = PendingQueue::new();
    queue.append(record("1"));
    let snapshot = queue.snapshot();

    queue.append(record("2"));

    assert_eq!(snapshot.len(), 1);
    assert_eq!(queue.len(), 2);
}

#[test]
fn snapshot_does_not_mutate_queue() {
    let queue = PendingQueue::new();
    queue.append(record("1"));
    let _ = queue.snapshot();
    let _ = queue.snapshot();
    assert_eq!(queue.len(), 1);
}

#[test]
fn remove_prefix_keeps_the_tail() {
    let queue = PendingQueue::new();
    for id in ["1", "2", "3", "4"] {
        queue.append(record(id));
    }

    queue.remove_prefix(2).expect("prefix present");

    assert_eq!(ids(&queue), vec!["3", "4"]);
}

#[test]
fn remove_prefix_past_end_is_rejected_without_change() {
    let queue = PendingQueue::new();
    queue.append(record("1"));

    let err = queue.remove_prefix(2).unwrap_err();

    assert!(matches!(err, AppError::Queue(_)));
    assert_eq!(queue.len(), 1, "queue untouched on rejected removal");
}

#[test]
fn remove_zero_is_a_no_op() {
    let queue = PendingQueue::new();
    queue.append(record("1"));
    queue.remove_prefix(0).expect("zero is always valid");
    assert_eq!(queue.len(), 1);
}

#[test]
fn empty_queue_reports_empty() {
    let queue = PendingQueue::new();
    assert!(queue.is_empty());
    assert!(queue.snapshot().is_empty());
    queue.append(record("1"));
    assert!(!queue.is_empty());
}
