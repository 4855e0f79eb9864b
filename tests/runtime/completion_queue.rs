//! Tests for completion queues

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use h2_rpc::{CompletionQueue, Deadline, Event, EventKind};

#[test]
fn test_fifo_order_single_producer() {
    let cq = CompletionQueue::new();
    for tag in 0..32 {
        cq.push(Event::op_complete(tag, true));
    }
    for tag in 0..32 {
        let event = cq.next(Deadline::after_millis(100));
        assert_eq!(event.kind, EventKind::OpComplete);
        assert_eq!(event.tag, tag);
    }
}

#[test]
fn test_wait_timeout_returns_timeout_event() {
    let cq = CompletionQueue::new();
    let started = Instant::now();
    let event = cq.next(Deadline::after_millis(50));
    let elapsed = started.elapsed();
    assert_eq!(event.kind, EventKind::Timeout);
    assert!(!event.success);
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(500), "timed out after {elapsed:?}");
}

#[test]
fn test_push_wakes_blocked_waiter() {
    let cq = Arc::new(CompletionQueue::new());
    let waiter = {
        let cq = cq.clone();
        thread::spawn(move || cq.next(Deadline::after_millis(2_000)))
    };
    thread::sleep(Duration::from_millis(30));
    cq.push(Event::op_complete(9, true));
    let event = waiter.join().unwrap();
    assert_eq!(event.tag, 9);
}

#[test]
fn test_shutdown_drains_queued_events_first() {
    let cq = CompletionQueue::new();
    cq.push(Event::op_complete(1, true));
    cq.push(Event::op_complete(2, false));
    cq.shutdown();

    assert_eq!(cq.next(Deadline::after_millis(100)).tag, 1);
    assert_eq!(cq.next(Deadline::after_millis(100)).tag, 2);
    let event = cq.next(Deadline::after_millis(100));
    assert_eq!(event.kind, EventKind::Shutdown);
    assert!(!event.success);
    // Every subsequent wait keeps observing shutdown.
    assert_eq!(cq.next(Deadline::after_millis(100)).kind, EventKind::Shutdown);
}

#[test]
fn test_shutdown_wakes_every_blocked_waiter() {
    let cq = Arc::new(CompletionQueue::new());
    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let cq = cq.clone();
            thread::spawn(move || cq.next(Deadline::after_millis(5_000)))
        })
        .collect();
    thread::sleep(Duration::from_millis(50));
    cq.shutdown();
    for waiter in waiters {
        assert_eq!(waiter.join().unwrap().kind, EventKind::Shutdown);
    }
}

#[test]
fn test_pluck_takes_only_the_matching_tag() {
    let cq = CompletionQueue::new();
    cq.push(Event::op_complete(1, true));
    cq.push(Event::op_complete(2, true));
    cq.push(Event::op_complete(3, true));

    let event = cq.pluck(2, Deadline::after_millis(100));
    assert_eq!(event.tag, 2);
    // The other events keep their relative order.
    assert_eq!(cq.next(Deadline::after_millis(100)).tag, 1);
    assert_eq!(cq.next(Deadline::after_millis(100)).tag, 3);
}

#[test]
fn test_pluck_times_out_when_tag_never_arrives() {
    let cq = CompletionQueue::new();
    cq.push(Event::op_complete(1, true));
    let event = cq.pluck(42, Deadline::after_millis(50));
    assert_eq!(event.kind, EventKind::Timeout);
}

#[test]
fn test_fifo_across_producer_threads_is_complete() {
    let cq = Arc::new(CompletionQueue::new());
    let producers: Vec<_> = (0..4)
        .map(|p| {
            let cq = cq.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    cq.push(Event::op_complete(p * 100 + i, true));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    let mut seen = Vec::new();
    for _ in 0..100 {
        seen.push(cq.next(Deadline::after_millis(100)).tag);
    }
    seen.sort_unstable();
    let expected: Vec<u64> = (0..4).flat_map(|p| (0..25).map(move |i| p * 100 + i)).collect();
    assert_eq!(seen, expected);
}
