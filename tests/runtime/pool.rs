//! Tests for the connection pool

use std::sync::Arc;
use std::time::Duration;

use h2_rpc::{ConnectionPool, KeepaliveConfig};

#[test]
fn test_get_creates_distinct_connections_while_busy() {
    let pool = ConnectionPool::new(2, Duration::from_secs(30));
    let first = pool.get("t1").unwrap();
    let second = pool.get("t1").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(pool.len(), 2);
}

#[test]
fn test_full_pool_of_busy_connections_returns_none() {
    let pool = ConnectionPool::new(2, Duration::from_secs(30));
    let _a = pool.get("t1").unwrap();
    let _b = pool.get("t1").unwrap();
    assert!(pool.get("t1").is_none());
}

#[test]
fn test_checkin_enables_reuse_of_same_connection() {
    let pool = ConnectionPool::new(2, Duration::from_secs(30));
    let a = pool.get("t1").unwrap();
    let _b = pool.get("t1").unwrap();

    pool.checkin("t1", &a);
    let reused = pool.get("t1").unwrap();
    assert!(Arc::ptr_eq(&a, &reused));
    assert_eq!(pool.len(), 2);
}

#[test]
fn test_idle_entry_for_other_target_is_evicted_when_full() {
    let pool = ConnectionPool::new(1, Duration::from_secs(30));
    let a = pool.get("t1").unwrap();
    pool.checkin("t1", &a);

    let b = pool.get("t2").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(pool.len(), 1);
}

#[test]
fn test_connections_are_lazy() {
    let pool = ConnectionPool::new(1, Duration::from_secs(30));
    // No server listens on this target; checkout must still succeed because
    // the socket only opens on first call creation.
    let conn = pool.get("127.0.0.1:59999").unwrap();
    assert!(!conn.is_open());
}

#[test]
fn test_idle_timeout_flags_connection_for_cleanup() {
    let pool = ConnectionPool::new(4, Duration::from_millis(100));
    pool.set_keepalive(KeepaliveConfig {
        interval: Duration::from_secs(30),
        timeout: Duration::from_secs(10),
        permit_without_calls: false,
    });
    let conn = pool.get("t1").unwrap();
    pool.checkin("t1", &conn);
    assert_eq!(pool.len(), 1);

    // Give the keepalive worker a few ticks past the idle timeout.
    std::thread::sleep(Duration::from_millis(400));
    pool.cleanup_idle();
    assert_eq!(pool.len(), 0);
}

#[test]
fn test_cleanup_keeps_healthy_and_busy_entries() {
    let pool = ConnectionPool::new(4, Duration::from_secs(30));
    let busy = pool.get("t1").unwrap();
    let idle = pool.get("t2").unwrap();
    pool.checkin("t2", &idle);

    pool.cleanup_idle();
    assert_eq!(pool.len(), 2);
    drop(busy);
}
