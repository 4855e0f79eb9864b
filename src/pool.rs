//! Connection pooling and keep-alive.
//!
//! The pool reuses idle healthy connections per target, creates new ones up
//! to its limit and evicts the longest-idle entry when full. A background
//! worker wakes every 100 ms to send keep-alive PINGs and to flag idle or
//! unresponsive connections unhealthy; actual closure happens in
//! `cleanup_idle` (or when the pool drops).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::conn::Http2Connection;

/// How often the keep-alive worker scans the pool.
const KEEPALIVE_TICK: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug)]
pub struct KeepaliveConfig {
    /// Interval between keep-alive PINGs per connection.
    pub interval: Duration,
    /// How long to wait for a PING ACK before flagging the connection.
    pub timeout: Duration,
    /// Send PINGs even when the connection has no active calls.
    pub permit_without_calls: bool,
}

impl Default for KeepaliveConfig {
    fn default() -> KeepaliveConfig {
        KeepaliveConfig {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            permit_without_calls: false,
        }
    }
}

struct PoolEntry {
    target: String,
    conn: Arc<Http2Connection>,
    last_used: Instant,
    last_keepalive: Instant,
    active_calls: u32,
    healthy: bool,
}

#[derive(Default)]
struct PoolState {
    entries: Vec<PoolEntry>,
}

struct PoolShared {
    state: Mutex<PoolState>,
    keepalive: Mutex<KeepaliveConfig>,
    max_connections: usize,
    idle_timeout: Duration,
    running: AtomicBool,
}

/// A per-target connection pool with background keep-alive.
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
    worker: Option<JoinHandle<()>>,
}

impl ConnectionPool {
    pub fn new(max_connections: usize, idle_timeout: Duration) -> ConnectionPool {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState::default()),
            keepalive: Mutex::new(KeepaliveConfig::default()),
            max_connections: max_connections.max(1),
            idle_timeout,
            running: AtomicBool::new(true),
        });
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("h2-rpc-keepalive".into())
            .spawn(move || keepalive_loop(worker_shared))
            .ok();
        if worker.is_none() {
            warn!("keepalive worker failed to start; pool runs without it");
        }
        ConnectionPool { shared, worker }
    }

    pub fn set_keepalive(&self, config: KeepaliveConfig) {
        *self.shared.keepalive.lock().unwrap() = config;
    }

    /// Check a connection out for `target`.
    ///
    /// Reuses an idle healthy connection for the target when one exists;
    /// otherwise creates one (evicting the longest-idle entry if the pool is
    /// full). Returns `None` when the pool is full of busy connections.
    pub fn get(&self, target: &str) -> Option<Arc<Http2Connection>> {
        let mut state = self.shared.state.lock().unwrap();
        let now = Instant::now();

        if let Some(entry) = state
            .entries
            .iter_mut()
            .find(|e| e.healthy && e.active_calls == 0 && e.target == target)
        {
            entry.active_calls += 1;
            entry.last_used = now;
            return Some(entry.conn.clone());
        }

        if state.entries.len() >= self.shared.max_connections {
            // Full: reclaim the slot of the entry that has been idle longest.
            let evict = state
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.active_calls == 0)
                .max_by_key(|(_, e)| now.duration_since(e.last_used))
                .map(|(i, _)| i)?;
            let evicted = state.entries.swap_remove(evict);
            debug!(uri = %evicted.target, "evicting idle pooled connection");
        }

        let conn = Arc::new(Http2Connection::client(target, None));
        state.entries.push(PoolEntry {
            target: target.to_string(),
            conn: conn.clone(),
            last_used: now,
            last_keepalive: now,
            active_calls: 1,
            healthy: true,
        });
        Some(conn)
    }

    /// Return a checked-out connection.
    pub fn checkin(&self, target: &str, conn: &Arc<Http2Connection>) {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(entry) = state
            .entries
            .iter_mut()
            .find(|e| e.target == target && Arc::ptr_eq(&e.conn, conn))
        {
            entry.active_calls = entry.active_calls.saturating_sub(1);
            entry.last_used = Instant::now();
        }
    }

    /// Drop every idle entry that has been flagged unhealthy.
    pub fn cleanup_idle(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.entries.retain(|e| e.active_calls > 0 || e.healthy);
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn keepalive_loop(shared: Arc<PoolShared>) {
    while shared.running.load(Ordering::SeqCst) {
        let config = *shared.keepalive.lock().unwrap();
        let now = Instant::now();
        {
            let mut state = shared.state.lock().unwrap();
            for entry in &mut state.entries {
                if !entry.healthy {
                    continue;
                }

                // An unanswered PING older than the timeout condemns the
                // connection.
                if let Some(pending_since) = entry.conn.keepalive_pending_since() {
                    if now.duration_since(pending_since) >= config.timeout {
                        debug!(uri = %entry.target, "keepalive timed out");
                        entry.healthy = false;
                        continue;
                    }
                }

                let due = now.duration_since(entry.last_keepalive) >= config.interval;
                if due && (config.permit_without_calls || entry.active_calls > 0) {
                    if entry.conn.send_keepalive_ping().is_err() {
                        entry.healthy = false;
                        continue;
                    }
                    entry.last_keepalive = now;
                }

                if entry.active_calls == 0 && now.duration_since(entry.last_used) >= shared.idle_timeout
                {
                    debug!(uri = %entry.target, "idle timeout");
                    entry.healthy = false;
                }
            }
        }
        thread::sleep(KEEPALIVE_TICK);
    }
}
