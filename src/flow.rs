//! HTTP/2 flow control.
//!
//! One [`FlowController`] per connection holds the connection-level window
//! pair plus a pair per registered stream, all under a single mutex so that a
//! send reservation debits the connection and stream windows atomically. A
//! single condvar wakes senders blocked on either window when a
//! WINDOW_UPDATE arrives.
//!
//! Lock ordering: the flow mutex is a leaf; no other crate lock is acquired
//! while it is held.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::status::Deadline;

/// A flow-control rule was broken. `Connection` violations tear the
/// connection down; `Stream` violations reset the offending stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowViolation {
    Connection,
    Stream(u32),
}

/// Outcome of accounting received DATA bytes against the receive windows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataReceived {
    /// Both windows covered the bytes; emit these WINDOW_UPDATE frames.
    Accepted(Vec<Replenishment>),
    /// The stream window was violated. The offending stream must be reset,
    /// but the connection-level replenishment computed for these bytes must
    /// still be emitted: the connection window was debited regardless.
    StreamViolation {
        stream_id: u32,
        replenishments: Vec<Replenishment>,
    },
    /// The connection window was violated; the connection is in error.
    ConnectionViolation,
}

/// Initial window size for connections and streams (RFC 7540 default).
pub const DEFAULT_WINDOW: i32 = 65_535;

/// Receive windows are replenished back to [`DEFAULT_WINDOW`] once they fall
/// below this (half the default).
pub const REPLENISH_THRESHOLD: i32 = DEFAULT_WINDOW / 2;

/// Windows may never exceed 2^31 - 1.
pub const MAX_WINDOW: i32 = i32::MAX;

#[derive(Debug, Clone, Copy)]
struct WindowPair {
    send: i32,
    recv: i32,
}

impl WindowPair {
    fn new() -> WindowPair {
        WindowPair {
            send: DEFAULT_WINDOW,
            recv: DEFAULT_WINDOW,
        }
    }
}

#[derive(Debug)]
struct FlowInner {
    conn: WindowPair,
    streams: HashMap<u32, WindowPair>,
    aborted: bool,
}

/// A WINDOW_UPDATE the receive path must emit: `(stream_id, increment)` with
/// stream id 0 addressing the connection window.
pub type Replenishment = (u32, u32);

#[derive(Debug)]
pub struct FlowController {
    inner: Mutex<FlowInner>,
    window_grown: Condvar,
}

impl Default for FlowController {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowController {
    pub fn new() -> FlowController {
        FlowController {
            inner: Mutex::new(FlowInner {
                conn: WindowPair::new(),
                streams: HashMap::new(),
                aborted: false,
            }),
            window_grown: Condvar::new(),
        }
    }

    pub fn register_stream(&self, stream_id: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.streams.entry(stream_id).or_insert_with(WindowPair::new);
    }

    pub fn deregister_stream(&self, stream_id: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.streams.remove(&stream_id);
        // A sender blocked on this stream must observe the removal.
        self.window_grown.notify_all();
    }

    /// Block until `n` bytes fit in both the connection and the stream send
    /// windows, then debit both. Fails when the deadline passes, the stream
    /// is torn down, or the controller is aborted.
    pub fn reserve_send(&self, stream_id: u32, n: usize, deadline: Deadline) -> Result<()> {
        let n = n as i32;
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.aborted {
                return Err(Error::ConnectionClosed);
            }
            let stream = match inner.streams.get(&stream_id) {
                Some(pair) => *pair,
                None => return Err(Error::ConnectionClosed),
            };
            if n <= inner.conn.send && n <= stream.send {
                inner.conn.send -= n;
                if let Some(pair) = inner.streams.get_mut(&stream_id) {
                    pair.send -= n;
                }
                return Ok(());
            }
            match deadline.remaining() {
                Some(timeout) => {
                    if timeout.is_zero() {
                        return Err(Error::DeadlineExceeded);
                    }
                    let (guard, _) = self.window_grown.wait_timeout(inner, timeout).unwrap();
                    inner = guard;
                }
                None => {
                    inner = self.window_grown.wait(inner).unwrap();
                }
            }
        }
    }

    /// Apply a WINDOW_UPDATE from the peer. Overflow past 2^31 - 1 is a
    /// protocol violation: a connection violation for stream id 0, a stream
    /// violation otherwise.
    pub fn window_update(&self, stream_id: u32, increment: u32) -> std::result::Result<(), FlowViolation> {
        let mut inner = self.inner.lock().unwrap();
        let (window, violation) = if stream_id == 0 {
            (&mut inner.conn.send, FlowViolation::Connection)
        } else {
            match inner.streams.get_mut(&stream_id) {
                Some(pair) => (&mut pair.send, FlowViolation::Stream(stream_id)),
                // Updates for unknown (already closed) streams are ignored.
                None => return Ok(()),
            }
        };
        *window = window
            .checked_add(increment as i32)
            .filter(|w| *w <= MAX_WINDOW)
            .ok_or(violation)?;
        self.window_grown.notify_all();
        Ok(())
    }

    /// Account for `n` received DATA bytes on `stream_id`.
    ///
    /// The bytes always count against the connection window (they arrived on
    /// the wire either way), so a stream-level violation still carries the
    /// connection replenishment computed for them — the caller must emit it
    /// before resetting the stream, or the peer's view of the connection
    /// window drifts from ours and stalls every other stream.
    pub fn data_received(&self, stream_id: u32, n: usize) -> DataReceived {
        let n = n as i32;
        let mut inner = self.inner.lock().unwrap();

        if inner.conn.recv < n {
            return DataReceived::ConnectionViolation;
        }
        inner.conn.recv -= n;

        let mut updates = Vec::new();
        if inner.conn.recv < REPLENISH_THRESHOLD {
            let increment = (DEFAULT_WINDOW - inner.conn.recv) as u32;
            inner.conn.recv = DEFAULT_WINDOW;
            updates.push((0, increment));
        }

        if let Some(pair) = inner.streams.get_mut(&stream_id) {
            if pair.recv < n {
                return DataReceived::StreamViolation {
                    stream_id,
                    replenishments: updates,
                };
            }
            pair.recv -= n;
            if pair.recv < REPLENISH_THRESHOLD {
                let increment = (DEFAULT_WINDOW - pair.recv) as u32;
                pair.recv = DEFAULT_WINDOW;
                updates.push((stream_id, increment));
            }
        }

        DataReceived::Accepted(updates)
    }

    /// Current (send, recv) windows for a stream, if registered.
    pub fn stream_windows(&self, stream_id: u32) -> Option<(i32, i32)> {
        let inner = self.inner.lock().unwrap();
        inner.streams.get(&stream_id).map(|pair| (pair.send, pair.recv))
    }

    /// Current (send, recv) windows for the connection.
    pub fn connection_windows(&self) -> (i32, i32) {
        let inner = self.inner.lock().unwrap();
        (inner.conn.send, inner.conn.recv)
    }

    /// Fail every pending and future reservation; used on connection
    /// teardown.
    pub fn abort(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.aborted = true;
        self.window_grown.notify_all();
    }
}
