//! HTTP/2 stream state.
//!
//! [`StreamState`] is the pure RFC 7540 lifecycle machine; [`Http2Stream`]
//! wraps it with the receive buffer, metadata, status and the condvar that
//! lets call drivers block until the dispatcher delivers what they wait for.
//!
//! A stream is owned by its connection's stream table. The call driving it
//! holds a non-owning `Arc` clone; events keep flowing to the stream even if
//! the call goes away first.

use std::sync::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::frame::error_code;
use crate::message;
use crate::metadata::Metadata;
use crate::status::{Deadline, Status, StatusCode};

/// RFC 7540 §5.1 stream states (the subset this runtime can enter).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    /// May we emit DATA in this state?
    pub fn can_send_data(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// May the peer deliver DATA in this state?
    pub fn can_recv_data(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    pub fn is_closed(self) -> bool {
        self == StreamState::Closed
    }

    /// Transition for locally-sent HEADERS.
    pub fn send_headers(self, end_stream: bool) -> Result<StreamState> {
        match self {
            StreamState::Idle if end_stream => Ok(StreamState::HalfClosedLocal),
            StreamState::Idle => Ok(StreamState::Open),
            // Trailers: HEADERS with END_STREAM on an established stream.
            StreamState::Open if end_stream => Ok(StreamState::HalfClosedLocal),
            StreamState::HalfClosedRemote if end_stream => Ok(StreamState::Closed),
            StreamState::Open | StreamState::HalfClosedRemote => Ok(self),
            _ => Err(stream_closed(format!("HEADERS invalid in {self:?}"))),
        }
    }

    /// Transition for peer-sent HEADERS.
    pub fn recv_headers(self, end_stream: bool) -> Result<StreamState> {
        match self {
            StreamState::Idle if end_stream => Ok(StreamState::HalfClosedRemote),
            StreamState::Idle => Ok(StreamState::Open),
            StreamState::Open if end_stream => Ok(StreamState::HalfClosedRemote),
            StreamState::HalfClosedLocal if end_stream => Ok(StreamState::Closed),
            StreamState::Open | StreamState::HalfClosedLocal => Ok(self),
            _ => Err(stream_closed(format!("peer HEADERS invalid in {self:?}"))),
        }
    }

    /// Transition for a locally-sent END_STREAM (on DATA or HEADERS).
    pub fn send_end_stream(self) -> Result<StreamState> {
        match self {
            StreamState::Open => Ok(StreamState::HalfClosedLocal),
            StreamState::HalfClosedRemote => Ok(StreamState::Closed),
            _ => Err(stream_closed(format!("cannot half-close locally in {self:?}"))),
        }
    }

    /// Transition for a peer END_STREAM.
    pub fn recv_end_stream(self) -> Result<StreamState> {
        match self {
            StreamState::Open => Ok(StreamState::HalfClosedRemote),
            StreamState::HalfClosedLocal => Ok(StreamState::Closed),
            _ => Err(stream_closed(format!("peer cannot half-close in {self:?}"))),
        }
    }
}

fn stream_closed(reason: String) -> Error {
    Error::Protocol {
        code: error_code::STREAM_CLOSED,
        reason,
    }
}

#[derive(Debug)]
struct StreamInner {
    state: StreamState,
    headers_sent: bool,
    end_stream_sent: bool,
    end_stream_received: bool,
    initial_metadata: Option<Metadata>,
    trailing_metadata: Option<Metadata>,
    recv_buf: Vec<u8>,
    status: Option<Status>,
}

/// One multiplexed RPC stream.
#[derive(Debug)]
pub struct Http2Stream {
    id: u32,
    inner: Mutex<StreamInner>,
    changed: Condvar,
}

impl Http2Stream {
    pub fn new(id: u32) -> Http2Stream {
        Http2Stream {
            id,
            inner: Mutex::new(StreamInner {
                state: StreamState::Idle,
                headers_sent: false,
                end_stream_sent: false,
                end_stream_received: false,
                initial_metadata: None,
                trailing_metadata: None,
                recv_buf: Vec::new(),
                status: None,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.inner.lock().unwrap().state
    }

    /// Terminal status, once delivered.
    pub fn status(&self) -> Option<Status> {
        self.inner.lock().unwrap().status.clone()
    }

    /// Initial metadata, once delivered. Non-blocking.
    pub fn initial_metadata(&self) -> Option<Metadata> {
        self.inner.lock().unwrap().initial_metadata.clone()
    }

    // ---- send path (call driver) ----

    /// Record locally-sent HEADERS, validating the transition first.
    pub fn note_headers_sent(&self, end_stream: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.state = inner.state.send_headers(end_stream)?;
        inner.headers_sent = true;
        if end_stream {
            inner.end_stream_sent = true;
        }
        Ok(())
    }

    pub fn headers_sent(&self) -> bool {
        self.inner.lock().unwrap().headers_sent
    }

    pub fn end_stream_sent(&self) -> bool {
        self.inner.lock().unwrap().end_stream_sent
    }

    /// Validate that DATA may be sent right now.
    pub fn check_send_data(&self) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        if inner.state.can_send_data() {
            Ok(())
        } else {
            Err(stream_closed(format!("DATA invalid in {:?}", inner.state)))
        }
    }

    /// Record a locally-sent END_STREAM.
    pub fn note_end_stream_sent(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.state = inner.state.send_end_stream()?;
        inner.end_stream_sent = true;
        self.changed.notify_all();
        Ok(())
    }

    // ---- receive path (dispatcher) ----

    /// Deliver a decoded header block from the peer.
    ///
    /// The first block on a stream is initial metadata; any later block, or
    /// any block carrying `grpc-status`, is trailing metadata and finishes
    /// the call with the status it carries.
    pub fn deliver_headers(&self, metadata: Metadata, end_stream: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state.is_closed() {
            return Ok(());
        }
        inner.state = inner.state.recv_headers(end_stream)?;
        if end_stream {
            inner.end_stream_received = true;
        }

        let is_trailers = inner.initial_metadata.is_some() || metadata.get("grpc-status").is_some();
        if is_trailers {
            if inner.status.is_none() {
                inner.status = Some(message::status_from_trailers(&metadata).unwrap_or(Status {
                    code: StatusCode::Unknown,
                    detail: Some("trailers without grpc-status".into()),
                }));
            }
            inner.trailing_metadata = Some(metadata);
        } else {
            inner.initial_metadata = Some(metadata);
        }
        self.changed.notify_all();
        Ok(())
    }

    /// Deliver DATA payload bytes from the peer.
    pub fn deliver_data(&self, bytes: &[u8], end_stream: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state.is_closed() {
            return Ok(());
        }
        if !inner.state.can_recv_data() {
            return Err(stream_closed(format!("peer DATA invalid in {:?}", inner.state)));
        }
        inner.recv_buf.extend_from_slice(bytes);
        if end_stream {
            inner.end_stream_received = true;
            inner.state = inner.state.recv_end_stream()?;
        }
        self.changed.notify_all();
        Ok(())
    }

    /// Deliver a peer RST_STREAM.
    pub fn deliver_reset(&self, code: u32) {
        let status = if code == error_code::CANCEL {
            Status::new(StatusCode::Cancelled, "stream reset by peer")
        } else {
            Status::new(StatusCode::Unavailable, format!("stream reset by peer (code {code})"))
        };
        self.fail(status);
    }

    /// Force the stream into `Closed` with the given terminal status. Used
    /// for local cancellation, deadline expiry and connection teardown. The
    /// first status sticks.
    pub fn fail(&self, status: Status) {
        let mut inner = self.inner.lock().unwrap();
        if inner.status.is_none() {
            inner.status = Some(status);
        }
        inner.state = StreamState::Closed;
        self.changed.notify_all();
    }

    // ---- blocking waits (call driver) ----

    /// Wait until initial metadata arrives. A stream that ends cleanly
    /// without initial metadata (trailers-only response) yields an empty
    /// array; a stream torn down mid-flight fails the wait.
    pub fn wait_initial_metadata(&self, deadline: Deadline) -> Result<Metadata> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(metadata) = &inner.initial_metadata {
                return Ok(metadata.clone());
            }
            if inner.end_stream_received {
                return Ok(Metadata::new());
            }
            if inner.state.is_closed() {
                return Err(Error::ConnectionClosed);
            }
            inner = self.wait(inner, deadline)?;
        }
    }

    /// Wait for one complete length-prefixed message. `Ok(None)` means the
    /// peer half-closed without another message; a stream torn down without
    /// a clean half-close fails the wait.
    pub fn wait_message(&self, deadline: Deadline) -> Result<Option<(bool, Vec<u8>)>> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some((compressed, payload, consumed)) = message::decode_message(&inner.recv_buf) {
                inner.recv_buf.drain(..consumed);
                return Ok(Some((compressed, payload)));
            }
            if inner.end_stream_received {
                return Ok(None);
            }
            if inner.state.is_closed() {
                return Err(Error::ConnectionClosed);
            }
            inner = self.wait(inner, deadline)?;
        }
    }

    /// Wait for the terminal status and trailing metadata.
    pub fn wait_status(&self, deadline: Deadline) -> Result<(Status, Metadata)> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(status) = &inner.status {
                let trailing = inner.trailing_metadata.clone().unwrap_or_default();
                return Ok((status.clone(), trailing));
            }
            inner = self.wait(inner, deadline)?;
        }
    }

    /// Wait until the peer half-closes (or the stream dies).
    pub fn wait_remote_close(&self, deadline: Deadline) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.end_stream_received || inner.state.is_closed() {
                return Ok(());
            }
            inner = self.wait(inner, deadline)?;
        }
    }

    fn wait<'a>(
        &self,
        guard: std::sync::MutexGuard<'a, StreamInner>,
        deadline: Deadline,
    ) -> Result<std::sync::MutexGuard<'a, StreamInner>> {
        match deadline.remaining() {
            Some(timeout) => {
                if timeout.is_zero() {
                    return Err(Error::DeadlineExceeded);
                }
                let (guard, _) = self.changed.wait_timeout(guard, timeout).unwrap();
                Ok(guard)
            }
            None => Ok(self.changed.wait(guard).unwrap()),
        }
    }
}
