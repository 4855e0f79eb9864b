//! Calls and batch execution.
//!
//! A batch is an atomic group of operations validated synchronously (the
//! [`CallError`] signals) and then driven to completion on a driver thread.
//! Exactly one completion event per accepted batch reaches the call's
//! completion queue, success or not — cancellation, deadline expiry and
//! transport failure all funnel into that single event.
//!
//! Lock order: the call mutex is taken before any stream field, and the
//! completion-queue push always happens with no other lock held.

use std::sync::{Arc, Mutex};
use std::thread;

use tracing::debug;

use crate::compress::{self, Compression, DEFAULT_MAX_DECOMPRESSED_LEN};
use crate::conn::ConnShared;
use crate::cq::CompletionQueue;
use crate::error::Error;
use crate::frame::error_code;
use crate::message;
use crate::metadata::Metadata;
use crate::status::{CallError, Deadline, Event, Status, StatusCode, Tag};
use crate::stream::Http2Stream;

/// Largest number of operations accepted in one batch.
pub const MAX_BATCH_OPS: usize = 8;

/// One operation inside a batch.
#[derive(Clone, Debug)]
pub enum BatchOp {
    SendInitialMetadata(Metadata),
    SendMessage(Vec<u8>),
    SendCloseFromClient,
    RecvInitialMetadata,
    RecvMessage,
    RecvStatusOnClient,
    SendStatusFromServer {
        status: Status,
        trailing_metadata: Metadata,
    },
    RecvCloseOnServer,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BatchOpKind {
    SendInitialMetadata,
    SendMessage,
    SendCloseFromClient,
    RecvInitialMetadata,
    RecvMessage,
    RecvStatusOnClient,
    SendStatusFromServer,
    RecvCloseOnServer,
}

impl BatchOp {
    pub fn kind(&self) -> BatchOpKind {
        match self {
            BatchOp::SendInitialMetadata(_) => BatchOpKind::SendInitialMetadata,
            BatchOp::SendMessage(_) => BatchOpKind::SendMessage,
            BatchOp::SendCloseFromClient => BatchOpKind::SendCloseFromClient,
            BatchOp::RecvInitialMetadata => BatchOpKind::RecvInitialMetadata,
            BatchOp::RecvMessage => BatchOpKind::RecvMessage,
            BatchOp::RecvStatusOnClient => BatchOpKind::RecvStatusOnClient,
            BatchOp::SendStatusFromServer { .. } => BatchOpKind::SendStatusFromServer,
            BatchOp::RecvCloseOnServer => BatchOpKind::RecvCloseOnServer,
        }
    }

    fn client_only(kind: BatchOpKind) -> bool {
        matches!(
            kind,
            BatchOpKind::SendCloseFromClient
                | BatchOpKind::RecvInitialMetadata
                | BatchOpKind::RecvStatusOnClient
        )
    }

    fn server_only(kind: BatchOpKind) -> bool {
        matches!(
            kind,
            BatchOpKind::SendStatusFromServer | BatchOpKind::RecvCloseOnServer
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Side {
    Client,
    Server,
}

#[derive(Debug, Default)]
struct CallState {
    invoked: bool,
    finished: bool,
    cancelled: bool,
    encoding: Compression,
    peer_encoding: Option<Compression>,
    recv_initial_metadata: Option<Metadata>,
    recv_message: Option<Vec<u8>>,
    status: Option<Status>,
    trailing_metadata: Option<Metadata>,
}

struct CallInner {
    side: Side,
    conn: Arc<ConnShared>,
    stream: Arc<Http2Stream>,
    cq: Arc<CompletionQueue>,
    method: String,
    host: Option<String>,
    authority: String,
    secure: bool,
    deadline: Deadline,
    state: Mutex<CallState>,
}

/// A single RPC. Cloning yields another handle to the same call.
#[derive(Clone)]
pub struct Call {
    inner: Arc<CallInner>,
}

impl Call {
    pub(crate) fn new_client(
        conn: Arc<ConnShared>,
        stream: Arc<Http2Stream>,
        cq: Arc<CompletionQueue>,
        method: &str,
        host: Option<&str>,
        authority: &str,
        secure: bool,
        deadline: Deadline,
    ) -> Call {
        Call {
            inner: Arc::new(CallInner {
                side: Side::Client,
                conn,
                stream,
                cq,
                method: method.to_string(),
                host: host.map(str::to_string),
                authority: host.unwrap_or(authority).to_string(),
                secure,
                deadline,
                state: Mutex::new(CallState::default()),
            }),
        }
    }

    pub(crate) fn new_server(
        conn: Arc<ConnShared>,
        stream: Arc<Http2Stream>,
        cq: Arc<CompletionQueue>,
        method: &str,
        host: Option<&str>,
        peer_encoding: Option<Compression>,
        deadline: Deadline,
    ) -> Call {
        Call {
            inner: Arc::new(CallInner {
                side: Side::Server,
                conn,
                stream,
                cq,
                method: method.to_string(),
                host: host.map(str::to_string),
                authority: host.unwrap_or_default().to_string(),
                secure: false,
                deadline,
                state: Mutex::new(CallState {
                    peer_encoding,
                    ..CallState::default()
                }),
            }),
        }
    }

    pub fn method(&self) -> &str {
        &self.inner.method
    }

    pub fn host(&self) -> Option<&str> {
        self.inner.host.as_deref()
    }

    pub fn deadline(&self) -> Deadline {
        self.inner.deadline
    }

    /// Outbound message compression for this call.
    pub fn set_compression(&self, encoding: Compression) {
        self.inner.state.lock().unwrap().encoding = encoding;
    }

    /// Initial metadata received from the peer, once a
    /// `RecvInitialMetadata` op has completed.
    pub fn received_initial_metadata(&self) -> Option<Metadata> {
        self.inner.state.lock().unwrap().recv_initial_metadata.clone()
    }

    /// Take the message produced by the latest completed `RecvMessage` op.
    pub fn take_received_message(&self) -> Option<Vec<u8>> {
        self.inner.state.lock().unwrap().recv_message.take()
    }

    /// Terminal status, once known.
    pub fn status(&self) -> Option<Status> {
        self.inner.state.lock().unwrap().status.clone()
    }

    pub fn trailing_metadata(&self) -> Option<Metadata> {
        self.inner.state.lock().unwrap().trailing_metadata.clone()
    }

    pub fn cancelled(&self) -> bool {
        self.inner.state.lock().unwrap().cancelled
    }

    /// Validate and accept a batch. On acceptance the batch runs to
    /// completion (or cancellation) and pushes exactly one event carrying
    /// `tag` to the call's completion queue.
    pub fn start_batch(&self, ops: Vec<BatchOp>, tag: Tag) -> Result<(), CallError> {
        if ops.is_empty() || ops.len() > MAX_BATCH_OPS {
            return Err(CallError::TooManyOperations);
        }
        let kinds: Vec<BatchOpKind> = ops.iter().map(BatchOp::kind).collect();
        for (i, kind) in kinds.iter().enumerate() {
            if kinds[..i].contains(kind) {
                return Err(CallError::TooManyOperations);
            }
            match self.inner.side {
                Side::Client if BatchOp::server_only(*kind) => return Err(CallError::NotOnClient),
                Side::Server if BatchOp::client_only(*kind) => return Err(CallError::NotOnServer),
                _ => {}
            }
        }

        let mut state = self.inner.state.lock().unwrap();
        if state.finished || state.cancelled {
            return Err(CallError::AlreadyFinished);
        }

        let headers_out = state.invoked;
        let batch_sends_headers = kinds.contains(&BatchOpKind::SendInitialMetadata);
        if batch_sends_headers && headers_out {
            return Err(CallError::AlreadyInvoked);
        }
        for kind in &kinds {
            match kind {
                BatchOpKind::SendMessage | BatchOpKind::SendCloseFromClient
                    if !headers_out && !batch_sends_headers =>
                {
                    return Err(CallError::NotInvoked)
                }
                BatchOpKind::SendCloseFromClient | BatchOpKind::SendStatusFromServer
                    if self.inner.stream.end_stream_sent() =>
                {
                    return Err(CallError::AlreadyInvoked)
                }
                _ => {}
            }
        }

        if batch_sends_headers {
            state.invoked = true;
        }
        drop(state);

        let call = self.clone();
        // Batch drivers are detached; the Arc keeps the call alive until the
        // completion event is out. Each driver watches the cancelled flag
        // itself, so no shared in-flight count is needed.
        let spawned = thread::Builder::new()
            .name("h2-rpc-batch".into())
            .spawn(move || {
                let success = call.run_batch(&ops);
                call.inner.cq.push(Event::op_complete(tag, success));
            });
        if spawned.is_err() {
            return Err(CallError::Failed);
        }
        Ok(())
    }

    /// Cancel the call: all outstanding batches complete with
    /// `success = false` and the terminal status becomes CANCELLED.
    pub fn cancel(&self) {
        self.cancel_with_status(Status::new(StatusCode::Cancelled, "call cancelled"));
    }

    fn cancel_with_status(&self, status: Status) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            if state.status.is_none() {
                state.status = Some(status.clone());
            }
        }
        debug!(method = %self.inner.method, code = ?status.code, "call cancelled");
        self.inner.stream.fail(status);
        let _ = self
            .inner
            .conn
            .send_rst_stream(self.inner.stream.id(), error_code::CANCEL);
        self.inner.conn.remove_stream(self.inner.stream.id());
    }

    fn run_batch(&self, ops: &[BatchOp]) -> bool {
        for op in ops {
            if self.inner.state.lock().unwrap().cancelled {
                return false;
            }
            if self.inner.deadline.expired() {
                self.fail_batch(Error::DeadlineExceeded);
                return false;
            }
            if let Err(err) = self.run_op(op) {
                self.fail_batch(err);
                return false;
            }
            // A cancel that landed while the op was in flight still fails
            // the batch.
            if self.inner.state.lock().unwrap().cancelled {
                return false;
            }
        }
        true
    }

    fn run_op(&self, op: &BatchOp) -> crate::error::Result<()> {
        let inner = &self.inner;
        match op {
            BatchOp::SendInitialMetadata(user) => {
                let encoding = inner.state.lock().unwrap().encoding;
                let headers = match inner.side {
                    Side::Client => message::request_headers(
                        &inner.method,
                        &inner.authority,
                        inner.secure,
                        inner.deadline.remaining(),
                        encoding,
                        user,
                    ),
                    Side::Server => message::response_headers(encoding, user),
                };
                inner.conn.send_header_block(&inner.stream, &headers, false)
            }
            BatchOp::SendMessage(body) => {
                let encoding = inner.state.lock().unwrap().encoding;
                let payload = compress::compress(body, encoding)?;
                let framed = message::encode_message(&payload, encoding != Compression::Identity);
                inner
                    .conn
                    .send_data(&inner.stream, &framed, false, inner.deadline)
            }
            BatchOp::SendCloseFromClient => {
                inner.conn.send_data(&inner.stream, &[], true, inner.deadline)
            }
            BatchOp::RecvInitialMetadata => {
                let metadata = inner.stream.wait_initial_metadata(inner.deadline)?;
                let mut state = inner.state.lock().unwrap();
                state.peer_encoding = metadata
                    .get_str("grpc-encoding")
                    .and_then(Compression::from_name);
                state.recv_initial_metadata = Some(metadata);
                Ok(())
            }
            BatchOp::RecvMessage => {
                let received = inner.stream.wait_message(inner.deadline)?;
                let message = match received {
                    Some((true, payload)) => {
                        let encoding = self.incoming_encoding();
                        Some(compress::decompress(
                            &payload,
                            encoding,
                            DEFAULT_MAX_DECOMPRESSED_LEN,
                        )?)
                    }
                    Some((false, payload)) => Some(payload),
                    None => None,
                };
                inner.state.lock().unwrap().recv_message = message;
                Ok(())
            }
            BatchOp::RecvStatusOnClient => {
                let (status, trailing) = inner.stream.wait_status(inner.deadline)?;
                {
                    let mut state = inner.state.lock().unwrap();
                    state.status = Some(status);
                    state.trailing_metadata = Some(trailing);
                    state.finished = true;
                }
                inner.conn.remove_stream(inner.stream.id());
                Ok(())
            }
            BatchOp::SendStatusFromServer {
                status,
                trailing_metadata,
            } => {
                let trailers = if inner.stream.headers_sent() {
                    message::trailers(status, trailing_metadata)
                } else {
                    // Trailers-only response: one block carries both the
                    // response headers and the status.
                    let mut block = message::response_headers(Compression::Identity, &Metadata::new());
                    for entry in &message::trailers(status, trailing_metadata) {
                        block.add(&entry.key, entry.value.clone());
                    }
                    block
                };
                inner.conn.send_header_block(&inner.stream, &trailers, true)?;
                {
                    let mut state = inner.state.lock().unwrap();
                    state.status = Some(status.clone());
                    state.finished = true;
                }
                inner.conn.remove_stream(inner.stream.id());
                Ok(())
            }
            BatchOp::RecvCloseOnServer => inner.stream.wait_remote_close(inner.deadline),
        }
    }

    fn incoming_encoding(&self) -> Compression {
        if let Some(encoding) = self.inner.state.lock().unwrap().peer_encoding {
            return encoding;
        }
        self.inner
            .stream
            .initial_metadata()
            .and_then(|md| md.get_str("grpc-encoding").and_then(Compression::from_name))
            .unwrap_or(Compression::Identity)
    }

    fn fail_batch(&self, err: Error) {
        debug!(method = %self.inner.method, error = %err, "batch failed");
        match err {
            Error::DeadlineExceeded => self.cancel_with_status(Status::new(
                StatusCode::DeadlineExceeded,
                "deadline exceeded",
            )),
            Error::Compression(reason) => {
                self.cancel_with_status(Status::new(StatusCode::Internal, reason))
            }
            Error::Io(_) | Error::ConnectionClosed => {
                let mut state = self.inner.state.lock().unwrap();
                if state.status.is_none() {
                    state.status = Some(Status::new(StatusCode::Unavailable, format!("{err}")));
                }
                state.finished = true;
            }
            other => {
                let mut state = self.inner.state.lock().unwrap();
                if state.status.is_none() {
                    state.status = Some(Status::new(StatusCode::Internal, format!("{other}")));
                }
                state.finished = true;
            }
        }
    }
}
