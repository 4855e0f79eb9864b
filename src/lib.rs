//! h2-rpc: a blocking HTTP/2 RPC transport runtime
//!
//! This crate carries request/response messages over multiplexed streams on
//! an HTTP/2-framed, TLS-capable connection, exposing the classic transport
//! abstractions: *channel*, *server*, *call* and *completion queue*.
//!
//! # Features
//!
//! - **HTTP/2 core**: 9-byte frame codec, HPACK literal header coding,
//!   connection preface/SETTINGS exchange, CONTINUATION reassembly
//! - **Flow control**: per-connection and per-stream windows with automatic
//!   WINDOW_UPDATE replenishment
//! - **TLS**: rustls-backed transport pinned to TLSv1.2+ with ALPN `h2`
//!   enforcement, SNI and hostname verification
//! - **Call lifecycle**: atomic operation batches, cancellation, monotonic
//!   deadlines, per-message gzip/deflate compression
//! - **Client plumbing**: name resolution (static/DNS/custom),
//!   pick-first/round-robin/weighted load balancing, a keep-alive connection
//!   pool
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use h2_rpc::{BatchOp, Channel, ChannelArgs, CompletionQueue, Deadline, Metadata};
//!
//! let channel = Channel::insecure("127.0.0.1:50051", ChannelArgs::new());
//! let cq = Arc::new(CompletionQueue::new());
//!
//! let call = channel
//!     .create_call(&cq, "/echo.Echo/Say", None, Deadline::after_millis(5_000))
//!     .expect("connect");
//! call.start_batch(
//!     vec![
//!         BatchOp::SendInitialMetadata(Metadata::new()),
//!         BatchOp::SendMessage(b"hello".to_vec()),
//!         BatchOp::SendCloseFromClient,
//!         BatchOp::RecvInitialMetadata,
//!         BatchOp::RecvMessage,
//!         BatchOp::RecvStatusOnClient,
//!     ],
//!     1,
//! )
//! .expect("batch accepted");
//!
//! let event = cq.next(Deadline::after_millis(5_000));
//! assert!(event.success);
//! let reply = call.take_received_message();
//! ```
//!
//! # Architecture
//!
//! Concurrency is plain OS threads over blocking sockets: one dispatcher
//! thread reads each connection, batch drivers block on stream condvars, and
//! callers poll completion queues. All outbound bytes pass through a
//! per-connection write mutex, so frames are atomic on the wire.
//!
//! Out of scope by design: message marshalling (payloads are opaque bytes),
//! HTTP/1.x upgrade and HTTP/2 server push.

pub mod balance;
pub mod call;
pub mod channel;
pub mod compress;
pub mod conn;
pub mod cq;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod frame;
pub mod hpack;
pub mod message;
pub mod metadata;
pub mod observe;
pub mod pool;
pub mod resolver;
pub mod server;
pub mod status;
pub mod stream;
pub mod tls;

pub use balance::{LbAddress, LbPolicy, LbPolicyKind};
pub use call::{BatchOp, BatchOpKind, Call, MAX_BATCH_OPS};
pub use channel::{ArgValue, Channel, ChannelArgs};
pub use compress::{compress, decompress, Compression};
pub use conn::Http2Connection;
pub use cq::CompletionQueue;
pub use credentials::{ChannelCredentials, KeyCertPair, ServerCredentials};
pub use error::{Error, Result};
pub use flow::FlowController;
pub use frame::{error_code, flags, frame_type, settings_id, FrameDecoder, FrameHeader, CONNECTION_PREFACE};
pub use message::{decode_message, encode_message};
pub use metadata::{Metadata, MetadataEntry};
pub use observe::{LogLevel, Logger, MetricKind, MetricsRegistry, Tracer, TraceSpan};
pub use pool::{ConnectionPool, KeepaliveConfig};
pub use resolver::{NameResolver, ResolvedAddress};
pub use server::{CallDetails, CallSlot, Server};
pub use status::{CallError, Deadline, Event, EventKind, Status, StatusCode, Tag, Timespec};
pub use stream::{Http2Stream, StreamState};

use std::sync::atomic::{AtomicUsize, Ordering};

static INIT_REFS: AtomicUsize = AtomicUsize::new(0);

/// Reference-counted process-wide initialization. Idempotent; pair each call
/// with [`shutdown`].
pub fn init() {
    INIT_REFS.fetch_add(1, Ordering::SeqCst);
}

/// Release one init reference. Global state (the TLS provider) is owned by
/// the process and needs no explicit teardown, so this only balances the
/// count; using the library between the count reaching zero and a later
/// [`init`] is undefined.
pub fn shutdown() {
    let _ = INIT_REFS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
}

/// Crate version string.
pub fn version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
