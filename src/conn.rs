//! HTTP/2 connection: socket, preface/SETTINGS exchange, frame dispatch and
//! the stream table.
//!
//! Each opened connection has exactly one reader (the dispatcher), which owns
//! the receive side: it feeds a [`FrameDecoder`], reassembles header blocks
//! and publishes results into streams. Everything outbound goes through the
//! connection write mutex, so frames are atomic on the wire and
//! HEADERS/CONTINUATION sequences stay contiguous.
//!
//! Lock order when nested: write mutex -> stream-table mutex -> stream
//! fields. The flow controller and ping state are leaf locks.

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::credentials::ChannelCredentials;
use crate::error::{Error, Result};
use crate::flow::{DataReceived, FlowController, FlowViolation};
use crate::frame::{self, error_code, frame_type, FrameDecoder, FrameHeader, CONNECTION_PREFACE};
use crate::hpack;
use crate::metadata::Metadata;
use crate::resolver::NameResolver;
use crate::status::{Deadline, Status, StatusCode};
use crate::stream::Http2Stream;
use crate::tls::{self, PlainTransport, Transport};

/// Upper bound on an assembled HEADERS + CONTINUATION block (256 KB).
pub const MAX_HEADER_BLOCK_SIZE: usize = 256 * 1024;

/// How long `open` waits for the peer's SETTINGS before giving up.
const SETTINGS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Role {
    Client,
    Server,
}

/// Peer-advertised limits, RFC defaults until SETTINGS arrives.
#[derive(Copy, Clone, Debug)]
pub struct PeerSettings {
    pub max_frame_size: u32,
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
}

impl Default for PeerSettings {
    fn default() -> PeerSettings {
        PeerSettings {
            max_frame_size: 16_384,
            max_concurrent_streams: 100,
            initial_window_size: 65_535,
        }
    }
}

#[derive(Debug, Default)]
struct Handshake {
    peer_settings: PeerSettings,
    settings_received: bool,
    settings_acked: bool,
}

#[derive(Debug, Default)]
struct PingState {
    pending: Option<([u8; 8], Instant)>,
    last_ack: Option<Instant>,
}

/// Invoked by a server-side dispatcher when a peer opens a new stream and its
/// request header block is complete.
pub(crate) type IncomingHandler =
    Box<dyn Fn(Arc<ConnShared>, Arc<Http2Stream>, Metadata) + Send + Sync>;

/// Header-block reassembly across HEADERS + CONTINUATION frames.
#[derive(Default)]
struct HeaderAssembler {
    stream_id: Option<u32>,
    end_stream: bool,
    block: Vec<u8>,
}

pub(crate) struct ConnShared {
    transport: Arc<dyn Transport>,
    role: Role,
    write_lock: Mutex<()>,
    pub(crate) flow: FlowController,
    streams: Mutex<HashMap<u32, Arc<Http2Stream>>>,
    next_stream_id: AtomicU32,
    handshake: Mutex<Handshake>,
    handshake_done: Condvar,
    goaway_received: AtomicBool,
    closed: AtomicBool,
    ping: Mutex<PingState>,
    on_incoming: Option<IncomingHandler>,
}

impl ConnShared {
    fn new(transport: Arc<dyn Transport>, role: Role, on_incoming: Option<IncomingHandler>) -> ConnShared {
        ConnShared {
            transport,
            role,
            write_lock: Mutex::new(()),
            flow: FlowController::new(),
            streams: Mutex::new(HashMap::new()),
            next_stream_id: AtomicU32::new(match role {
                Role::Client => 1,
                Role::Server => 2,
            }),
            handshake: Mutex::new(Handshake::default()),
            handshake_done: Condvar::new(),
            goaway_received: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            ping: Mutex::new(PingState::default()),
            on_incoming,
        }
    }

    /// Open a client connection: resolve, connect, optionally TLS-handshake,
    /// emit preface + SETTINGS, spawn the dispatcher and await the peer's
    /// SETTINGS.
    pub(crate) fn connect_client(target: &str, creds: Option<&ChannelCredentials>) -> Result<Arc<ConnShared>> {
        let resolver = NameResolver::dns(target);
        let addresses = resolver.resolve()?;
        let first = addresses
            .first()
            .ok_or_else(|| Error::Resolve(target.to_string()))?;
        let tcp = TcpStream::connect((first.address.as_str(), first.port))?;
        debug!(peer = %first.address, port = first.port, "connected");

        let transport: Arc<dyn Transport> = match creds {
            Some(creds) => {
                let host = NameResolver::host_of(target);
                Arc::new(tls::client_handshake(tls::client_config(creds)?, tcp, &host)?)
            }
            None => Arc::new(PlainTransport::new(tcp)?),
        };

        let shared = Arc::new(ConnShared::new(transport, Role::Client, None));

        // Preface and first SETTINGS go out back to back.
        let mut opening = CONNECTION_PREFACE.to_vec();
        opening.extend_from_slice(&shared.local_settings_frame());
        shared.write_frame(&opening)?;

        let dispatcher = shared.clone();
        thread::Builder::new()
            .name("h2-dispatch".into())
            .spawn(move || dispatcher.dispatch_loop(None))?;

        if let Err(err) = shared.wait_peer_settings(Deadline::after(SETTINGS_TIMEOUT)) {
            shared.teardown(Status::new(StatusCode::Unavailable, "settings exchange failed"));
            return Err(err);
        }
        Ok(shared)
    }

    /// Wrap an accepted socket as a server connection. The caller runs
    /// [`dispatch_loop`](Self::dispatch_loop) on its own thread; the peer
    /// preface is consumed by the frame decoder.
    pub(crate) fn accept_server(
        transport: Arc<dyn Transport>,
        on_incoming: IncomingHandler,
    ) -> Result<Arc<ConnShared>> {
        let shared = Arc::new(ConnShared::new(transport, Role::Server, Some(on_incoming)));
        let settings = shared.local_settings_frame();
        shared.write_frame(&settings)?;
        Ok(shared)
    }

    fn local_settings_frame(&self) -> Vec<u8> {
        frame::settings_frame(&[
            (frame::settings_id::MAX_FRAME_SIZE, frame::MAX_FRAME_SIZE),
            (frame::settings_id::MAX_CONCURRENT_STREAMS, 100),
            (frame::settings_id::INITIAL_WINDOW_SIZE, crate::flow::DEFAULT_WINDOW as u32),
        ])
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn peer_settings(&self) -> PeerSettings {
        self.handshake.lock().unwrap().peer_settings
    }

    fn wait_peer_settings(&self, deadline: Deadline) -> Result<()> {
        let mut handshake = self.handshake.lock().unwrap();
        loop {
            if handshake.settings_received && handshake.settings_acked {
                return Ok(());
            }
            if self.is_closed() {
                return Err(Error::ConnectionClosed);
            }
            match deadline.remaining() {
                Some(timeout) if timeout.is_zero() => {
                    return Err(Error::Protocol {
                        code: error_code::SETTINGS_TIMEOUT,
                        reason: "peer SETTINGS never arrived".into(),
                    })
                }
                Some(timeout) => {
                    let (guard, _) = self.handshake_done.wait_timeout(handshake, timeout).unwrap();
                    handshake = guard;
                }
                None => handshake = self.handshake_done.wait(handshake).unwrap(),
            }
        }
    }

    // ---- write path ----

    /// Serialize raw frame bytes onto the wire.
    fn write_frame(&self, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let _guard = self.write_lock.lock().unwrap();
        self.transport.send_all(bytes).map_err(Error::Io)
    }

    /// Allocate the next side-appropriate stream id and register the stream.
    pub(crate) fn open_stream(&self) -> Result<Arc<Http2Stream>> {
        if self.goaway_received.load(Ordering::SeqCst) {
            return Err(Error::Protocol {
                code: error_code::REFUSED_STREAM,
                reason: "connection is draining (GOAWAY received)".into(),
            });
        }
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let mut streams = self.streams.lock().unwrap();
        let limit = self.peer_settings().max_concurrent_streams as usize;
        let active = streams.values().filter(|s| !s.state().is_closed()).count();
        if active >= limit {
            return Err(Error::Protocol {
                code: error_code::REFUSED_STREAM,
                reason: format!("{active} concurrent streams at peer limit {limit}"),
            });
        }
        let id = self.next_stream_id.fetch_add(2, Ordering::SeqCst);
        let stream = Arc::new(Http2Stream::new(id));
        streams.insert(id, stream.clone());
        self.flow.register_stream(id);
        Ok(stream)
    }

    pub(crate) fn remove_stream(&self, stream_id: u32) {
        self.streams.lock().unwrap().remove(&stream_id);
        self.flow.deregister_stream(stream_id);
    }

    fn stream(&self, stream_id: u32) -> Option<Arc<Http2Stream>> {
        self.streams.lock().unwrap().get(&stream_id).cloned()
    }

    /// Encode and send a header block, splitting into HEADERS + CONTINUATION
    /// when it exceeds the peer's frame limit. The whole sequence goes out
    /// under one write-lock acquisition.
    pub(crate) fn send_header_block(
        &self,
        stream: &Http2Stream,
        metadata: &Metadata,
        end_stream: bool,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        stream.note_headers_sent(end_stream)?;
        let block = hpack::encode_block(metadata);
        let max = self.peer_settings().max_frame_size as usize;

        let _guard = self.write_lock.lock().unwrap();
        if block.len() <= max {
            let bytes = frame::headers_frame(stream.id(), &block, true, end_stream);
            return self.transport.send_all(&bytes).map_err(Error::Io);
        }
        let fragments: Vec<&[u8]> = block.chunks(max).collect();
        let last = fragments.len() - 1;
        for (i, fragment) in fragments.iter().enumerate() {
            let bytes = if i == 0 {
                frame::headers_frame(stream.id(), fragment, false, end_stream)
            } else {
                frame::continuation_frame(stream.id(), fragment, i == last)
            };
            self.transport.send_all(&bytes).map_err(Error::Io)?;
        }
        Ok(())
    }

    /// Send a message body (or an empty END_STREAM frame), honoring the
    /// peer's frame limit and both flow-control windows.
    pub(crate) fn send_data(
        &self,
        stream: &Http2Stream,
        mut payload: &[u8],
        end_stream: bool,
        deadline: Deadline,
    ) -> Result<()> {
        stream.check_send_data()?;
        let max = self.peer_settings().max_frame_size as usize;

        if payload.is_empty() {
            if end_stream {
                self.write_frame(&frame::data_frame(stream.id(), &[], true))?;
                stream.note_end_stream_sent()?;
            }
            return Ok(());
        }

        while !payload.is_empty() {
            let chunk_len = payload.len().min(max);
            self.flow.reserve_send(stream.id(), chunk_len, deadline)?;
            let last = chunk_len == payload.len();
            let bytes = frame::data_frame(stream.id(), &payload[..chunk_len], end_stream && last);
            self.write_frame(&bytes)?;
            payload = &payload[chunk_len..];
        }
        if end_stream {
            stream.note_end_stream_sent()?;
        }
        Ok(())
    }

    pub(crate) fn send_rst_stream(&self, stream_id: u32, code: u32) -> Result<()> {
        self.write_frame(&frame::rst_stream_frame(stream_id, code))
    }

    /// Send a keep-alive PING and record it as pending until the ACK echoes
    /// the payload back.
    pub(crate) fn send_keepalive_ping(&self, payload: [u8; 8]) -> Result<()> {
        {
            let mut ping = self.ping.lock().unwrap();
            ping.pending = Some((payload, Instant::now()));
        }
        self.write_frame(&frame::ping_frame(payload, false))
    }

    /// Instant the oldest unanswered keep-alive PING went out, if any.
    pub(crate) fn ping_pending_since(&self) -> Option<Instant> {
        self.ping.lock().unwrap().pending.map(|(_, at)| at)
    }

    pub(crate) fn last_ping_ack(&self) -> Option<Instant> {
        self.ping.lock().unwrap().last_ack
    }

    // ---- receive path ----

    /// Run the connection dispatcher until the transport fails, the peer
    /// closes, or `stop` is raised. Consumes the calling thread.
    pub(crate) fn dispatch_loop(self: Arc<Self>, stop: Option<Arc<AtomicBool>>) {
        let mut decoder = match self.role {
            Role::Client => FrameDecoder::new(),
            Role::Server => FrameDecoder::expecting_preface(),
        };
        let mut assembler = HeaderAssembler::default();
        let mut buf = vec![0u8; 16 * 1024];

        let teardown_status = 'read: loop {
            if self.is_closed() {
                break None;
            }
            if let Some(stop) = &stop {
                if stop.load(Ordering::SeqCst) {
                    break None;
                }
            }
            match self.transport.recv(&mut buf) {
                Ok(0) => break Some(Status::new(StatusCode::Unavailable, "connection closed by peer")),
                Ok(n) => {
                    decoder.feed(&buf[..n]);
                    loop {
                        match decoder.next_frame() {
                            Ok(Some((header, payload))) => {
                                if let Err(err) =
                                    Self::handle_frame(&self, &mut assembler, header, payload)
                                {
                                    break 'read Some(self.connection_error(err));
                                }
                            }
                            Ok(None) => break,
                            Err(err) => break 'read Some(self.connection_error(err)),
                        }
                    }
                }
                Err(err) if tls::is_retry(&err) => continue,
                Err(err) => {
                    break Some(Status::new(StatusCode::Unavailable, format!("i/o failure: {err}")))
                }
            }
        };

        self.teardown(teardown_status.unwrap_or_else(|| Status::new(StatusCode::Unavailable, "connection closed")));
    }

    /// Emit a GOAWAY for a fatal connection error and map it to the status
    /// every surviving stream will observe.
    fn connection_error(&self, err: Error) -> Status {
        let code = match &err {
            Error::Protocol { code, .. } => *code,
            Error::Hpack(_) => error_code::COMPRESSION_ERROR,
            _ => error_code::INTERNAL_ERROR,
        };
        warn!(code, error = %err, "connection error");
        let last = self.highest_peer_stream();
        let _ = self.write_frame(&frame::goaway_frame(last, code));
        Status::new(StatusCode::Unavailable, format!("connection error: {err}"))
    }

    fn highest_peer_stream(&self) -> u32 {
        let streams = self.streams.lock().unwrap();
        let peer_parity = match self.role {
            Role::Client => 0, // even ids
            Role::Server => 1, // odd ids
        };
        streams
            .keys()
            .filter(|id| *id % 2 == peer_parity)
            .copied()
            .max()
            .unwrap_or(0)
    }

    fn handle_frame(
        this: &Arc<Self>,
        assembler: &mut HeaderAssembler,
        header: FrameHeader,
        payload: Vec<u8>,
    ) -> Result<()> {
        if assembler.stream_id.is_some() && header.frame_type != frame_type::CONTINUATION {
            return Err(Error::Protocol {
                code: error_code::PROTOCOL_ERROR,
                reason: "expected CONTINUATION to finish header block".into(),
            });
        }
        trace!(frame_type = header.frame_type, stream = header.stream_id, len = header.length, "frame");
        match header.frame_type {
            frame_type::DATA => this.on_data(header, payload),
            frame_type::HEADERS => {
                let fragment = frame::headers_fragment(&header, payload)?;
                if header.is_end_headers() {
                    Self::on_header_block(this, header.stream_id, fragment, header.is_end_stream())
                } else {
                    if fragment.len() > MAX_HEADER_BLOCK_SIZE {
                        return Err(header_block_too_large(fragment.len()));
                    }
                    assembler.stream_id = Some(header.stream_id);
                    assembler.end_stream = header.is_end_stream();
                    assembler.block = fragment;
                    Ok(())
                }
            }
            frame_type::CONTINUATION => {
                let pending = assembler.stream_id.ok_or(Error::Protocol {
                    code: error_code::PROTOCOL_ERROR,
                    reason: "CONTINUATION without preceding HEADERS".into(),
                })?;
                if pending != header.stream_id {
                    return Err(Error::Protocol {
                        code: error_code::PROTOCOL_ERROR,
                        reason: format!(
                            "CONTINUATION for stream {} while stream {} block is open",
                            header.stream_id, pending
                        ),
                    });
                }
                if assembler.block.len() + payload.len() > MAX_HEADER_BLOCK_SIZE {
                    return Err(header_block_too_large(assembler.block.len() + payload.len()));
                }
                assembler.block.extend_from_slice(&payload);
                if header.is_end_headers() {
                    let block = std::mem::take(&mut assembler.block);
                    let end_stream = assembler.end_stream;
                    assembler.stream_id = None;
                    assembler.end_stream = false;
                    Self::on_header_block(this, pending, block, end_stream)
                } else {
                    Ok(())
                }
            }
            frame_type::RST_STREAM => {
                if payload.len() < 4 {
                    return Err(frame_too_short("RST_STREAM"));
                }
                let code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                if let Some(stream) = this.stream(header.stream_id) {
                    stream.deliver_reset(code);
                    this.remove_stream(header.stream_id);
                }
                Ok(())
            }
            frame_type::SETTINGS => this.on_settings(header, &payload),
            frame_type::PING => {
                if payload.len() < 8 {
                    return Err(frame_too_short("PING"));
                }
                let mut data = [0u8; 8];
                data.copy_from_slice(&payload[..8]);
                if header.is_ack() {
                    let mut ping = this.ping.lock().unwrap();
                    if ping.pending.map(|(sent, _)| sent == data).unwrap_or(false) {
                        ping.pending = None;
                        ping.last_ack = Some(Instant::now());
                    }
                    Ok(())
                } else {
                    this.write_frame(&frame::ping_frame(data, true))
                }
            }
            frame_type::GOAWAY => {
                if payload.len() < 8 {
                    return Err(frame_too_short("GOAWAY"));
                }
                let last_stream_id =
                    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
                let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
                this.goaway_received.store(true, Ordering::SeqCst);
                debug!(last_stream_id, code, "GOAWAY received");
                // Streams the peer will never process die here.
                let orphaned: Vec<_> = {
                    let streams = this.streams.lock().unwrap();
                    streams
                        .iter()
                        .filter(|(id, _)| **id > last_stream_id)
                        .map(|(_, s)| s.clone())
                        .collect()
                };
                for stream in orphaned {
                    stream.fail(Status::new(
                        StatusCode::Unavailable,
                        "stream refused by GOAWAY",
                    ));
                }
                if code != error_code::NO_ERROR {
                    return Err(Error::Protocol {
                        code,
                        reason: format!("peer sent GOAWAY with code {code}"),
                    });
                }
                Ok(())
            }
            frame_type::WINDOW_UPDATE => {
                if payload.len() < 4 {
                    return Err(frame_too_short("WINDOW_UPDATE"));
                }
                let increment =
                    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
                if increment == 0 {
                    return Err(Error::Protocol {
                        code: error_code::PROTOCOL_ERROR,
                        reason: "WINDOW_UPDATE with zero increment".into(),
                    });
                }
                match this.flow.window_update(header.stream_id, increment) {
                    Ok(()) => Ok(()),
                    Err(FlowViolation::Connection) => Err(Error::Protocol {
                        code: error_code::FLOW_CONTROL_ERROR,
                        reason: "connection window overflow".into(),
                    }),
                    Err(FlowViolation::Stream(id)) => {
                        this.reset_stream_for_violation(id);
                        Ok(())
                    }
                }
            }
            // PRIORITY is advisory and PUSH_PROMISE is disabled; unknown
            // frame types must be ignored.
            _ => Ok(()),
        }
    }

    fn on_data(&self, header: FrameHeader, payload: Vec<u8>) -> Result<()> {
        // Flow control covers the whole payload, padding included.
        let accounted = header.length as usize;
        let replenishments = match self.flow.data_received(header.stream_id, accounted) {
            DataReceived::Accepted(updates) => updates,
            DataReceived::StreamViolation {
                stream_id,
                replenishments,
            } => {
                // The connection window was still debited; keep the peer's
                // view in sync before resetting the one bad stream.
                for (id, increment) in replenishments {
                    self.write_frame(&frame::window_update_frame(id, increment))?;
                }
                self.reset_stream_for_violation(stream_id);
                return Ok(());
            }
            DataReceived::ConnectionViolation => {
                return Err(Error::Protocol {
                    code: error_code::FLOW_CONTROL_ERROR,
                    reason: "connection receive window violated".into(),
                })
            }
        };
        for (stream_id, increment) in replenishments {
            self.write_frame(&frame::window_update_frame(stream_id, increment))?;
        }

        let data = frame::data_payload(&header, payload)?;
        if let Some(stream) = self.stream(header.stream_id) {
            if let Err(err) = stream.deliver_data(&data, header.is_end_stream()) {
                debug!(stream = header.stream_id, error = %err, "resetting stream");
                stream.fail(Status::new(StatusCode::Internal, format!("{err}")));
                let _ = self.send_rst_stream(header.stream_id, error_code::STREAM_CLOSED);
                self.remove_stream(header.stream_id);
            }
        }
        Ok(())
    }

    fn reset_stream_for_violation(&self, stream_id: u32) {
        if let Some(stream) = self.stream(stream_id) {
            stream.fail(Status::new(StatusCode::Internal, "flow control violated"));
        }
        let _ = self.send_rst_stream(stream_id, error_code::FLOW_CONTROL_ERROR);
        self.remove_stream(stream_id);
    }

    fn on_settings(&self, header: FrameHeader, payload: &[u8]) -> Result<()> {
        if header.is_ack() {
            let mut handshake = self.handshake.lock().unwrap();
            handshake.settings_acked = true;
            self.handshake_done.notify_all();
            return Ok(());
        }
        let entries = frame::parse_settings(payload)?;
        {
            let mut handshake = self.handshake.lock().unwrap();
            for (id, value) in entries {
                match id {
                    frame::settings_id::MAX_FRAME_SIZE => {
                        handshake.peer_settings.max_frame_size = value.clamp(16_384, 16_777_215)
                    }
                    frame::settings_id::MAX_CONCURRENT_STREAMS => {
                        handshake.peer_settings.max_concurrent_streams = value
                    }
                    frame::settings_id::INITIAL_WINDOW_SIZE => {
                        handshake.peer_settings.initial_window_size = value
                    }
                    _ => {}
                }
            }
            handshake.settings_received = true;
            self.handshake_done.notify_all();
        }
        self.write_frame(&frame::settings_ack_frame())
    }

    fn on_header_block(this: &Arc<Self>, stream_id: u32, block: Vec<u8>, end_stream: bool) -> Result<()> {
        let metadata = hpack::decode_block(&block)?;
        if let Some(stream) = this.stream(stream_id) {
            if let Err(err) = stream.deliver_headers(metadata, end_stream) {
                debug!(stream = stream_id, error = %err, "resetting stream");
                stream.fail(Status::new(StatusCode::Internal, format!("{err}")));
                let _ = this.send_rst_stream(stream_id, error_code::PROTOCOL_ERROR);
                this.remove_stream(stream_id);
            }
            return Ok(());
        }

        // Unknown stream: on the server side this is how calls begin.
        if this.role == Role::Server {
            if stream_id % 2 == 0 || stream_id == 0 {
                return Err(Error::Protocol {
                    code: error_code::PROTOCOL_ERROR,
                    reason: format!("peer opened stream {stream_id} with wrong parity"),
                });
            }
            let stream = Arc::new(Http2Stream::new(stream_id));
            stream.deliver_headers(metadata.clone(), end_stream)?;
            this.streams.lock().unwrap().insert(stream_id, stream.clone());
            this.flow.register_stream(stream_id);
            if let Some(handler) = &this.on_incoming {
                handler(this.clone(), stream, metadata);
            }
        }
        Ok(())
    }

    /// Tear the connection down: every stream fails with `status`, blocked
    /// senders wake, the transport closes.
    pub(crate) fn teardown(&self, status: Status) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(code = ?status.code, "connection teardown");
        self.flow.abort();
        let streams: Vec<_> = {
            let mut table = self.streams.lock().unwrap();
            table.drain().map(|(_, s)| s).collect()
        };
        for stream in streams {
            stream.fail(status.clone());
        }
        self.handshake_done.notify_all();
        self.transport.shutdown();
    }
}

fn frame_too_short(what: &str) -> Error {
    Error::Protocol {
        code: error_code::FRAME_SIZE_ERROR,
        reason: format!("{what} frame too short"),
    }
}

fn header_block_too_large(size: usize) -> Error {
    Error::Protocol {
        code: error_code::ENHANCE_YOUR_CALM,
        reason: format!("header block of {size} bytes exceeds {MAX_HEADER_BLOCK_SIZE}"),
    }
}

/// A lazily-opened HTTP/2 client connection.
///
/// Construction records the target only; the socket opens on first use so
/// channels can exist before their server does.
pub struct Http2Connection {
    target: String,
    creds: Option<ChannelCredentials>,
    shared: Mutex<Option<Arc<ConnShared>>>,
}

impl Http2Connection {
    pub fn client(target: impl Into<String>, creds: Option<ChannelCredentials>) -> Http2Connection {
        Http2Connection {
            target: target.into(),
            creds,
            shared: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_open(&self) -> bool {
        self.shared
            .lock()
            .unwrap()
            .as_ref()
            .map(|shared| !shared.is_closed())
            .unwrap_or(false)
    }

    /// Open the connection now instead of at first call creation.
    pub fn connect(&self) -> Result<()> {
        self.ensure_open().map(|_| ())
    }

    /// The live connection state, opening the socket on first use.
    pub(crate) fn ensure_open(&self) -> Result<Arc<ConnShared>> {
        let mut guard = self.shared.lock().unwrap();
        if let Some(shared) = guard.as_ref() {
            if !shared.is_closed() {
                return Ok(shared.clone());
            }
        }
        let shared = ConnShared::connect_client(&self.target, self.creds.as_ref())?;
        *guard = Some(shared.clone());
        Ok(shared)
    }

    /// Close the connection if it is open. A later use reopens it.
    pub fn close(&self) {
        if let Some(shared) = self.shared.lock().unwrap().take() {
            shared.teardown(Status::new(StatusCode::Unavailable, "connection closed locally"));
        }
    }

    /// Send a keep-alive PING if the connection is open. No-op otherwise.
    pub fn send_keepalive_ping(&self) -> Result<()> {
        let shared = self.shared.lock().unwrap().as_ref().cloned();
        match shared {
            Some(shared) if !shared.is_closed() => {
                let payload = rand::random::<u64>().to_be_bytes();
                shared.send_keepalive_ping(payload)
            }
            _ => Ok(()),
        }
    }

    /// Instant the oldest unanswered keep-alive PING went out.
    pub fn keepalive_pending_since(&self) -> Option<Instant> {
        let guard = self.shared.lock().unwrap();
        guard.as_ref().and_then(|shared| shared.ping_pending_since())
    }

    /// Instant the latest keep-alive PING was acknowledged.
    pub fn last_keepalive_ack(&self) -> Option<Instant> {
        let guard = self.shared.lock().unwrap();
        guard.as_ref().and_then(|shared| shared.last_ping_ack())
    }
}

impl Drop for Http2Connection {
    fn drop(&mut self) {
        self.close();
    }
}
