//! RPC server: listening ports, the accept worker pool and incoming-call
//! delivery.
//!
//! Workers poll every listening socket with a 100 ms idle sleep and hand each
//! accepted socket to a per-connection thread, which (after an optional TLS
//! handshake) runs the HTTP/2 dispatcher. When a request header block
//! completes on a new stream, the call is matched against an armed
//! `request_call` slot — or parked until one arrives.

use std::collections::VecDeque;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::call::Call;
use crate::channel::ChannelArgs;
use crate::compress::Compression;
use crate::conn::ConnShared;
use crate::cq::CompletionQueue;
use crate::credentials::ServerCredentials;
use crate::error::{Error, Result};
use crate::message;
use crate::metadata::Metadata;
use crate::resolver;
use crate::status::{Deadline, Event, Tag};
use crate::stream::Http2Stream;
use crate::tls::{self, PlainTransport, Transport};

/// Worker threads accepting connections, unless overridden by the
/// `grpc.server_worker_threads` channel arg.
const DEFAULT_WORKER_THREADS: usize = 4;

/// Idle sleep between accept sweeps.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const LISTEN_BACKLOG: i32 = 128;

/// Identity of an incoming call, filled when a `request_call` slot matches.
#[derive(Clone, Debug)]
pub struct CallDetails {
    pub method: String,
    pub host: Option<String>,
    pub deadline: Deadline,
    /// Full request metadata, pseudo-headers included.
    pub metadata: Metadata,
}

/// Handle returned by [`Server::request_call`]; holds the delivered call
/// once the armed completion event fires.
#[derive(Default)]
pub struct CallSlot {
    inner: Mutex<Option<(Call, CallDetails)>>,
}

impl CallSlot {
    /// Take the delivered call, once the completion event for the armed tag
    /// has been observed.
    pub fn take(&self) -> Option<(Call, CallDetails)> {
        self.inner.lock().unwrap().take()
    }
}

struct IncomingRpc {
    conn: Arc<ConnShared>,
    stream: Arc<Http2Stream>,
    method: String,
    host: Option<String>,
    peer_encoding: Option<Compression>,
    deadline: Deadline,
    metadata: Metadata,
}

struct PendingRequest {
    cq: Arc<CompletionQueue>,
    tag: Tag,
    slot: Arc<CallSlot>,
}

struct Port {
    listener: Arc<TcpListener>,
    tls: Option<Arc<rustls::ServerConfig>>,
    port: u16,
}

#[derive(Default)]
struct ServerState {
    ports: Vec<Port>,
    cqs: Vec<Arc<CompletionQueue>>,
    started: bool,
    workers: Vec<JoinHandle<()>>,
    pending_requests: VecDeque<PendingRequest>,
    backlog: VecDeque<IncomingRpc>,
}

struct ServerInner {
    args: ChannelArgs,
    state: Mutex<ServerState>,
    shutdown: Arc<AtomicBool>,
}

/// An RPC server. Cloning yields another handle to the same server.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn new(args: ChannelArgs) -> Server {
        Server {
            inner: Arc::new(ServerInner {
                args,
                state: Mutex::new(ServerState::default()),
                shutdown: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Bind a plaintext listening port. Returns the chosen port, which is
    /// useful when binding port 0.
    pub fn add_insecure_port(&self, addr: &str) -> Result<u16> {
        self.add_port(addr, None)
    }

    /// Bind a TLS listening port.
    pub fn add_secure_port(&self, addr: &str, creds: &ServerCredentials) -> Result<u16> {
        self.add_port(addr, Some(creds))
    }

    fn add_port(&self, addr: &str, creds: Option<&ServerCredentials>) -> Result<u16> {
        let mut state = self.inner.state.lock().unwrap();
        if state.started {
            return Err(Error::InvalidTarget(format!(
                "cannot add port {addr:?} after start"
            )));
        }
        let tls = creds.map(tls::server_config).transpose()?;

        let (host, port) = match addr.rsplit_once(':') {
            Some((host, port)) => (
                host.to_string(),
                port.parse::<u16>()
                    .map_err(|_| Error::InvalidTarget(addr.to_string()))?,
            ),
            None => (addr.to_string(), resolver::DEFAULT_PORT),
        };
        let sock_addr = (host.as_str(), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::InvalidTarget(addr.to_string()))?;

        let socket = Socket::new(Domain::for_address(sock_addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&sock_addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;
        let chosen = listener.local_addr()?.port();
        debug!(addr, chosen, secure = tls.is_some(), "listening");

        state.ports.push(Port {
            listener: Arc::new(listener),
            tls,
            port: chosen,
        });
        Ok(chosen)
    }

    /// Associate a completion queue with the server. Events for accepted
    /// calls are only ever delivered to registered queues.
    pub fn register_completion_queue(&self, cq: &Arc<CompletionQueue>) {
        self.inner.state.lock().unwrap().cqs.push(cq.clone());
    }

    /// Ports currently bound, in the order they were added.
    pub fn ports(&self) -> Vec<u16> {
        let state = self.inner.state.lock().unwrap();
        state.ports.iter().map(|p| p.port).collect()
    }

    /// Start the accept worker pool. Ports are immutable from here on.
    pub fn start(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.started {
            return;
        }
        state.started = true;

        let worker_count = self
            .inner
            .args
            .get_int("grpc.server_worker_threads")
            .map(|n| n.clamp(1, 64) as usize)
            .unwrap_or(DEFAULT_WORKER_THREADS);
        let ports: Vec<(Arc<TcpListener>, Option<Arc<rustls::ServerConfig>>)> = state
            .ports
            .iter()
            .map(|p| (p.listener.clone(), p.tls.clone()))
            .collect();

        for i in 0..worker_count {
            let inner = self.inner.clone();
            let ports = ports.clone();
            let shutdown = self.inner.shutdown.clone();
            let handle = thread::Builder::new()
                .name(format!("h2-rpc-accept-{i}"))
                .spawn(move || accept_loop(inner, ports, shutdown));
            match handle {
                Ok(handle) => state.workers.push(handle),
                Err(err) => warn!(error = %err, "failed to spawn accept worker"),
            }
        }
    }

    /// Arm delivery of exactly one incoming call: when the next call
    /// arrives (or if one is already parked), an `OpComplete` event with
    /// `tag` is pushed to `cq` and the call becomes available on the
    /// returned slot.
    pub fn request_call(&self, cq: &Arc<CompletionQueue>, tag: Tag) -> Arc<CallSlot> {
        let slot = Arc::new(CallSlot::default());
        let delivered = {
            let mut state = self.inner.state.lock().unwrap();
            if !state.cqs.iter().any(|registered| Arc::ptr_eq(registered, cq)) {
                warn!("request_call armed with an unregistered completion queue");
            }
            match state.backlog.pop_front() {
                Some(rpc) => {
                    *slot.inner.lock().unwrap() = Some(deliver_call(rpc, cq));
                    true
                }
                None => {
                    state.pending_requests.push_back(PendingRequest {
                        cq: cq.clone(),
                        tag,
                        slot: slot.clone(),
                    });
                    false
                }
            }
        };
        if delivered {
            cq.push(Event::op_complete(tag, true));
        }
        slot
    }

    /// Stop accepting, join the worker pool and post a final completion to
    /// `cq` under `tag`.
    pub fn shutdown_and_notify(&self, cq: &Arc<CompletionQueue>, tag: Tag) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        let workers = {
            let mut state = self.inner.state.lock().unwrap();
            std::mem::take(&mut state.workers)
        };
        for worker in workers {
            let _ = worker.join();
        }
        // Armed request slots can never be filled now.
        let pending = {
            let mut state = self.inner.state.lock().unwrap();
            std::mem::take(&mut state.pending_requests)
        };
        for request in pending {
            request.cq.push(Event::op_complete(request.tag, false));
        }
        cq.push(Event::op_complete(tag, true));
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }
}

fn accept_loop(
    inner: Arc<ServerInner>,
    ports: Vec<(Arc<TcpListener>, Option<Arc<rustls::ServerConfig>>)>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let mut accepted = false;
        for (listener, tls_config) in &ports {
            match listener.accept() {
                Ok((socket, peer)) => {
                    accepted = true;
                    debug!(%peer, "accepted connection");
                    let inner = inner.clone();
                    let tls_config = tls_config.clone();
                    let shutdown = shutdown.clone();
                    let spawned = thread::Builder::new()
                        .name("h2-rpc-conn".into())
                        .spawn(move || serve_connection(inner, socket, tls_config, shutdown));
                    if let Err(err) = spawned {
                        warn!(error = %err, "failed to spawn connection handler");
                    }
                }
                Err(err) if tls::is_retry(&err) => {}
                Err(err) => warn!(error = %err, "accept failed"),
            }
        }
        if !accepted {
            thread::sleep(ACCEPT_POLL_INTERVAL);
        }
    }
}

fn serve_connection(
    inner: Arc<ServerInner>,
    socket: TcpStream,
    tls_config: Option<Arc<rustls::ServerConfig>>,
    shutdown: Arc<AtomicBool>,
) {
    if let Err(err) = socket.set_nonblocking(false) {
        warn!(error = %err, "failed to configure accepted socket");
        return;
    }
    let transport: Arc<dyn Transport> = match tls_config {
        Some(config) => match tls::server_handshake(config, socket) {
            Ok(transport) => Arc::new(transport),
            Err(err) => {
                warn!(error = %err, "tls handshake failed");
                return;
            }
        },
        None => match PlainTransport::new(socket) {
            Ok(transport) => Arc::new(transport),
            Err(err) => {
                warn!(error = %err, "failed to wrap accepted socket");
                return;
            }
        },
    };

    let server: Weak<ServerInner> = Arc::downgrade(&inner);
    let handler = Box::new(move |conn: Arc<ConnShared>, stream: Arc<Http2Stream>, metadata: Metadata| {
        if let Some(server) = server.upgrade() {
            on_incoming_call(&server, conn, stream, metadata);
        }
    });
    match ConnShared::accept_server(transport, handler) {
        Ok(conn) => conn.dispatch_loop(Some(shutdown)),
        Err(err) => warn!(error = %err, "failed to establish http/2 connection"),
    }
}

fn on_incoming_call(
    inner: &Arc<ServerInner>,
    conn: Arc<ConnShared>,
    stream: Arc<Http2Stream>,
    metadata: Metadata,
) {
    let rpc = IncomingRpc {
        conn,
        stream,
        method: metadata.get_str(":path").unwrap_or("/").to_string(),
        host: metadata.get_str(":authority").map(str::to_string),
        peer_encoding: metadata
            .get_str("grpc-encoding")
            .and_then(Compression::from_name),
        deadline: metadata
            .get_str("grpc-timeout")
            .and_then(message::parse_timeout)
            .map(Deadline::after)
            .unwrap_or_else(Deadline::infinite),
        metadata,
    };

    let matched = {
        let mut state = inner.state.lock().unwrap();
        match state.pending_requests.pop_front() {
            Some(request) => {
                let delivery = deliver_call(rpc, &request.cq);
                *request.slot.inner.lock().unwrap() = Some(delivery);
                Some(request)
            }
            None => {
                state.backlog.push_back(rpc);
                None
            }
        }
    };
    if let Some(request) = matched {
        request.cq.push(Event::op_complete(request.tag, true));
    }
}

fn deliver_call(rpc: IncomingRpc, cq: &Arc<CompletionQueue>) -> (Call, CallDetails) {
    let details = CallDetails {
        method: rpc.method.clone(),
        host: rpc.host.clone(),
        deadline: rpc.deadline,
        metadata: rpc.metadata,
    };
    let call = Call::new_server(
        rpc.conn,
        rpc.stream,
        cq.clone(),
        &rpc.method,
        rpc.host.as_deref(),
        rpc.peer_encoding,
        rpc.deadline,
    );
    (call, details)
}
