//! TLS transport and the framed byte-transport abstraction.
//!
//! Clients pin TLSv1.2 as the floor, verify the server certificate against
//! the configured (or built-in) roots with strict hostname checking via SNI,
//! and require ALPN to negotiate exactly `h2`; anything else tears the
//! connection down before a single HTTP/2 frame is exchanged. Servers demand
//! a certificate/key pair and, when a client CA is pinned, demand client
//! certificates too.
//!
//! [`Transport`] is the byte pipe the HTTP/2 connection runs on. Reads carry
//! a poll interval (socket read timeout) so the dispatcher can observe
//! shutdown; `WouldBlock`/`TimedOut` mean "retry", end-of-file means the peer
//! closed.

use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection, StreamOwned};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName};

use crate::credentials::{ChannelCredentials, ServerCredentials};
use crate::error::{Error, Result};

/// The only application protocol this runtime speaks.
pub const ALPN_H2: &[u8] = b"h2";

/// Socket read timeout used to keep dispatcher reads interruptible.
pub(crate) const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Byte transport shared by a connection's single reader and its many
/// writers.
pub trait Transport: Send + Sync {
    /// Read into `buf`. `Ok(0)` means the peer closed the transport;
    /// `WouldBlock`/`TimedOut` errors mean no bytes were ready within the
    /// poll interval and the caller should retry.
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `buf`.
    fn send_all(&self, buf: &[u8]) -> io::Result<()>;

    /// Orderly shutdown; for TLS this sends close_notify.
    fn shutdown(&self);
}

/// True for errors that mean "no data yet", not failure.
pub(crate) fn is_retry(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Plaintext TCP transport. The stream is cloned so the reader can block in
/// `recv` while writers make progress.
pub struct PlainTransport {
    reader: Mutex<TcpStream>,
    writer: Mutex<TcpStream>,
}

impl PlainTransport {
    pub fn new(stream: TcpStream) -> io::Result<PlainTransport> {
        let reader = stream.try_clone()?;
        reader.set_read_timeout(Some(READ_POLL_INTERVAL))?;
        stream.set_nodelay(true)?;
        Ok(PlainTransport {
            reader: Mutex::new(reader),
            writer: Mutex::new(stream),
        })
    }
}

impl Transport for PlainTransport {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.lock().unwrap().read(buf)
    }

    fn send_all(&self, buf: &[u8]) -> io::Result<()> {
        self.writer.lock().unwrap().write_all(buf)
    }

    fn shutdown(&self) {
        let _ = self.writer.lock().unwrap().shutdown(Shutdown::Both);
    }
}

enum TlsSession {
    Client(StreamOwned<ClientConnection, TcpStream>),
    Server(StreamOwned<ServerConnection, TcpStream>),
}

/// TLS transport over a blocking socket.
///
/// rustls sessions are not split into read and write halves, so one mutex
/// guards the whole session; the socket read timeout bounds how long the
/// dispatcher can hold it while polling for bytes.
pub struct TlsTransport {
    session: Mutex<TlsSession>,
}

impl Transport for TlsTransport {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut session = self.session.lock().unwrap();
        match &mut *session {
            TlsSession::Client(stream) => stream.read(buf),
            TlsSession::Server(stream) => stream.read(buf),
        }
    }

    fn send_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut session = self.session.lock().unwrap();
        match &mut *session {
            TlsSession::Client(stream) => stream.write_all(buf),
            TlsSession::Server(stream) => stream.write_all(buf),
        }
    }

    fn shutdown(&self) {
        let mut session = self.session.lock().unwrap();
        match &mut *session {
            TlsSession::Client(stream) => {
                stream.conn.send_close_notify();
                let _ = stream.flush();
                let _ = stream.sock.shutdown(Shutdown::Both);
            }
            TlsSession::Server(stream) => {
                stream.conn.send_close_notify();
                let _ = stream.flush();
                let _ = stream.sock.shutdown(Shutdown::Both);
            }
        }
    }
}

fn load_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem.as_bytes());
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .collect::<io::Result<_>>()
        .map_err(|e| Error::Tls(format!("invalid certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(Error::Tls("no certificates found in PEM".into()));
    }
    Ok(certs)
}

fn load_private_key(pem: &str) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(pem.as_bytes());
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Tls(format!("invalid private key PEM: {e}")))?
        .ok_or_else(|| Error::Tls("no private key found in PEM".into()))
}

fn root_store(pem: Option<&str>) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    match pem {
        Some(pem) => {
            let (added, _) = roots.add_parsable_certificates(load_certs(pem)?);
            if added == 0 {
                return Err(Error::Tls("no usable root certificates".into()));
            }
        }
        None => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }
    Ok(roots)
}

/// Build the client TLS configuration: TLSv1.2 floor, configured roots,
/// optional client identity, ALPN pinned to `h2`.
pub fn client_config(creds: &ChannelCredentials) -> Result<Arc<ClientConfig>> {
    let roots = root_store(creds.root_certs_pem.as_deref())?;
    let builder = ClientConfig::builder_with_protocol_versions(rustls::ALL_VERSIONS)
        .with_root_certificates(roots);
    let mut config = match &creds.identity {
        Some(pair) => builder
            .with_client_auth_cert(load_certs(&pair.cert_chain_pem)?, load_private_key(&pair.private_key_pem)?)
            .map_err(|e| Error::Tls(format!("client identity rejected: {e}")))?,
        None => builder.with_no_client_auth(),
    };
    config.alpn_protocols = vec![ALPN_H2.to_vec()];
    Ok(Arc::new(config))
}

/// Build the server TLS configuration: TLSv1.2 floor, mandatory identity,
/// client certificates demanded when a client CA is pinned, ALPN accepting
/// exactly `h2`.
pub fn server_config(creds: &ServerCredentials) -> Result<Arc<ServerConfig>> {
    let pair = creds
        .key_cert_pairs
        .first()
        .ok_or_else(|| Error::Tls("server credentials require a certificate/key pair".into()))?;
    let certs = load_certs(&pair.cert_chain_pem)?;
    let key = load_private_key(&pair.private_key_pem)?;

    let builder = ServerConfig::builder_with_protocol_versions(rustls::ALL_VERSIONS);
    let mut config = match creds.client_root_certs_pem.as_deref() {
        Some(pem) => {
            let verifier = WebPkiClientVerifier::builder(Arc::new(root_store(Some(pem))?))
                .build()
                .map_err(|e| Error::Tls(format!("client CA rejected: {e}")))?;
            builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)
        }
        None => builder.with_no_client_auth().with_single_cert(certs, key),
    }
    .map_err(|e| Error::Tls(format!("server identity rejected: {e}")))?;
    config.alpn_protocols = vec![ALPN_H2.to_vec()];
    Ok(Arc::new(config))
}

fn require_h2(alpn: Option<&[u8]>) -> Result<()> {
    match alpn {
        Some(proto) if proto == ALPN_H2 => Ok(()),
        Some(proto) => Err(Error::Tls(format!(
            "peer negotiated {:?} instead of h2",
            String::from_utf8_lossy(proto)
        ))),
        None => Err(Error::Tls("peer did not negotiate an application protocol".into())),
    }
}

/// Run the client handshake on `tcp`, verifying `host` and enforcing
/// ALPN=`h2` before any HTTP/2 byte moves.
pub fn client_handshake(config: Arc<ClientConfig>, mut tcp: TcpStream, host: &str) -> Result<TlsTransport> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| Error::Tls(format!("invalid server name {host:?}")))?;
    let mut conn = ClientConnection::new(config, server_name)?;
    while conn.is_handshaking() {
        conn.complete_io(&mut tcp)
            .map_err(|e| Error::Tls(format!("handshake failed: {e}")))?;
    }
    require_h2(conn.alpn_protocol())?;
    tcp.set_read_timeout(Some(READ_POLL_INTERVAL))?;
    tcp.set_nodelay(true)?;
    Ok(TlsTransport {
        session: Mutex::new(TlsSession::Client(StreamOwned::new(conn, tcp))),
    })
}

/// Run the server handshake on an accepted socket.
pub fn server_handshake(config: Arc<ServerConfig>, mut tcp: TcpStream) -> Result<TlsTransport> {
    let mut conn = ServerConnection::new(config)?;
    while conn.is_handshaking() {
        conn.complete_io(&mut tcp)
            .map_err(|e| Error::Tls(format!("handshake failed: {e}")))?;
    }
    require_h2(conn.alpn_protocol())?;
    tcp.set_read_timeout(Some(READ_POLL_INTERVAL))?;
    tcp.set_nodelay(true)?;
    Ok(TlsTransport {
        session: Mutex::new(TlsSession::Server(StreamOwned::new(conn, tcp))),
    })
}
