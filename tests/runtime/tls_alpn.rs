//! Tests for TLS handshakes and ALPN enforcement

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use h2_rpc::tls;
use h2_rpc::{ChannelCredentials, KeyCertPair, ServerCredentials};

fn self_signed() -> (String, String) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    (certified.cert.pem(), certified.key_pair.serialize_pem())
}

#[test]
fn test_client_config_requires_usable_roots() {
    let creds = ChannelCredentials::ssl(Some("not a pem"), None);
    assert!(tls::client_config(&creds).is_err());
}

#[test]
fn test_server_config_requires_identity() {
    let creds = ServerCredentials::ssl(None, Vec::new());
    assert!(tls::server_config(&creds).is_err());
}

#[test]
fn test_handshake_negotiates_h2() {
    let (cert_pem, key_pem) = self_signed();
    let server_config =
        tls::server_config(&ServerCredentials::ssl(None, vec![KeyCertPair::new(&cert_pem, &key_pem)]))
            .unwrap();
    let client_config =
        tls::client_config(&ChannelCredentials::ssl(Some(&cert_pem), None)).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        tls::server_handshake(server_config, socket)
    });

    let tcp = TcpStream::connect(addr).unwrap();
    let client_side = tls::client_handshake(client_config, tcp, "localhost");
    assert!(client_side.is_ok());
    assert!(server.join().unwrap().is_ok());
}

#[test]
fn test_handshake_fails_against_peer_without_h2() {
    let (cert_pem, key_pem) = self_signed();

    // A raw TLS server that only speaks http/1.1.
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_bytes()))
        .collect::<Result<_, _>>()
        .unwrap();
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem.as_bytes()))
        .unwrap()
        .unwrap();
    let mut server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];
    let server_config = Arc::new(server_config);

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut conn = rustls::ServerConnection::new(server_config).unwrap();
        // The handshake is expected to abort on the ALPN mismatch.
        while conn.is_handshaking() {
            if conn.complete_io(&mut socket).is_err() {
                return;
            }
        }
    });

    let client_config =
        tls::client_config(&ChannelCredentials::ssl(Some(&cert_pem), None)).unwrap();
    let tcp = TcpStream::connect(addr).unwrap();
    assert!(tls::client_handshake(client_config, tcp, "localhost").is_err());
    server.join().unwrap();
}

#[test]
fn test_handshake_fails_on_untrusted_certificate() {
    let (server_cert, server_key) = self_signed();
    let (other_cert, _) = self_signed();

    let server_config = tls::server_config(&ServerCredentials::ssl(
        None,
        vec![KeyCertPair::new(&server_cert, &server_key)],
    ))
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        // Client aborts on verification failure; either outcome is fine here.
        let _ = tls::server_handshake(server_config, socket);
    });

    // The client trusts a different self-signed root.
    let client_config =
        tls::client_config(&ChannelCredentials::ssl(Some(&other_cert), None)).unwrap();
    let tcp = TcpStream::connect(addr).unwrap();
    assert!(tls::client_handshake(client_config, tcp, "localhost").is_err());
    server.join().unwrap();
}
