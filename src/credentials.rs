//! Credential material for TLS channels and servers.
//!
//! These types only carry PEM text; parsing and validation happen when the
//! TLS configuration is built in [`crate::tls`].

/// A PEM certificate chain and its private key.
#[derive(Clone, Debug)]
pub struct KeyCertPair {
    pub cert_chain_pem: String,
    pub private_key_pem: String,
}

impl KeyCertPair {
    pub fn new(cert_chain_pem: impl Into<String>, private_key_pem: impl Into<String>) -> KeyCertPair {
        KeyCertPair {
            cert_chain_pem: cert_chain_pem.into(),
            private_key_pem: private_key_pem.into(),
        }
    }
}

/// Client-side TLS credentials.
#[derive(Clone, Debug, Default)]
pub struct ChannelCredentials {
    /// PEM root certificates to trust. `None` selects the built-in web trust
    /// roots.
    pub root_certs_pem: Option<String>,
    /// Optional client identity for mutual TLS.
    pub identity: Option<KeyCertPair>,
}

impl ChannelCredentials {
    /// SSL credentials from optional roots and an optional client identity.
    pub fn ssl(root_certs_pem: Option<&str>, identity: Option<KeyCertPair>) -> ChannelCredentials {
        ChannelCredentials {
            root_certs_pem: root_certs_pem.map(str::to_string),
            identity,
        }
    }
}

/// Server-side TLS credentials.
#[derive(Clone, Debug)]
pub struct ServerCredentials {
    /// PEM roots used to verify client certificates. When present, clients
    /// must present a certificate.
    pub client_root_certs_pem: Option<String>,
    /// Certificate/key pairs; the first pair is served.
    pub key_cert_pairs: Vec<KeyCertPair>,
}

impl ServerCredentials {
    pub fn ssl(client_root_certs_pem: Option<&str>, key_cert_pairs: Vec<KeyCertPair>) -> ServerCredentials {
        ServerCredentials {
            client_root_certs_pem: client_root_certs_pem.map(str::to_string),
            key_cert_pairs,
        }
    }
}
