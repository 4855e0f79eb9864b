//! Name resolution: static, DNS and caller-supplied resolvers.
//!
//! A target is `host[:port]` with port defaulting to 50051. Re-resolution
//! replaces the cached address list atomically.

use std::net::ToSocketAddrs;
use std::sync::Mutex;

use tracing::debug;

use crate::error::{Error, Result};

/// The port assumed when a target does not name one.
pub const DEFAULT_PORT: u16 = 50051;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub address: String,
    pub port: u16,
}

impl ResolvedAddress {
    pub fn new(address: impl Into<String>, port: u16) -> ResolvedAddress {
        ResolvedAddress {
            address: address.into(),
            port,
        }
    }
}

/// Caller-supplied resolution function: target in, address list out.
pub type CustomResolveFn = dyn Fn(&str) -> Vec<ResolvedAddress> + Send + Sync;

enum Kind {
    Static,
    Dns,
    Custom(Box<CustomResolveFn>),
}

pub struct NameResolver {
    kind: Kind,
    target: String,
    addresses: Mutex<Vec<ResolvedAddress>>,
}

impl NameResolver {
    /// Resolver that parses the target itself as a single address.
    pub fn static_resolver(target: impl Into<String>) -> NameResolver {
        NameResolver::new(Kind::Static, target)
    }

    /// Resolver that looks the host up in DNS (both address families).
    pub fn dns(target: impl Into<String>) -> NameResolver {
        NameResolver::new(Kind::Dns, target)
    }

    /// Resolver delegating to a caller-supplied function whose result is
    /// taken verbatim.
    pub fn custom(
        target: impl Into<String>,
        resolve: impl Fn(&str) -> Vec<ResolvedAddress> + Send + Sync + 'static,
    ) -> NameResolver {
        NameResolver::new(Kind::Custom(Box::new(resolve)), target)
    }

    fn new(kind: Kind, target: impl Into<String>) -> NameResolver {
        NameResolver {
            kind,
            target: target.into(),
            addresses: Mutex::new(Vec::new()),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Host portion of a `host[:port]` target.
    pub fn host_of(target: &str) -> String {
        let (host, _) = split_target(target).unwrap_or((target.to_string(), DEFAULT_PORT));
        host
    }

    /// Resolve the target now, replacing the cached list atomically.
    pub fn resolve(&self) -> Result<Vec<ResolvedAddress>> {
        let resolved = match &self.kind {
            Kind::Static => {
                let (host, port) = split_target(&self.target)?;
                vec![ResolvedAddress::new(host, port)]
            }
            Kind::Dns => {
                let (host, port) = split_target(&self.target)?;
                let addrs = (host.as_str(), port)
                    .to_socket_addrs()
                    .map_err(|_| Error::Resolve(self.target.clone()))?;
                addrs
                    .map(|addr| ResolvedAddress::new(addr.ip().to_string(), port))
                    .collect()
            }
            Kind::Custom(resolve) => resolve(&self.target),
        };
        if resolved.is_empty() {
            return Err(Error::Resolve(self.target.clone()));
        }
        debug!(uri = %self.target, count = resolved.len(), "resolved");
        *self.addresses.lock().unwrap() = resolved.clone();
        Ok(resolved)
    }

    /// Last resolved address list (empty before the first `resolve`).
    pub fn addresses(&self) -> Vec<ResolvedAddress> {
        self.addresses.lock().unwrap().clone()
    }
}

fn split_target(target: &str) -> Result<(String, u16)> {
    if target.is_empty() {
        return Err(Error::InvalidTarget(target.to_string()));
    }
    // Bracketed IPv6 literals carry their colons inside the brackets.
    if let Some(rest) = target.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| Error::InvalidTarget(target.to_string()))?;
        let port = match rest.strip_prefix(':') {
            Some(port) => port
                .parse()
                .map_err(|_| Error::InvalidTarget(target.to_string()))?,
            None => DEFAULT_PORT,
        };
        return Ok((host.to_string(), port));
    }
    match target.rsplit_once(':') {
        // More than one colon without brackets: a bare IPv6 literal.
        Some((host, _)) if host.contains(':') => Ok((target.to_string(), DEFAULT_PORT)),
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| Error::InvalidTarget(target.to_string()))?;
            Ok((host.to_string(), port))
        }
        None => Ok((target.to_string(), DEFAULT_PORT)),
    }
}
