//! Client channels and channel arguments.
//!
//! A channel owns one lazy HTTP/2 connection to its target: the socket does
//! not open until the first call is created, so channels can exist before
//! their server does.

use std::sync::Arc;

use crate::call::{BatchOp, Call};
use crate::conn::Http2Connection;
use crate::cq::CompletionQueue;
use crate::credentials::ChannelCredentials;
use crate::error::Result;
use crate::metadata::Metadata;
use crate::resolver::NameResolver;
use crate::status::{Deadline, Tag};

/// A typed channel/server configuration value.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    Integer(i64),
    Str(String),
}

/// Ordered key/value configuration carried by channels and servers.
#[derive(Clone, Debug, Default)]
pub struct ChannelArgs {
    entries: Vec<(String, ArgValue)>,
}

impl ChannelArgs {
    pub fn new() -> ChannelArgs {
        ChannelArgs::default()
    }

    pub fn set_int(mut self, key: &str, value: i64) -> ChannelArgs {
        self.entries.push((key.to_string(), ArgValue::Integer(value)));
        self
    }

    pub fn set_str(mut self, key: &str, value: &str) -> ChannelArgs {
        self.entries
            .push((key.to_string(), ArgValue::Str(value.to_string())));
        self
    }

    /// Last integer value recorded for `key`.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.entries.iter().rev().find_map(|(k, v)| match v {
            ArgValue::Integer(i) if k == key => Some(*i),
            _ => None,
        })
    }

    /// Last string value recorded for `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.iter().rev().find_map(|(k, v)| match v {
            ArgValue::Str(s) if k == key => Some(s.as_str()),
            _ => None,
        })
    }
}

struct ChannelInner {
    target: String,
    authority: String,
    secure: bool,
    conn: Http2Connection,
    args: ChannelArgs,
}

/// A client channel to one target. Cloning yields another handle to the same
/// channel (and its connection).
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Create a channel, optionally secured with TLS credentials.
    pub fn new(target: &str, creds: Option<ChannelCredentials>, args: ChannelArgs) -> Channel {
        let secure = creds.is_some();
        Channel {
            inner: Arc::new(ChannelInner {
                target: target.to_string(),
                authority: NameResolver::host_of(target),
                secure,
                conn: Http2Connection::client(target, creds),
                args,
            }),
        }
    }

    /// Create a plaintext channel.
    pub fn insecure(target: &str, args: ChannelArgs) -> Channel {
        Channel::new(target, None, args)
    }

    pub fn target(&self) -> &str {
        &self.inner.target
    }

    pub fn args(&self) -> &ChannelArgs {
        &self.inner.args
    }

    /// True once the underlying connection has been opened and is alive.
    pub fn is_connected(&self) -> bool {
        self.inner.conn.is_open()
    }

    /// Create a call on this channel, allocating the next client stream and
    /// binding the call to `cq`. Opens the connection on first use.
    pub fn create_call(
        &self,
        cq: &Arc<CompletionQueue>,
        method: &str,
        host: Option<&str>,
        deadline: Deadline,
    ) -> Result<Call> {
        let shared = self.inner.conn.ensure_open()?;
        let stream = shared.open_stream()?;
        Ok(Call::new_client(
            shared,
            stream,
            cq.clone(),
            method,
            host,
            &self.inner.authority,
            self.inner.secure,
            deadline,
        ))
    }

    /// Server-streaming calls are ordinary calls; the streaming shape comes
    /// from the batches driven on them.
    pub fn create_server_streaming_call(
        &self,
        cq: &Arc<CompletionQueue>,
        method: &str,
        host: Option<&str>,
        deadline: Deadline,
    ) -> Result<Call> {
        self.create_call(cq, method, host, deadline)
    }

    /// Client-streaming calls are ordinary calls; see
    /// [`create_server_streaming_call`](Self::create_server_streaming_call).
    pub fn create_client_streaming_call(
        &self,
        cq: &Arc<CompletionQueue>,
        method: &str,
        host: Option<&str>,
        deadline: Deadline,
    ) -> Result<Call> {
        self.create_call(cq, method, host, deadline)
    }

    /// Bidi-streaming calls are ordinary calls; see
    /// [`create_server_streaming_call`](Self::create_server_streaming_call).
    pub fn create_bidi_streaming_call(
        &self,
        cq: &Arc<CompletionQueue>,
        method: &str,
        host: Option<&str>,
        deadline: Deadline,
    ) -> Result<Call> {
        self.create_call(cq, method, host, deadline)
    }

    /// Probe the standard health-check method. Succeeds when a call could be
    /// created and a request batch was accepted; the serving verdict itself
    /// is application payload and out of scope here.
    pub fn health_check(&self, service: &str) -> Result<()> {
        tracing::debug!(service, "health check");
        let cq = Arc::new(CompletionQueue::new());
        let call = self.create_call(
            &cq,
            "/grpc.health.v1.Health/Check",
            None,
            Deadline::after_millis(5_000),
        )?;
        call.start_batch(vec![BatchOp::SendInitialMetadata(Metadata::new())], 0 as Tag)
            .map_err(|_| crate::error::Error::ConnectionClosed)?;
        cq.next(Deadline::after_millis(5_000));
        cq.shutdown();
        Ok(())
    }

    /// Close the channel's connection; a later call reopens it.
    pub fn close(&self) {
        self.inner.conn.close();
    }
}
