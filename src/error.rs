//! Crate-wide error type.
//!
//! Transport failures surface through [`Error`]; batch acceptance failures use
//! the synchronous [`crate::status::CallError`] signals instead. Every
//! asynchronous failure eventually becomes a completion-queue event carrying a
//! [`crate::status::StatusCode`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls failure: {0}")]
    Tls(String),

    /// HTTP/2 protocol violation. `code` is the RFC 7540 error code that was
    /// (or would be) carried in the GOAWAY/RST_STREAM frame.
    #[error("http/2 protocol error (code {code}): {reason}")]
    Protocol { code: u32, reason: String },

    #[error("hpack coding error: {0}")]
    Hpack(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("failed to resolve target {0:?}")]
    Resolve(String),

    #[error("invalid target {0:?}")]
    InvalidTarget(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Tls(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
