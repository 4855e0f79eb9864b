//! Per-message payload compression.
//!
//! Algorithms are negotiated out-of-band via `grpc-encoding` metadata:
//! `identity` is a plain copy, `gzip` uses RFC 1952 framing and `deflate`
//! uses raw RFC 1951 framing. Decompression output grows by doubling and is
//! bounded to keep a hostile peer from expanding a tiny message into an
//! enormous allocation.

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};

use crate::error::{Error, Result};

/// Default cap on a single decompressed message.
pub const DEFAULT_MAX_DECOMPRESSED_LEN: usize = 64 * 1024 * 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Identity,
    Gzip,
    Deflate,
}

impl Compression {
    /// Parse a `grpc-encoding` token.
    pub fn from_name(name: &str) -> Option<Compression> {
        match name {
            "identity" => Some(Compression::Identity),
            "gzip" => Some(Compression::Gzip),
            "deflate" => Some(Compression::Deflate),
            _ => None,
        }
    }

    /// The `grpc-encoding` token for this algorithm.
    pub fn name(self) -> &'static str {
        match self {
            Compression::Identity => "identity",
            Compression::Gzip => "gzip",
            Compression::Deflate => "deflate",
        }
    }
}

/// Compress `input` with the given algorithm, running the encoder to
/// end-of-stream.
pub fn compress(input: &[u8], algorithm: Compression) -> Result<Vec<u8>> {
    match algorithm {
        Compression::Identity => Ok(input.to_vec()),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder
                .write_all(input)
                .and_then(|_| encoder.finish())
                .map_err(|e| Error::Compression(format!("gzip encode: {e}")))
        }
        Compression::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
            encoder
                .write_all(input)
                .and_then(|_| encoder.finish())
                .map_err(|e| Error::Compression(format!("deflate encode: {e}")))
        }
    }
}

/// Decompress `input`, bounding the output at `max_len` bytes.
pub fn decompress(input: &[u8], algorithm: Compression, max_len: usize) -> Result<Vec<u8>> {
    match algorithm {
        Compression::Identity => Ok(input.to_vec()),
        Compression::Gzip => read_bounded(GzDecoder::new(input), input.len(), max_len, "gzip"),
        Compression::Deflate => {
            read_bounded(DeflateDecoder::new(input), input.len(), max_len, "deflate")
        }
    }
}

/// Drain a decoder into a buffer that starts at 4x the compressed size and
/// doubles whenever it runs out of space, up to `max_len`.
fn read_bounded<R: Read>(mut decoder: R, input_len: usize, max_len: usize, what: &str) -> Result<Vec<u8>> {
    let initial = (input_len.saturating_mul(4)).clamp(64, max_len.max(64));
    let mut buf = vec![0u8; initial];
    let mut filled = 0;
    loop {
        if filled == buf.len() {
            if buf.len() >= max_len {
                return Err(Error::Compression(format!(
                    "{what} output exceeds {max_len} byte limit"
                )));
            }
            let grown = (buf.len() * 2).min(max_len);
            buf.resize(grown, 0);
        }
        match decoder.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) => return Err(Error::Compression(format!("{what} decode: {e}"))),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}
