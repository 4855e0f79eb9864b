//! RPC wire surface: length-prefixed message framing, `grpc-timeout`
//! coding and the standard request/response/trailer header sets.
//!
//! Each message travels as a 5-byte prefix (1-byte compression flag plus a
//! 4-byte big-endian length) followed by the possibly-compressed payload. A
//! message may span multiple DATA frames; reassembly happens against the
//! stream's receive buffer.

use std::time::Duration;

use crate::compress::Compression;
use crate::metadata::Metadata;
use crate::status::{Status, StatusCode};

/// Size of the per-message prefix.
pub const MESSAGE_PREFIX_LEN: usize = 5;

/// Frame one message for the wire.
pub fn encode_message(payload: &[u8], compressed: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(MESSAGE_PREFIX_LEN + payload.len());
    out.push(u8::from(compressed));
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Try to pop one complete message off the front of a reassembly buffer.
///
/// Returns `(compressed, payload, bytes_consumed)` when a full message is
/// present, `None` while more DATA is needed.
pub fn decode_message(buf: &[u8]) -> Option<(bool, Vec<u8>, usize)> {
    if buf.len() < MESSAGE_PREFIX_LEN {
        return None;
    }
    let compressed = buf[0] != 0;
    let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    let total = MESSAGE_PREFIX_LEN + len;
    if buf.len() < total {
        return None;
    }
    Some((compressed, buf[MESSAGE_PREFIX_LEN..total].to_vec(), total))
}

/// Render a deadline as a `grpc-timeout` header value, choosing the finest
/// unit whose value still fits in the 8-digit wire limit.
pub fn format_timeout(timeout: Duration) -> String {
    const WIRE_MAX: u128 = 99_999_999;
    let nanos = timeout.as_nanos();
    if nanos <= WIRE_MAX {
        return format!("{nanos}n");
    }
    let micros = timeout.as_micros();
    if micros <= WIRE_MAX {
        return format!("{micros}u");
    }
    let millis = timeout.as_millis();
    if millis <= WIRE_MAX {
        return format!("{millis}m");
    }
    let secs = u128::from(timeout.as_secs());
    if secs <= WIRE_MAX {
        return format!("{secs}S");
    }
    let minutes = secs / 60;
    if minutes <= WIRE_MAX {
        return format!("{minutes}M");
    }
    format!("{}H", (minutes / 60).min(WIRE_MAX))
}

/// Parse a `grpc-timeout` header value.
pub fn parse_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(amount.checked_mul(3600)?)),
        "M" => Some(Duration::from_secs(amount.checked_mul(60)?)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

/// Headers for a client request: pseudo-headers first, then the fixed RPC
/// headers, then user metadata.
pub fn request_headers(
    method: &str,
    authority: &str,
    secure: bool,
    timeout: Option<Duration>,
    encoding: Compression,
    user: &Metadata,
) -> Metadata {
    let mut headers = Metadata::new();
    headers.add(":method", "POST");
    headers.add(":scheme", if secure { "https" } else { "http" });
    headers.add(":path", method);
    headers.add(":authority", authority);
    headers.add("te", "trailers");
    headers.add("content-type", "application/grpc");
    if encoding != Compression::Identity {
        headers.add("grpc-encoding", encoding.name());
    }
    headers.add("grpc-accept-encoding", "identity,gzip,deflate");
    if let Some(timeout) = timeout {
        headers.add("grpc-timeout", format_timeout(timeout));
    }
    for entry in user {
        headers.add(&entry.key, entry.value.clone());
    }
    headers
}

/// Headers for a server response.
pub fn response_headers(encoding: Compression, user: &Metadata) -> Metadata {
    let mut headers = Metadata::new();
    headers.add(":status", "200");
    headers.add("content-type", "application/grpc");
    if encoding != Compression::Identity {
        headers.add("grpc-encoding", encoding.name());
    }
    for entry in user {
        headers.add(&entry.key, entry.value.clone());
    }
    headers
}

/// Trailing headers closing a response.
pub fn trailers(status: &Status, user: &Metadata) -> Metadata {
    let mut headers = Metadata::new();
    headers.add("grpc-status", status.code.as_wire().to_string());
    if let Some(detail) = &status.detail {
        headers.add("grpc-message", detail.as_str());
    }
    for entry in user {
        headers.add(&entry.key, entry.value.clone());
    }
    headers
}

/// Extract the RPC status from a trailing metadata block, if present.
pub fn status_from_trailers(trailing: &Metadata) -> Option<Status> {
    let code = trailing
        .get_str("grpc-status")
        .and_then(|v| v.parse::<i32>().ok())
        .map(StatusCode::from_wire)?;
    Some(Status {
        code,
        detail: trailing.get_str("grpc-message").map(str::to_string),
    })
}
