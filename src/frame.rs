//! HTTP/2 frame codec (RFC 7540).
//!
//! A frame is a fixed 9-byte header followed by `length` payload bytes. This
//! module owns the header coding, the builders for every frame the runtime
//! emits, and an incremental [`FrameDecoder`] that turns a raw byte stream
//! (with optional leading connection preface) into complete frames.

use crate::error::{Error, Result};

/// HTTP/2 frame types (RFC 7540 Section 6)
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// HTTP/2 frame flags
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// HTTP/2 SETTINGS identifiers (RFC 7540 Section 6.5.2)
pub mod settings_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// HTTP/2 error codes (RFC 7540 Section 7)
pub mod error_code {
    pub const NO_ERROR: u32 = 0x0;
    pub const PROTOCOL_ERROR: u32 = 0x1;
    pub const INTERNAL_ERROR: u32 = 0x2;
    pub const FLOW_CONTROL_ERROR: u32 = 0x3;
    pub const SETTINGS_TIMEOUT: u32 = 0x4;
    pub const STREAM_CLOSED: u32 = 0x5;
    pub const FRAME_SIZE_ERROR: u32 = 0x6;
    pub const REFUSED_STREAM: u32 = 0x7;
    pub const CANCEL: u32 = 0x8;
    pub const COMPRESSION_ERROR: u32 = 0x9;
    pub const CONNECT_ERROR: u32 = 0xa;
    pub const ENHANCE_YOUR_CALM: u32 = 0xb;
    pub const INADEQUATE_SECURITY: u32 = 0xc;
    pub const HTTP_1_1_REQUIRED: u32 = 0xd;
}

/// Size of the fixed frame header.
pub const FRAME_HEADER_LEN: usize = 9;

/// The HTTP/2 connection preface (24 bytes), sent by clients before any frame.
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Largest frame payload a peer may send us before we tear the connection
/// down with FRAME_SIZE_ERROR. We advertise the RFC default max frame size
/// and never raise it.
pub const MAX_FRAME_SIZE: u32 = 16_384;

/// A parsed HTTP/2 frame header (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32, // 24 bits
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32, // 31 bits (high bit reserved)
}

impl FrameHeader {
    /// Parse a 9-byte frame header. The reserved stream-id bit is ignored.
    pub fn parse(data: &[u8]) -> Option<FrameHeader> {
        if data.len() < FRAME_HEADER_LEN {
            return None;
        }
        let length = (u32::from(data[0]) << 16) | (u32::from(data[1]) << 8) | u32::from(data[2]);
        let stream_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & 0x7FFF_FFFF;
        Some(FrameHeader {
            length,
            frame_type: data[3],
            flags: data[4],
            stream_id,
        })
    }

    /// Encode the 9-byte header. The reserved stream-id bit is cleared.
    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        out[0] = (self.length >> 16) as u8;
        out[1] = (self.length >> 8) as u8;
        out[2] = self.length as u8;
        out[3] = self.frame_type;
        out[4] = self.flags;
        out[5..9].copy_from_slice(&(self.stream_id & 0x7FFF_FFFF).to_be_bytes());
        out
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_LEN + self.length as usize
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags & flags::END_STREAM != 0
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags & flags::END_HEADERS != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }
}

fn build(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader {
        length: payload.len() as u32,
        frame_type,
        flags,
        stream_id,
    };
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(payload);
    frame
}

/// Build a DATA frame.
pub fn data_frame(stream_id: u32, payload: &[u8], end_stream: bool) -> Vec<u8> {
    let flags = if end_stream { flags::END_STREAM } else { 0 };
    build(frame_type::DATA, flags, stream_id, payload)
}

/// Build a HEADERS frame carrying (a fragment of) a header block.
pub fn headers_frame(stream_id: u32, fragment: &[u8], end_headers: bool, end_stream: bool) -> Vec<u8> {
    let mut flags_byte = 0;
    if end_headers {
        flags_byte |= flags::END_HEADERS;
    }
    if end_stream {
        flags_byte |= flags::END_STREAM;
    }
    build(frame_type::HEADERS, flags_byte, stream_id, fragment)
}

/// Build a CONTINUATION frame for a header block started by HEADERS.
pub fn continuation_frame(stream_id: u32, fragment: &[u8], end_headers: bool) -> Vec<u8> {
    let flags_byte = if end_headers { flags::END_HEADERS } else { 0 };
    build(frame_type::CONTINUATION, flags_byte, stream_id, fragment)
}

/// Build a RST_STREAM frame.
pub fn rst_stream_frame(stream_id: u32, code: u32) -> Vec<u8> {
    build(frame_type::RST_STREAM, 0, stream_id, &code.to_be_bytes())
}

/// Build a SETTINGS frame from (identifier, value) pairs.
pub fn settings_frame(settings: &[(u16, u32)]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(settings.len() * 6);
    for (id, value) in settings {
        payload.extend_from_slice(&id.to_be_bytes());
        payload.extend_from_slice(&value.to_be_bytes());
    }
    build(frame_type::SETTINGS, 0, 0, &payload)
}

/// Build a SETTINGS ACK frame.
pub fn settings_ack_frame() -> Vec<u8> {
    build(frame_type::SETTINGS, flags::ACK, 0, &[])
}

/// Build a PING frame with an 8-byte opaque payload.
pub fn ping_frame(data: [u8; 8], ack: bool) -> Vec<u8> {
    let flags_byte = if ack { flags::ACK } else { 0 };
    build(frame_type::PING, flags_byte, 0, &data)
}

/// Build a GOAWAY frame.
pub fn goaway_frame(last_stream_id: u32, code: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    payload.extend_from_slice(&(last_stream_id & 0x7FFF_FFFF).to_be_bytes());
    payload.extend_from_slice(&code.to_be_bytes());
    build(frame_type::GOAWAY, 0, 0, &payload)
}

/// Build a WINDOW_UPDATE frame. `stream_id` 0 targets the connection window.
pub fn window_update_frame(stream_id: u32, increment: u32) -> Vec<u8> {
    build(
        frame_type::WINDOW_UPDATE,
        0,
        stream_id,
        &(increment & 0x7FFF_FFFF).to_be_bytes(),
    )
}

/// Parse a SETTINGS payload into (identifier, value) pairs.
pub fn parse_settings(payload: &[u8]) -> Result<Vec<(u16, u32)>> {
    if payload.len() % 6 != 0 {
        return Err(Error::Protocol {
            code: error_code::FRAME_SIZE_ERROR,
            reason: format!("SETTINGS payload length {} is not a multiple of 6", payload.len()),
        });
    }
    Ok(payload
        .chunks_exact(6)
        .map(|chunk| {
            (
                u16::from_be_bytes([chunk[0], chunk[1]]),
                u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]),
            )
        })
        .collect())
}

/// Strip the PADDED layout from a DATA payload.
pub fn data_payload(header: &FrameHeader, mut payload: Vec<u8>) -> Result<Vec<u8>> {
    if header.flags & flags::PADDED == 0 {
        return Ok(payload);
    }
    if payload.is_empty() {
        return Err(protocol_error("PADDED DATA frame with no payload"));
    }
    let pad_length = payload[0] as usize;
    if pad_length >= payload.len() {
        return Err(protocol_error("invalid padding length in DATA frame"));
    }
    payload.truncate(payload.len() - pad_length);
    payload.remove(0);
    Ok(payload)
}

/// Strip PADDED and PRIORITY layouts from a HEADERS payload, leaving the
/// header block fragment.
pub fn headers_fragment(header: &FrameHeader, mut payload: Vec<u8>) -> Result<Vec<u8>> {
    let mut offset = 0;
    let mut end = payload.len();

    if header.flags & flags::PADDED != 0 {
        if payload.is_empty() {
            return Err(protocol_error("PADDED HEADERS frame with no payload"));
        }
        let pad_length = payload[0] as usize;
        offset = 1;
        if pad_length >= payload.len() - offset {
            return Err(protocol_error("invalid padding length in HEADERS frame"));
        }
        end = payload.len() - pad_length;
    }

    if header.flags & flags::PRIORITY != 0 {
        if payload.len() - offset < 5 {
            return Err(protocol_error("HEADERS priority fields truncated"));
        }
        offset += 5; // stream dependency (4) + weight (1)
    }

    if offset == 0 && end == payload.len() {
        return Ok(payload);
    }
    payload.truncate(end);
    payload.drain(..offset);
    Ok(payload)
}

fn protocol_error(reason: &str) -> Error {
    Error::Protocol {
        code: error_code::PROTOCOL_ERROR,
        reason: reason.to_string(),
    }
}

/// Incremental frame decoder.
///
/// Bytes arrive in arbitrary chunks from the transport; `feed` accumulates
/// them and `next_frame` yields complete frames. A server-side decoder first
/// consumes the 24-byte client preface; a mismatched preface fails the
/// connection.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    expect_preface: bool,
    preface_received: bool,
}

impl FrameDecoder {
    /// Decoder for a client-side connection (no preface expected from peer).
    pub fn new() -> FrameDecoder {
        FrameDecoder::default()
    }

    /// Decoder for a server-side connection: the peer must lead with the
    /// connection preface.
    pub fn expecting_preface() -> FrameDecoder {
        FrameDecoder {
            expect_preface: true,
            ..FrameDecoder::default()
        }
    }

    pub fn preface_received(&self) -> bool {
        !self.expect_preface || self.preface_received
    }

    /// Append raw bytes from the transport.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extract the next complete frame, if the buffer holds one.
    pub fn next_frame(&mut self) -> Result<Option<(FrameHeader, Vec<u8>)>> {
        if self.expect_preface && !self.preface_received {
            if self.buffer.len() < CONNECTION_PREFACE.len() {
                return Ok(None);
            }
            if &self.buffer[..CONNECTION_PREFACE.len()] != CONNECTION_PREFACE {
                return Err(protocol_error("invalid connection preface"));
            }
            self.buffer.drain(..CONNECTION_PREFACE.len());
            self.preface_received = true;
        }

        let header = match FrameHeader::parse(&self.buffer) {
            Some(header) => header,
            None => return Ok(None),
        };
        if header.length > MAX_FRAME_SIZE {
            return Err(Error::Protocol {
                code: error_code::FRAME_SIZE_ERROR,
                reason: format!("frame of {} bytes exceeds maximum {}", header.length, MAX_FRAME_SIZE),
            });
        }
        let total = header.total_size();
        if self.buffer.len() < total {
            return Ok(None);
        }

        // Split off the remainder so the frame bytes are not re-copied.
        let remainder = self.buffer.split_off(total);
        let mut frame = std::mem::replace(&mut self.buffer, remainder);
        frame.drain(..FRAME_HEADER_LEN);
        Ok(Some((header, frame)))
    }
}
