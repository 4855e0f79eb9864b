//! HPACK: Header Compression for HTTP/2 (RFC 7541)
//!
//! Integer and literal header coding used for every HEADERS/CONTINUATION
//! block. The encoder emits *literal without indexing* representations only
//! (`0x00` prefix byte); the decoder additionally understands indexed and
//! literal-with-indexing representations against the static table so that
//! peers using static-table shortcuts still parse. No dynamic table and no
//! Huffman coding.

use crate::error::{Error, Result};
use crate::metadata::Metadata;

/// Decoding rejects continuation sequences whose shift exponent would exceed
/// this, guarding 32-bit values against overflow.
const MAX_INTEGER_SHIFT: u32 = 28;

/// RFC 7541 Appendix A static table. Present for decoding completeness; the
/// encoder does not consult it.
pub const STATIC_TABLE: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

fn static_entry(index: u32) -> Result<(&'static str, &'static str)> {
    if index == 0 || index as usize > STATIC_TABLE.len() {
        return Err(Error::Hpack(format!("invalid table index {index}")));
    }
    Ok(STATIC_TABLE[index as usize - 1])
}

/// Encode `value` with an N-bit prefix (1..=7) per RFC 7541 §5.1. The prefix
/// byte is emitted with its high `8 - prefix_bits` bits zero; callers OR in
/// their representation bits afterwards if needed.
pub fn encode_integer(value: u32, prefix_bits: u8, out: &mut Vec<u8>) {
    debug_assert!((1..=7).contains(&prefix_bits));
    let max_prefix = (1u32 << prefix_bits) - 1;
    if value < max_prefix {
        out.push(value as u8);
        return;
    }
    out.push(max_prefix as u8);
    let mut rest = value - max_prefix;
    while rest >= 128 {
        out.push((rest & 0x7F) as u8 | 0x80);
        rest >>= 7;
    }
    out.push(rest as u8);
}

/// Decode an N-bit-prefix integer. Returns the value and the number of bytes
/// consumed. Fails on truncated input and on continuation sequences that
/// would overflow 32 bits.
pub fn decode_integer(input: &[u8], prefix_bits: u8) -> Result<(u32, usize)> {
    debug_assert!((1..=7).contains(&prefix_bits));
    if input.is_empty() {
        return Err(Error::Hpack("truncated integer".into()));
    }
    let max_prefix = (1u32 << prefix_bits) - 1;
    let mut value = u32::from(input[0]) & max_prefix;
    if value < max_prefix {
        return Ok((value, 1));
    }

    let mut shift = 0u32;
    let mut pos = 1usize;
    loop {
        let byte = *input
            .get(pos)
            .ok_or_else(|| Error::Hpack("truncated integer".into()))?;
        pos += 1;
        let chunk = u32::from(byte & 0x7F);
        value = chunk
            .checked_shl(shift)
            .and_then(|v| value.checked_add(v))
            .ok_or_else(|| Error::Hpack("integer overflow".into()))?;
        if byte & 0x80 == 0 {
            return Ok((value, pos));
        }
        shift += 7;
        if shift > MAX_INTEGER_SHIFT {
            return Err(Error::Hpack("integer overflow".into()));
        }
    }
}

/// Emit one header as *literal without indexing* (`0x00` prefix, 7-bit length
/// prefixes, no Huffman).
pub fn encode_literal(name: &str, value: &[u8], out: &mut Vec<u8>) {
    out.push(0x00);
    encode_integer(name.len() as u32, 7, out);
    out.extend_from_slice(name.as_bytes());
    encode_integer(value.len() as u32, 7, out);
    out.extend_from_slice(value);
}

fn decode_string(input: &[u8]) -> Result<(Vec<u8>, usize)> {
    let first = *input
        .first()
        .ok_or_else(|| Error::Hpack("truncated string".into()))?;
    if first & 0x80 != 0 {
        return Err(Error::Hpack("huffman-coded strings are not supported".into()));
    }
    let (len, consumed) = decode_integer(input, 7)?;
    let end = consumed
        .checked_add(len as usize)
        .ok_or_else(|| Error::Hpack("string length overflow".into()))?;
    if end > input.len() {
        return Err(Error::Hpack("truncated string".into()));
    }
    Ok((input[consumed..end].to_vec(), end))
}

/// Decode one header field representation. Returns the owned `(name, value)`
/// pair and the number of bytes consumed.
pub fn decode_header(input: &[u8]) -> Result<((String, Vec<u8>), usize)> {
    let first = *input
        .first()
        .ok_or_else(|| Error::Hpack("empty header block fragment".into()))?;

    // Indexed header field (RFC 7541 §6.1).
    if first & 0x80 != 0 {
        let (index, consumed) = decode_integer(input, 7)?;
        let (name, value) = static_entry(index)?;
        return Ok(((name.to_string(), value.as_bytes().to_vec()), consumed));
    }

    // Literal representations: with incremental indexing (§6.2.1, prefix 6),
    // without indexing (§6.2.2, prefix 4), never indexed (§6.2.3, prefix 4).
    // A dynamic-table size update (§6.3, 0x20) is invalid here: this codec
    // never negotiates a dynamic table.
    let name_prefix_bits = if first & 0x40 != 0 {
        6
    } else if first & 0x20 != 0 {
        return Err(Error::Hpack("unexpected dynamic table size update".into()));
    } else {
        4
    };

    let (name_index, mut pos) = decode_integer(input, name_prefix_bits)?;
    let name = if name_index == 0 {
        let (raw, consumed) = decode_string(&input[pos..])?;
        pos += consumed;
        String::from_utf8(raw).map_err(|_| Error::Hpack("header name is not utf-8".into()))?
    } else {
        static_entry(name_index)?.0.to_string()
    };

    let (value, consumed) = decode_string(&input[pos..])?;
    pos += consumed;
    Ok(((name, value), pos))
}

/// Encode a metadata array into a header block. Entry order is preserved;
/// `-bin` values are base64-coded by the metadata layer before reaching the
/// wire.
pub fn encode_block(metadata: &Metadata) -> Vec<u8> {
    let mut out = Vec::with_capacity(metadata.len() * 32);
    for entry in metadata {
        encode_literal(&entry.key, &Metadata::wire_value(entry), &mut out);
    }
    out
}

/// Decode a complete header block into a metadata array, or fail the frame.
pub fn decode_block(block: &[u8]) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    let mut pos = 0;
    while pos < block.len() {
        let ((name, value), consumed) = decode_header(&block[pos..])?;
        metadata.add_from_wire(&name, &value);
        pos += consumed;
    }
    Ok(metadata)
}
