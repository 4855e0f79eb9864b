//! Tests for frame header coding and the incremental frame decoder

use h2_rpc::frame::{flags, frame_type, FrameDecoder, FrameHeader, CONNECTION_PREFACE};

#[test]
fn test_frame_header_roundtrip() {
    for (length, ftype, fflags, stream_id) in [
        (0u32, frame_type::SETTINGS, 0u8, 0u32),
        (5, frame_type::DATA, flags::END_STREAM, 1),
        (0xFF_FFFF, frame_type::HEADERS, 0xFF, 0x7FFF_FFFF),
        (1234, frame_type::WINDOW_UPDATE, 0, 42),
    ] {
        let header = FrameHeader {
            length,
            frame_type: ftype,
            flags: fflags,
            stream_id,
        };
        let parsed = FrameHeader::parse(&header.encode()).unwrap();
        assert_eq!(parsed, header);
    }
}

#[test]
fn test_reserved_bit_cleared_on_emit_and_ignored_on_parse() {
    let header = FrameHeader {
        length: 0,
        frame_type: frame_type::PING,
        flags: 0,
        stream_id: 0x8000_0001, // reserved bit set
    };
    let bytes = header.encode();
    assert_eq!(bytes[5] & 0x80, 0);

    let mut raw = bytes;
    raw[5] |= 0x80;
    let parsed = FrameHeader::parse(&raw).unwrap();
    assert_eq!(parsed.stream_id, 1);
}

#[test]
fn test_parse_needs_nine_bytes() {
    assert!(FrameHeader::parse(&[0; 8]).is_none());
    assert!(FrameHeader::parse(&[0; 9]).is_some());
}

#[test]
fn test_decoder_assembles_partial_frames() {
    let mut decoder = FrameDecoder::new();
    let mut frame = vec![0, 0, 5, frame_type::DATA, 0, 0, 0, 0, 1];
    frame.extend_from_slice(b"hello");

    decoder.feed(&frame[..3]);
    assert!(decoder.next_frame().unwrap().is_none());
    decoder.feed(&frame[3..10]);
    assert!(decoder.next_frame().unwrap().is_none());
    decoder.feed(&frame[10..]);

    let (header, payload) = decoder.next_frame().unwrap().unwrap();
    assert_eq!(header.frame_type, frame_type::DATA);
    assert_eq!(header.stream_id, 1);
    assert_eq!(payload, b"hello");
}

#[test]
fn test_decoder_yields_back_to_back_frames() {
    let mut decoder = FrameDecoder::new();
    let mut bytes = vec![0, 0, 1, frame_type::DATA, 0, 0, 0, 0, 1, b'a'];
    bytes.extend_from_slice(&[0, 0, 1, frame_type::DATA, flags::END_STREAM, 0, 0, 0, 1, b'b']);
    decoder.feed(&bytes);

    let (first, payload) = decoder.next_frame().unwrap().unwrap();
    assert!(!first.is_end_stream());
    assert_eq!(payload, b"a");
    let (second, payload) = decoder.next_frame().unwrap().unwrap();
    assert!(second.is_end_stream());
    assert_eq!(payload, b"b");
    assert!(decoder.next_frame().unwrap().is_none());
}

#[test]
fn test_decoder_consumes_preface_when_expected() {
    let mut decoder = FrameDecoder::expecting_preface();
    assert!(!decoder.preface_received());

    let mut bytes = CONNECTION_PREFACE.to_vec();
    bytes.extend_from_slice(&[0, 0, 0, frame_type::SETTINGS, 0, 0, 0, 0, 0]);
    decoder.feed(&bytes);

    let (header, _) = decoder.next_frame().unwrap().unwrap();
    assert_eq!(header.frame_type, frame_type::SETTINGS);
    assert!(decoder.preface_received());
}

#[test]
fn test_decoder_rejects_bad_preface() {
    let mut decoder = FrameDecoder::expecting_preface();
    decoder.feed(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(decoder.next_frame().is_err());
}

#[test]
fn test_decoder_rejects_oversized_frame() {
    let mut decoder = FrameDecoder::new();
    // 17 KB DATA frame exceeds the advertised max frame size.
    decoder.feed(&[0, 0x44, 0, frame_type::DATA, 0, 0, 0, 0, 1]);
    assert!(decoder.next_frame().is_err());
}
