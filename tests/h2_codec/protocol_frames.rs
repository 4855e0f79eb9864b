//! Tests for protocol frame payload parsing (SETTINGS, padding strip)

use h2_rpc::frame::{self, flags, frame_type, FrameHeader};

#[test]
fn test_parse_settings_entries() {
    let payload = [
        0x00, 0x04, 0x00, 0x01, 0x00, 0x00, // INITIAL_WINDOW_SIZE = 65536
        0x00, 0x03, 0x00, 0x00, 0x00, 0x64, // MAX_CONCURRENT_STREAMS = 100
    ];
    let entries = frame::parse_settings(&payload).unwrap();
    assert_eq!(
        entries,
        vec![
            (frame::settings_id::INITIAL_WINDOW_SIZE, 65_536),
            (frame::settings_id::MAX_CONCURRENT_STREAMS, 100),
        ]
    );
}

#[test]
fn test_parse_settings_empty_payload() {
    assert!(frame::parse_settings(&[]).unwrap().is_empty());
}

#[test]
fn test_parse_settings_rejects_ragged_payload() {
    assert!(frame::parse_settings(&[0, 4, 0]).is_err());
}

fn data_header(flags: u8, length: u32) -> FrameHeader {
    FrameHeader {
        length,
        frame_type: frame_type::DATA,
        flags,
        stream_id: 1,
    }
}

#[test]
fn test_data_payload_without_padding_is_untouched() {
    let header = data_header(0, 5);
    let payload = frame::data_payload(&header, b"hello".to_vec()).unwrap();
    assert_eq!(payload, b"hello");
}

#[test]
fn test_data_payload_strips_padding() {
    let header = data_header(flags::PADDED, 9);
    let mut raw = vec![3]; // pad length
    raw.extend_from_slice(b"hello");
    raw.extend_from_slice(&[0, 0, 0]);
    let payload = frame::data_payload(&header, raw).unwrap();
    assert_eq!(payload, b"hello");
}

#[test]
fn test_data_payload_rejects_bad_padding() {
    let header = data_header(flags::PADDED, 6);
    let mut raw = vec![10]; // pad length exceeds remaining payload
    raw.extend_from_slice(b"hello");
    assert!(frame::data_payload(&header, raw).is_err());
}

#[test]
fn test_headers_fragment_strips_priority_fields() {
    let header = FrameHeader {
        length: 7,
        frame_type: frame_type::HEADERS,
        flags: flags::PRIORITY,
        stream_id: 1,
    };
    let mut raw = vec![0, 0, 0, 0, 255]; // dependency + weight
    raw.extend_from_slice(&[0x82, 0x86]);
    let fragment = frame::headers_fragment(&header, raw).unwrap();
    assert_eq!(fragment, vec![0x82, 0x86]);
}

#[test]
fn test_headers_fragment_strips_padding_and_priority() {
    let header = FrameHeader {
        length: 10,
        frame_type: frame_type::HEADERS,
        flags: flags::PRIORITY | flags::PADDED,
        stream_id: 1,
    };
    let mut raw = vec![2]; // pad length
    raw.extend_from_slice(&[0, 0, 0, 0, 255]);
    raw.extend_from_slice(&[0x82, 0x86]);
    raw.extend_from_slice(&[0, 0]);
    let fragment = frame::headers_fragment(&header, raw).unwrap();
    assert_eq!(fragment, vec![0x82, 0x86]);
}
