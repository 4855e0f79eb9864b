//! Tests for HTTP/2 frame building

use h2_rpc::frame::{
    self, error_code, flags, frame_type, settings_id,
};

#[test]
fn test_data_frame_layout() {
    let frame = frame::data_frame(3, b"hello", true);
    assert_eq!(frame.len(), 14);
    assert_eq!(&frame[0..3], &[0, 0, 5]);
    assert_eq!(frame[3], frame_type::DATA);
    assert_eq!(frame[4], flags::END_STREAM);
    assert_eq!(&frame[5..9], &[0, 0, 0, 3]);
    assert_eq!(&frame[9..], b"hello");
}

#[test]
fn test_headers_frame_flags() {
    let both = frame::headers_frame(1, &[0x00], true, true);
    assert_eq!(both[4], flags::END_HEADERS | flags::END_STREAM);
    let headers_only = frame::headers_frame(1, &[0x00], true, false);
    assert_eq!(headers_only[4], flags::END_HEADERS);
}

#[test]
fn test_continuation_frame_flags() {
    let payload = b"header-data";
    let closing = frame::continuation_frame(1, payload, true);
    let open = frame::continuation_frame(1, payload, false);
    assert_eq!(closing.len(), 9 + payload.len());
    assert_eq!(closing[3], frame_type::CONTINUATION);
    assert_eq!(closing[4], flags::END_HEADERS);
    assert_eq!(open[4], 0);
}

#[test]
fn test_rst_stream_frame_layout() {
    let frame = frame::rst_stream_frame(1, error_code::CANCEL);
    assert_eq!(frame.len(), 13);
    assert_eq!(&frame[0..3], &[0, 0, 4]);
    assert_eq!(frame[3], frame_type::RST_STREAM);
    assert_eq!(&frame[9..], &[0, 0, 0, 8]);
}

#[test]
fn test_settings_frame_layout() {
    let frame = frame::settings_frame(&[(settings_id::INITIAL_WINDOW_SIZE, 1_048_576)]);
    assert_eq!(frame.len(), 15);
    assert_eq!(frame[3], frame_type::SETTINGS);
    assert_eq!(&frame[9..11], &[0, 4]);
    assert_eq!(&frame[11..15], &1_048_576u32.to_be_bytes());
}

#[test]
fn test_settings_ack_frame_layout() {
    let frame = frame::settings_ack_frame();
    assert_eq!(frame.len(), 9);
    assert_eq!(&frame[0..3], &[0, 0, 0]);
    assert_eq!(frame[3], frame_type::SETTINGS);
    assert_eq!(frame[4], flags::ACK);
}

#[test]
fn test_ping_frame_layout() {
    let data = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
    let frame = frame::ping_frame(data, true);
    assert_eq!(frame.len(), 17);
    assert_eq!(frame[3], frame_type::PING);
    assert_eq!(frame[4], flags::ACK);
    assert_eq!(&frame[9..], &data);
}

#[test]
fn test_goaway_frame_layout() {
    let frame = frame::goaway_frame(5, error_code::NO_ERROR);
    assert_eq!(frame.len(), 17);
    assert_eq!(frame[3], frame_type::GOAWAY);
    assert_eq!(&frame[9..13], &[0, 0, 0, 5]);
    assert_eq!(&frame[13..17], &[0, 0, 0, 0]);
}

#[test]
fn test_window_update_frame_layout() {
    let frame = frame::window_update_frame(7, 32_768);
    assert_eq!(frame.len(), 13);
    assert_eq!(frame[3], frame_type::WINDOW_UPDATE);
    assert_eq!(&frame[5..9], &[0, 0, 0, 7]);
    assert_eq!(&frame[9..], &32_768u32.to_be_bytes());
}

#[test]
fn test_window_update_clears_reserved_bit() {
    let frame = frame::window_update_frame(0, 0x8000_0001);
    assert_eq!(&frame[9..], &[0, 0, 0, 1]);
}

#[test]
fn test_empty_continuation_frame() {
    let frame = frame::continuation_frame(1, &[], true);
    assert_eq!(frame.len(), 9);
    assert_eq!(frame[2], 0);
}
