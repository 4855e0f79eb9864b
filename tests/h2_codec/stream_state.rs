//! Tests for the stream state machine

use h2_rpc::{Metadata, StreamState};
use h2_rpc::stream::Http2Stream;
use h2_rpc::{Deadline, StatusCode};

#[test]
fn test_idle_to_open_on_headers() {
    assert_eq!(StreamState::Idle.send_headers(false).unwrap(), StreamState::Open);
    assert_eq!(StreamState::Idle.recv_headers(false).unwrap(), StreamState::Open);
}

#[test]
fn test_idle_to_half_closed_on_end_stream_headers() {
    assert_eq!(
        StreamState::Idle.send_headers(true).unwrap(),
        StreamState::HalfClosedLocal
    );
    assert_eq!(
        StreamState::Idle.recv_headers(true).unwrap(),
        StreamState::HalfClosedRemote
    );
}

#[test]
fn test_open_half_closes_per_side() {
    assert_eq!(
        StreamState::Open.send_end_stream().unwrap(),
        StreamState::HalfClosedLocal
    );
    assert_eq!(
        StreamState::Open.recv_end_stream().unwrap(),
        StreamState::HalfClosedRemote
    );
}

#[test]
fn test_both_half_closes_reach_closed() {
    let state = StreamState::Open.send_end_stream().unwrap();
    assert_eq!(state.recv_end_stream().unwrap(), StreamState::Closed);
    let state = StreamState::Open.recv_end_stream().unwrap();
    assert_eq!(state.send_end_stream().unwrap(), StreamState::Closed);
}

#[test]
fn test_data_validity_per_state() {
    assert!(StreamState::Open.can_send_data());
    assert!(StreamState::Open.can_recv_data());
    assert!(StreamState::HalfClosedRemote.can_send_data());
    assert!(!StreamState::HalfClosedRemote.can_recv_data());
    assert!(StreamState::HalfClosedLocal.can_recv_data());
    assert!(!StreamState::HalfClosedLocal.can_send_data());
    assert!(!StreamState::Closed.can_send_data());
    assert!(!StreamState::Closed.can_recv_data());
    assert!(!StreamState::Idle.can_send_data());
}

#[test]
fn test_closed_rejects_further_transitions() {
    assert!(StreamState::Closed.send_headers(false).is_err());
    assert!(StreamState::Closed.send_end_stream().is_err());
    assert!(StreamState::Closed.recv_end_stream().is_err());
}

#[test]
fn test_stream_tracks_flags_through_lifecycle() {
    let stream = Http2Stream::new(1);
    assert_eq!(stream.state(), StreamState::Idle);
    assert!(!stream.headers_sent());

    stream.note_headers_sent(false).unwrap();
    assert!(stream.headers_sent());
    assert_eq!(stream.state(), StreamState::Open);

    stream.note_end_stream_sent().unwrap();
    assert!(stream.end_stream_sent());
    assert_eq!(stream.state(), StreamState::HalfClosedLocal);
}

#[test]
fn test_stream_delivers_first_headers_as_initial_metadata() {
    let stream = Http2Stream::new(1);
    stream.note_headers_sent(false).unwrap();

    let mut metadata = Metadata::new();
    metadata.add(":status", "200");
    stream.deliver_headers(metadata, false).unwrap();

    let initial = stream.wait_initial_metadata(Deadline::after_millis(100)).unwrap();
    assert_eq!(initial.get_str(":status"), Some("200"));
    assert_eq!(stream.state(), StreamState::Open);
}

#[test]
fn test_stream_delivers_grpc_status_block_as_trailers() {
    let stream = Http2Stream::new(1);
    stream.note_headers_sent(true).unwrap();

    let mut trailers = Metadata::new();
    trailers.add("grpc-status", "0");
    trailers.add("grpc-message", "done");
    stream.deliver_headers(trailers, true).unwrap();

    let (status, trailing) = stream.wait_status(Deadline::after_millis(100)).unwrap();
    assert_eq!(status.code, StatusCode::Ok);
    assert_eq!(status.detail.as_deref(), Some("done"));
    assert_eq!(trailing.get_str("grpc-status"), Some("0"));
    assert_eq!(stream.state(), StreamState::Closed);
}

#[test]
fn test_stream_reset_maps_cancel_code() {
    let stream = Http2Stream::new(1);
    stream.note_headers_sent(false).unwrap();
    stream.deliver_reset(h2_rpc::error_code::CANCEL);
    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(stream.status().unwrap().code, StatusCode::Cancelled);
}

#[test]
fn test_stream_stops_accepting_data_when_closed() {
    let stream = Http2Stream::new(1);
    stream.note_headers_sent(false).unwrap();
    stream.deliver_reset(h2_rpc::error_code::CANCEL);
    // Late DATA after closure is dropped silently, not an error.
    stream.deliver_data(b"late", false).unwrap();
    assert!(stream
        .wait_message(Deadline::after_millis(20))
        .is_err());
}
