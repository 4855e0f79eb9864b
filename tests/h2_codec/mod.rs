mod frame_building;
mod frame_parsing;
mod protocol_frames;
mod stream_state;
