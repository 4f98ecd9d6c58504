//! Protocol module - wire format, framing, and inbound message view.
//!
//! This module implements the transport framing of the API socket:
//! - 16-byte header encoding/decoding
//! - Frame reader that accumulates partial reads into whole bodies
//! - Frame writer that emits header + chunked body with a single flush
//! - Inbound message view with typed accessors

mod frame;
mod frame_reader;
mod frame_writer;
mod wire_format;

pub use frame::InboundMessage;
pub use frame_reader::FrameReader;
pub use frame_writer::FrameWriter;
pub use wire_format::{
    Header, MsgHeader, RequestHeader, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE,
    MSG_HEADER_SIZE, REQUEST_HEADER_OFFSET, REQUEST_HEADER_SIZE,
};
