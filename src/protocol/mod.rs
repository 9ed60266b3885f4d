//! Protocol module - wire format, framing, and frame reassembly.
//!
//! This module implements the binary protocol:
//! - 16-byte header with start/end markers and marker-scanning recovery
//! - Frame buffer for reassembling frames from partial reads
//! - Frame and body envelope types

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Envelope, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    scan_header, Header, ScanOutcome, StatusCode, DEFAULT_MAX_BODY_SIZE, END_MARK, HEADER_SIZE,
    START_MARK,
};
