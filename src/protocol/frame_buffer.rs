//! Frame buffer for accumulating partial reads.
//!
//! Turns a raw byte stream into discrete frames despite arbitrary read
//! boundaries. Implements a state machine over a `bytes::BytesMut`:
//! - `ScanningHeader`: searching for a window with both markers intact
//! - `ReadingBody`: header found, filling an exactly-sized body buffer
//!
//! Bytes that provably cannot start a header are discarded as scanning
//! advances, so the buffer resynchronizes after garbage or a mid-frame
//! connect. A header whose bytes are split across two reads is found on the
//! next push once the rest arrives.
//!
//! # Example
//!
//! ```
//! use wirecall::protocol::{build_frame, FrameBuffer, Header};
//!
//! let mut buffer = FrameBuffer::new();
//! let bytes = build_frame(&Header::request(1, 2), b"[]");
//!
//! let frames = buffer.push(&bytes).unwrap();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].correlation_id(), 1);
//! ```

use bytes::BytesMut;

use super::frame::Frame;
use super::wire_format::{scan_header, Header, ScanOutcome, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE};
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug)]
enum State {
    /// Scanning buffered bytes for a header with both markers intact.
    ScanningHeader,
    /// Header found; filling a body buffer sized to the declared length.
    ReadingBody { header: Header, body: BytesMut },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed body size.
    max_body_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default body size cap.
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY_SIZE)
    }

    /// Create a new frame buffer with a custom body size cap.
    pub fn with_max_body(max_body_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            state: State::ScanningHeader,
            max_body_size,
        }
    }

    /// Push newly read bytes and extract all complete frames.
    ///
    /// Returns the frames completed by this push, in stream order. Partial
    /// data stays buffered for the next push, so feeding the same byte
    /// stream in any chunking yields the same frame sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if a header declares a body larger than the cap.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match &mut self.state {
                State::ScanningHeader => {
                    if self.buffer.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    match scan_header(&self.buffer) {
                        ScanOutcome::Found { header, offset } => {
                            header.validate(self.max_body_size)?;
                            // Consume the garbage prefix and the header.
                            let _ = self.buffer.split_to(offset + HEADER_SIZE);
                            self.state = State::ReadingBody {
                                header,
                                body: BytesMut::with_capacity(header.body_len as usize),
                            };
                            // Loop to pull body bytes already buffered.
                        }
                        ScanOutcome::NotFound { discard } => {
                            let _ = self.buffer.split_to(discard);
                            return Ok(None);
                        }
                    }
                }

                State::ReadingBody { header, body } => {
                    let missing = header.body_len as usize - body.len();
                    if missing > 0 {
                        let take = missing.min(self.buffer.len());
                        body.extend_from_slice(&self.buffer.split_to(take));
                        if body.len() < header.body_len as usize {
                            return Ok(None);
                        }
                    }

                    let header = *header;
                    let body = std::mem::take(body).freeze();
                    self.state = State::ScanningHeader;
                    return Ok(Some(Frame::new(header, body)));
                }
            }
        }
    }

    /// Number of bytes buffered ahead of the current frame state.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::ScanningHeader;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
