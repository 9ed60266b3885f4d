//! Wire format encoding, decoding, and header scanning.
//!
//! Implements the 16-byte header format:
//! ```text
//! ┌───────────┬────────────┬───────────┬──────┬────────┬───────────┐
//! │ Start mark│ Corr. id   │ Body len  │ Type │ Status │ End mark  │
//! │ 4 bytes   │ 4 bytes    │ 4 bytes   │ 1 B  │ 1 B    │ 2 bytes   │
//! │ u32 LE    │ u32 LE     │ u32 LE    │      │        │ u16 LE    │
//! └───────────┴────────────┴───────────┴──────┴────────┴───────────┘
//! ```
//!
//! All multi-byte integers are Little Endian. A byte region is a valid
//! header iff both markers match at their fixed offsets; this redundancy is
//! the resynchronization anchor when a read starts mid-frame or the stream
//! carries garbage.

use crate::error::{Result, WirecallError};

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Start-of-header marker at offset 0.
pub const START_MARK: u32 = 0x5F5F_5F5F;

/// End-of-header marker at offset 14.
pub const END_MARK: u16 = 0xF5F5;

/// Default maximum body size (16 MB).
pub const DEFAULT_MAX_BODY_SIZE: u32 = 16 * 1024 * 1024;

/// Status codes carried in the header's status byte.
///
/// Request frames always carry [`StatusCode::Success`]; the server assigns
/// the code on responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0,
    UnknownServiceOrMethod = 1,
    SerializationError = 2,
    ServiceFault = 3,
    Timeout = 4,
    DuplicateCorrelationId = 5,
    SendFailure = 6,
}

impl StatusCode {
    /// The wire representation of this status.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a status byte. Returns `None` for values no code is defined for.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            1 => Some(Self::UnknownServiceOrMethod),
            2 => Some(Self::SerializationError),
            3 => Some(Self::ServiceFault),
            4 => Some(Self::Timeout),
            5 => Some(Self::DuplicateCorrelationId),
            6 => Some(Self::SendFailure),
            _ => None,
        }
    }
}

/// Decoded header from wire format. Markers are implicit: they are checked
/// on decode and written on encode, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Correlation id linking a request frame to its response frame.
    pub correlation_id: u32,
    /// Body length in bytes.
    pub body_len: u32,
    /// Frame type (reserved, always 0).
    pub frame_type: u8,
    /// Response status code (0 = success; requests always 0).
    pub status: u8,
}

impl Header {
    /// Create a request header: frame type 0, status 0.
    pub fn request(correlation_id: u32, body_len: u32) -> Self {
        Self {
            correlation_id,
            body_len,
            frame_type: 0,
            status: 0,
        }
    }

    /// Create a response header echoing the request's frame type.
    pub fn response(correlation_id: u32, body_len: u32, frame_type: u8, status: StatusCode) -> Self {
        Self {
            correlation_id,
            body_len,
            frame_type,
            status: status.as_u8(),
        }
    }

    /// Encode header to bytes (Little Endian), markers included.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (16 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&START_MARK.to_le_bytes());
        buf[4..8].copy_from_slice(&self.correlation_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.body_len.to_le_bytes());
        buf[12] = self.frame_type;
        buf[13] = self.status;
        buf[14..16].copy_from_slice(&END_MARK.to_le_bytes());
    }

    /// Decode a header from the start of `buf`.
    ///
    /// Returns `None` if the buffer is too short or either marker mismatches.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        if !marks_match(buf) {
            return None;
        }
        Some(Self {
            correlation_id: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            body_len: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            frame_type: buf[12],
            status: buf[13],
        })
    }

    /// Validate the declared body length against a cap, before allocating.
    pub fn validate(&self, max_body_size: u32) -> Result<()> {
        if self.body_len > max_body_size {
            return Err(WirecallError::Protocol(format!(
                "body size {} exceeds maximum {}",
                self.body_len, max_body_size
            )));
        }
        Ok(())
    }
}

#[inline]
fn marks_match(window: &[u8]) -> bool {
    u32::from_le_bytes([window[0], window[1], window[2], window[3]]) == START_MARK
        && u16::from_le_bytes([window[14], window[15]]) == END_MARK
}

/// Outcome of scanning a buffer for a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A header with both markers intact starts at `offset`.
    Found { header: Header, offset: usize },
    /// No header found. The first `discard` bytes provably cannot start a
    /// header; the remaining tail might once more bytes arrive.
    NotFound { discard: usize },
}

/// Scan `buf` byte-by-byte for the first window whose start and end markers
/// both match at their fixed offsets.
///
/// A spurious start-marker match whose end marker fails resumes scanning at
/// the very next byte, never a full header width, so a genuine header
/// overlapping the false match is still found.
pub fn scan_header(buf: &[u8]) -> ScanOutcome {
    if buf.len() < HEADER_SIZE {
        return ScanOutcome::NotFound { discard: 0 };
    }

    for offset in 0..=buf.len() - HEADER_SIZE {
        let window = &buf[offset..offset + HEADER_SIZE];
        if let Some(header) = Header::decode(window) {
            return ScanOutcome::Found { header, offset };
        }
    }

    // Every position with a full header's worth of bytes failed the marker
    // check; only the trailing HEADER_SIZE - 1 bytes could still start a
    // header once more data arrives.
    ScanOutcome::NotFound {
        discard: buf.len() - HEADER_SIZE + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::request(42, 100);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_little_endian_byte_order() {
        let header = Header {
            correlation_id: 0x0403_0201,
            body_len: 0x0807_0605,
            frame_type: 0x0A,
            status: 0x0B,
        };
        let bytes = header.encode();

        // Start marker
        assert_eq!(&bytes[0..4], &[0x5F, 0x5F, 0x5F, 0x5F]);

        // Correlation id in LE
        assert_eq!(&bytes[4..8], &[0x01, 0x02, 0x03, 0x04]);

        // Body length in LE
        assert_eq!(&bytes[8..12], &[0x05, 0x06, 0x07, 0x08]);

        assert_eq!(bytes[12], 0x0A);
        assert_eq!(bytes[13], 0x0B);

        // End marker in LE
        assert_eq!(&bytes[14..16], &[0xF5, 0xF5]);
    }

    #[test]
    fn test_header_size_is_exactly_16() {
        assert_eq!(HEADER_SIZE, 16);
        assert_eq!(Header::request(1, 0).encode().len(), 16);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 15]; // One byte short
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_decode_rejects_bad_start_marker() {
        let mut bytes = Header::request(1, 0).encode();
        bytes[0] = 0x00;
        assert!(Header::decode(&bytes).is_none());
    }

    #[test]
    fn test_decode_rejects_bad_end_marker() {
        let mut bytes = Header::request(1, 0).encode();
        bytes[15] = 0x00;
        assert!(Header::decode(&bytes).is_none());
    }

    #[test]
    fn test_validate_body_too_large() {
        let header = Header::request(1, 1_000_000);
        let result = header.validate(100);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_response_header_echoes_frame_type() {
        let header = Header::response(7, 0, 3, StatusCode::ServiceFault);
        assert_eq!(header.frame_type, 3);
        assert_eq!(header.status, StatusCode::ServiceFault.as_u8());
    }

    #[test]
    fn test_scan_finds_header_at_offset_zero() {
        let bytes = Header::request(9, 5).encode();
        match scan_header(&bytes) {
            ScanOutcome::Found { header, offset } => {
                assert_eq!(offset, 0);
                assert_eq!(header.correlation_id, 9);
                assert_eq!(header.body_len, 5);
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_finds_header_after_garbage() {
        let mut bytes = vec![0xAA, 0xBB, 0xCC];
        bytes.extend_from_slice(&Header::request(9, 0).encode());
        match scan_header(&bytes) {
            ScanOutcome::Found { offset, .. } => assert_eq!(offset, 3),
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_skips_spurious_start_marker() {
        // A start-marker match with a bad end marker, immediately followed by
        // a genuine header; the scan must continue at the next byte.
        let mut bytes = START_MARK.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 12]); // fills offsets 4..16, no end marker
        bytes.extend_from_slice(&Header::request(3, 7).encode());

        match scan_header(&bytes) {
            ScanOutcome::Found { header, offset } => {
                assert_eq!(offset, 16);
                assert_eq!(header.correlation_id, 3);
                assert_eq!(header.body_len, 7);
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_not_found_reports_discardable_prefix() {
        let bytes = [0xAAu8; 40];
        match scan_header(&bytes) {
            ScanOutcome::NotFound { discard } => {
                // Last 15 bytes could still be the start of a header.
                assert_eq!(discard, 40 - HEADER_SIZE + 1);
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_short_buffer_discards_nothing() {
        let bytes = [0xAAu8; 10];
        assert_eq!(scan_header(&bytes), ScanOutcome::NotFound { discard: 0 });
    }

    #[test]
    fn test_scan_keeps_partial_header_at_tail() {
        // Garbage followed by the first half of a real header: the partial
        // header must survive the discard count.
        let header_bytes = Header::request(5, 1).encode();
        let mut bytes = vec![0x11u8; 20];
        bytes.extend_from_slice(&header_bytes[..8]);

        match scan_header(&bytes) {
            ScanOutcome::NotFound { discard } => {
                let kept = &bytes[discard..];
                assert!(kept.len() >= 8);
                assert_eq!(&kept[kept.len() - 8..], &header_bytes[..8]);
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_status_code_roundtrip() {
        for code in [
            StatusCode::Success,
            StatusCode::UnknownServiceOrMethod,
            StatusCode::SerializationError,
            StatusCode::ServiceFault,
            StatusCode::Timeout,
            StatusCode::DuplicateCorrelationId,
            StatusCode::SendFailure,
        ] {
            assert_eq!(StatusCode::from_u8(code.as_u8()), Some(code));
        }
        assert_eq!(StatusCode::from_u8(200), None);
    }
}
