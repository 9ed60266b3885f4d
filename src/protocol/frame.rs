//! Frame and body envelope types.
//!
//! A frame is one header + body unit on the wire. The body is a
//! codec-encoded [`Envelope`] naming the service and method; the envelope's
//! payload is itself codec-encoded and opaque to the framing layer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Body bytes (zero-copy via `bytes::Bytes`).
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from header and body.
    pub fn new(header: Header, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Get the correlation id.
    #[inline]
    pub fn correlation_id(&self) -> u32 {
        self.header.correlation_id
    }

    /// Get the status byte.
    #[inline]
    pub fn status(&self) -> u8 {
        self.header.status
    }

    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Body envelope shared by requests and responses.
///
/// On a response the payload is either the encoded return value (status 0)
/// or a human-readable error message (status != 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Service name.
    pub service: String,
    /// Method name.
    pub method: String,
    /// Codec-encoded payload, opaque at this layer.
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create a new envelope.
    pub fn new(service: impl Into<String>, method: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            payload,
        }
    }
}

/// Build a complete frame as a single byte vector (header + body).
pub fn build_frame(header: &Header, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(body);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{JsonCodec, PayloadCodec};

    #[test]
    fn test_frame_accessors() {
        let header = Header::request(42, 5);
        let frame = Frame::new(header, Bytes::from_static(b"hello"));

        assert_eq!(frame.correlation_id(), 42);
        assert_eq!(frame.status(), 0);
        assert_eq!(frame.body(), b"hello");
    }

    #[test]
    fn test_build_frame() {
        let header = Header::request(42, 5);
        let bytes = build_frame(&header, b"hello");

        assert_eq!(bytes.len(), HEADER_SIZE + 5);
        let parsed = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_build_frame_empty_body() {
        let header = Header::request(1, 0);
        let bytes = build_frame(&header, b"");
        assert_eq!(bytes.len(), HEADER_SIZE);
    }

    #[test]
    fn test_envelope_codec_roundtrip() {
        let payload = JsonCodec::encode(&3i32).unwrap();
        let envelope = Envelope::new("ITestService", "Add", payload);

        let encoded = JsonCodec::encode(&envelope).unwrap();
        let decoded: Envelope = JsonCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, envelope);
        let value: i32 = JsonCodec::decode(&decoded.payload).unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn test_envelope_empty_payload() {
        let envelope = Envelope::new("svc", "method", Vec::new());
        let encoded = JsonCodec::encode(&envelope).unwrap();
        let decoded: Envelope = JsonCodec::decode(&encoded).unwrap();
        assert!(decoded.payload.is_empty());
    }
}
