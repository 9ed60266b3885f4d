//! Codec module - pluggable payload serialization.
//!
//! The framing layer treats encoded payloads as opaque bytes; the codec
//! decides how method parameters and return values map to those bytes.
//! [`JsonCodec`] is the provided default. A codec is a marker type with
//! associated functions rather than a trait object, so codec selection is
//! a compile-time decision on [`Client`](crate::Client) and
//! [`ServerBuilder`](crate::ServerBuilder).
//!
//! # Example
//!
//! ```
//! use wirecall::codec::{JsonCodec, PayloadCodec};
//!
//! let encoded = JsonCodec::encode(&42i32).unwrap();
//! let decoded: i32 = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, 42);
//! ```

mod json;

pub use json::JsonCodec;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Pluggable encode/decode strategy for method parameters and return values.
pub trait PayloadCodec: Send + Sync + 'static {
    /// Encode a value to payload bytes.
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>>;

    /// Decode payload bytes to a value.
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}
