//! JSON codec using `serde_json`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::PayloadCodec;
use crate::error::Result;

/// JSON codec for structured data.
///
/// The default codec: human-readable, self-describing, and what the wire
/// envelope uses unless callers pick another codec.
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    #[inline]
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestStruct {
        id: u32,
        name: String,
        active: bool,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = TestStruct {
            id: 42,
            name: "test".to_string(),
            active: true,
        };

        let encoded = JsonCodec::encode(&original).unwrap();
        let decoded: TestStruct = JsonCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_encode_decode_primitives() {
        let s = "hello world";
        let encoded = JsonCodec::encode(&s).unwrap();
        let decoded: String = JsonCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, s);

        let n: i64 = 12345;
        let encoded = JsonCodec::encode(&n).unwrap();
        let decoded: i64 = JsonCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, n);
    }

    #[test]
    fn test_unit_encodes_as_null() {
        // Zero-argument calls send `()`, which must be valid JSON on the wire.
        let encoded = JsonCodec::encode(&()).unwrap();
        assert_eq!(encoded, b"null");
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let invalid = b"not valid json";
        let result: Result<TestStruct> = JsonCodec::decode(invalid);
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_decode_option() {
        let some_val: Option<i32> = Some(42);
        let encoded = JsonCodec::encode(&some_val).unwrap();
        let decoded: Option<i32> = JsonCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, some_val);

        let none_val: Option<i32> = None;
        let encoded = JsonCodec::encode(&none_val).unwrap();
        let decoded: Option<i32> = JsonCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, none_val);
    }
}
