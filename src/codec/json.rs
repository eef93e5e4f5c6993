//! JSON codec using `serde_json`.
//!
//! Frame bodies are text, so encoding produces a `String` rather than bytes.
//!
//! # Example
//!
//! ```
//! use lockstream_client::codec::JsonCodec;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Envelope {
//!     msg_id: String,
//!     body: u32,
//! }
//!
//! let msg = Envelope { msg_id: "_42".to_string(), body: 8 };
//! let encoded = JsonCodec::encode(&msg).unwrap();
//! let decoded: Envelope = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use crate::error::Result;

/// JSON codec for frame bodies.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// Decode a JSON string to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the text cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode to an untyped value.
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid JSON.
    #[inline]
    pub fn decode_value(text: &str) -> Result<serde_json::Value> {
        Self::decode(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockstreamError;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Reading {
        kind: u8,
        value: f64,
    }

    #[test]
    fn test_struct_as_object() {
        let encoded = JsonCodec::encode(&Reading { kind: 2, value: 0.5 }).unwrap();
        assert_eq!(encoded, r#"{"kind":2,"value":0.5}"#);
    }

    #[test]
    fn test_decode_value() {
        let value = JsonCodec::decode_value(r#"{"type":4,"data":{"uuid":"u-1"}}"#).unwrap();
        assert_eq!(value["type"], 4);
        assert_eq!(value["data"]["uuid"], "u-1");
    }

    #[test]
    fn test_decode_invalid() {
        let result: Result<Reading> = JsonCodec::decode("not json");
        assert!(matches!(result, Err(LockstreamError::Json(_))));
    }
}
