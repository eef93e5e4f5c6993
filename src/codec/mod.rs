//! Codec module - serialization/deserialization for message bodies.
//!
//! Device traffic travels as JSON inside frame bodies:
//!
//! - [`JsonCodec`] - JSON using `serde_json`
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than trait objects.
//! This allows for compile-time codec selection.
//!
//! # Example
//!
//! ```
//! use lockstream_client::codec::JsonCodec;
//!
//! let encoded = JsonCodec::encode(&"hello").unwrap();
//! let decoded: String = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod json;

pub use json::JsonCodec;
