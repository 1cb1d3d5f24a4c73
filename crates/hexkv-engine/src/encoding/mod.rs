//! Byte encodings used by hexkv keys and values.
//!
//! - [`var`]: the order-preserving unsigned integer codec and prefixed
//!   concatenation every key is built from
//! - [`column`]: order-preserving encodings of indexed column values
//!
//! Payloads stored as values (rows, schemas) use `bincode`; the helpers
//! here map its failures onto [`HexError::Serialization`].

pub mod column;
pub mod var;

use hexkv_common::error::{HexError, HexResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use column::IndexValue;
pub use var::{append_with_prefix, decode_ulong, encode_ulong, KeyReader};

/// Serializes a payload with bincode.
pub(crate) fn to_bytes<T: Serialize>(value: &T) -> HexResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| HexError::serialization(e.to_string()))
}

/// Deserializes a bincode payload.
pub(crate) fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> HexResult<T> {
    bincode::deserialize(bytes).map_err(|e| HexError::serialization(e.to_string()))
}
