//! Payload codec.
//!
//! The wire encoding is owned by an external codec service; `bincode` is the
//! stand-in behind these two functions, so swapping it touches nothing else.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::ProtocolError;

/// Serialize a message payload.
pub fn encode_payload<T: Serialize>(code: u64, value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serialize(value).map_err(|e| ProtocolError::Encode {
        code,
        reason: e.to_string(),
    })
}

/// Deserialize a message payload.
pub fn decode_payload<T: DeserializeOwned>(code: u64, bytes: &[u8]) -> Result<T, ProtocolError> {
    bincode::deserialize(bytes).map_err(|e| ProtocolError::Decode {
        code,
        reason: e.to_string(),
    })
}
