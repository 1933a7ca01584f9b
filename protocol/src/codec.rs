//! JSON codec for command envelopes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ProtocolError;

/// Maximum encoded command or response size.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024; // 4 MiB

/// Encode an envelope as JSON bytes.
pub fn encode(message: &impl Serialize) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serde_json::to_vec(message).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: bytes.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(bytes)
}

/// Decode an envelope from JSON bytes.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    serde_json::from_slice(data).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
