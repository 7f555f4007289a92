//! JSON encoding for protocol messages.

use crate::error::ProtocolResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Types that can be encoded to a JSON body.
pub trait JsonEncode {
    /// Encodes to JSON bytes.
    fn encode_json(&self) -> ProtocolResult<Vec<u8>>;
}

/// Types that can be decoded from a JSON body.
pub trait JsonDecode: Sized {
    /// Decodes from JSON bytes.
    fn decode_json(bytes: &[u8]) -> ProtocolResult<Self>;
}

impl<T: Serialize> JsonEncode for T {
    fn encode_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl<T: DeserializeOwned> JsonDecode for T {
    fn decode_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
