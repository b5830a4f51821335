//! Codec seam for serializing and deserializing frames.
//!
//! The gateway doesn't care how frames become bytes — it programs against
//! the [`Codec`] trait and we hand it [`JsonCodec`]. JSON keeps frames
//! inspectable in browser dev tools, which is what the original clients
//! expect; a binary codec could be swapped in here without touching any
//! other layer.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts values to bytes and back.
///
/// `Send + Sync + 'static` because the codec is shared across connection
/// tasks for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or
    /// don't match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientCommand, ClientFrame, RoomId};

    #[test]
    fn test_json_codec_round_trips_client_frame() {
        let codec = JsonCodec;
        let frame = ClientFrame {
            seq: 2,
            command: ClientCommand::MembersGet { room_id: RoomId(1) },
        };
        let bytes = codec.encode(&frame).unwrap();
        let decoded: ClientFrame = codec.decode(&bytes).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_json_codec_decode_rejects_garbage() {
        let codec = JsonCodec;
        let result: Result<ClientFrame, _> = codec.decode(b"\xff\xfe");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
