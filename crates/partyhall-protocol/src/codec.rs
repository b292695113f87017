//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! Rooms never see bytes: the connection handler decodes inbound frames
//! with a codec and encodes each outbound event once per connection.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// - `Send + Sync + 'static` → one codec value is shared by every
///   connection task through the server state.
/// - `decode<T: DeserializeOwned>` → the result owns its data, so the
///   frame buffer can be dropped straight after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Browser clients speak JSON text frames, so this is the codec the
/// server runs with.
///
/// ## Example
///
/// ```rust
/// use partyhall_protocol::{Codec, JsonCodec, LobbyRequest, RoomId};
///
/// let codec = JsonCodec;
/// let request: LobbyRequest = codec
///     .decode(br#"{"type":"spectate","roomId":4242}"#)
///     .unwrap();
/// assert_eq!(
///     request,
///     LobbyRequest::Spectate { room_id: RoomId::new(4242).unwrap() }
/// );
///
/// let bytes = codec.encode(&request).unwrap();
/// let again: LobbyRequest = codec.decode(&bytes).unwrap();
/// assert_eq!(request, again);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
