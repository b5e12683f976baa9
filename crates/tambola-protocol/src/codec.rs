//! Codec trait and implementations for serializing messages.
//!
//! The rest of the stack never serializes directly; it goes through a
//! [`Codec`] so the wire format can change without touching the
//! transport or the handlers. [`JsonCodec`] is the default and what the
//! web client speaks.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Converts between Rust message types and raw bytes.
///
/// `Send + Sync + 'static` so a single codec instance can live inside
/// the server state and be used from any connection task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// truncated, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Human-readable frames: easy to inspect in browser DevTools and logs.
/// Behind the `json` feature flag (enabled by default) so a binary
/// codec could replace it without dragging the dependency along.
///
/// ## Example
///
/// ```rust
/// use tambola_protocol::{ClientRequest, Codec, Envelope, JsonCodec, Payload};
///
/// let codec = JsonCodec;
///
/// let envelope = Envelope {
///     seq: 1,
///     timestamp: 5000,
///     payload: Payload::Request(ClientRequest::Heartbeat { client_time: 5000 }),
/// };
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientRequest, Envelope, Payload, ServerResponse};

    #[test]
    fn test_json_codec_round_trips_envelope() {
        let codec = JsonCodec;
        let envelope = Envelope {
            seq: 7,
            timestamp: 1234,
            payload: Payload::Response(ServerResponse::HeartbeatAck {
                client_time: 1200,
                server_time: 1234,
            }),
        };

        let bytes = codec.encode(&envelope).unwrap();
        let decoded: Envelope = codec.decode(&bytes).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn test_json_codec_decode_wrong_type_fails() {
        let codec = JsonCodec;
        let bytes = codec
            .encode(&ClientRequest::Heartbeat { client_time: 1 })
            .unwrap();

        let result: Result<Envelope, _> = codec.decode(&bytes);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
