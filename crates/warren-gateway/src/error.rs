//! Error types for the gateway.

use warren_protocol::ProtocolError;
use warren_room::RoomError;

/// Errors at the socket level.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),
}

/// Top-level error wrapping every layer the gateway touches.
///
/// `#[from]` gives the `?` operator automatic conversions from the
/// sub-layer error types.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Room(#[from] RoomError),

    /// The identity store rejected the auth token.
    #[error("authentication failed: {0}")]
    Auth(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_protocol::RoomId;

    #[test]
    fn test_from_room_error() {
        let err: GatewayError = RoomError::Unavailable(RoomId(1)).into();
        assert!(matches!(err, GatewayError::Room(_)));
        assert!(err.to_string().contains("R-1"));
    }

    #[test]
    fn test_from_transport_error() {
        let err: GatewayError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(err.to_string().contains("gone"));
    }
}
