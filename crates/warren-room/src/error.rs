//! Error types for the room layer.

use warren_protocol::RoomId;

/// Errors that can occur while routing commands to rooms.
///
/// Validation failures inside a room (readiness gate, move rules) travel
/// back as failure acknowledgements, not as errors — they are part of the
/// protocol, reported only to the originating connection. This enum
/// covers the cases where the command could not be run at all.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room id failed validation (zero) or names no durable room.
    #[error("invalid room id {0}")]
    InvalidRoomId(RoomId),

    /// The caller is not a member of the room (or not its owner, for
    /// owner-only commands).
    #[error("not authorized for room {0}")]
    Unauthorized(RoomId),

    /// The durable membership store could not be reached. The command
    /// mutated nothing.
    #[error("upstream store unavailable")]
    UpstreamUnavailable,

    /// The room's actor is gone or its command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}
