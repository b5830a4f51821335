//! Error types for the lobby layer.

use warren_protocol::UserId;

/// Errors from lobby operations (readiness, start gate).
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// Only the room owner may start a session.
    #[error("user {0} is not the room owner")]
    NotOwner(UserId),

    /// The readiness gate failed; carries the display names of the
    /// online members who are not ready yet.
    #[error("not all online members are ready ({})", .0.join(", "))]
    NotAllReady(Vec<String>),

    /// Ready flags belong to online users only.
    #[error("user {0} is not online in this room")]
    NotOnline(UserId),
}

/// A durable-store failure (membership lookup, event-log append).
///
/// Surfaced to clients as a generic "unavailable" acknowledgement and
/// never allowed to leave partial in-memory state behind.
#[derive(Debug, thiserror::Error)]
#[error("upstream store unavailable: {0}")]
pub struct StoreError(pub String);
