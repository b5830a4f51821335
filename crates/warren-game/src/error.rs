//! Error types for the game layer.

use warren_protocol::UserId;

/// Errors from move and session operations.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The action string maps to no cardinal direction.
    #[error("unknown move action: {0:?}")]
    InvalidAction(String),

    /// The session has finished; no further moves are accepted.
    #[error("game over")]
    GameOver,

    /// The user has no player in this session.
    #[error("user {0} has no player in this session")]
    UnknownPlayer(UserId),
}
