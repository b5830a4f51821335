//! The live maze-race session: players, movement, and the win condition.
//!
//! A [`GameSession`] is pure in-memory state driven entirely by its owning
//! room actor — one command at a time, no locking, no I/O. Time enters
//! through explicit [`std::time::Instant`] parameters so the move throttle
//! is testable without sleeping.

mod config;
mod error;
mod session;

pub use config::GameConfig;
pub use error::GameError;
pub use session::{GameSession, MoveOutcome, Player};
