//! Wire protocol for Warren.
//!
//! This crate defines the "language" that clients and the room coordinator
//! speak:
//!
//! - **Types** ([`ClientFrame`], [`ServerFrame`], [`LobbySnapshot`], etc.) —
//!   the message structures that travel on the wire.
//! - **Actions** ([`Direction`]) — the move vocabulary and its aliases.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how messages are converted
//!   to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw frames) and the room
//! layer (presence, lobby, game session). It knows nothing about
//! connections or rooms — it only knows how to name and serialize the
//! commands and events that cross the boundary.
//!
//! ```text
//! Transport (bytes) → Protocol (frames) → Gateway dispatch → Room actor
//! ```

mod action;
mod codec;
mod error;
mod types;

pub use action::Direction;
pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    Ack, CellPos, ClientCommand, ClientFrame, GamePhase, GameStateUpdate,
    Identity, LobbyMember, LobbySnapshot, PlayerView, RoomEventKind, RoomId,
    ServerFrame, UserId,
};
