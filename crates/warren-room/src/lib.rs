//! Room actors and the room registry.
//!
//! Each active room runs as an isolated Tokio task owning all of that
//! room's mutable state: the live [`Presence`](warren_lobby::Presence),
//! the optional [`GameSession`](warren_game::GameSession), and the
//! outbound channel of every subscribed connection. Commands arrive
//! through an mpsc channel and are handled to completion one at a time,
//! which gives linearizable per-room semantics without a single lock —
//! the actor-model rendering of the source's cooperative event loop.
//!
//! Durable-store lookups never happen inside an actor. The gateway
//! resolves membership *before* sending a command and attaches the roster
//! to it, so an actor never suspends halfway through a mutation.
//!
//! # Key types
//!
//! - [`RoomRegistry`] — owns `room_id → RoomHandle` plus the user→session
//!   binding; the only place rooms are created and reaped.
//! - [`RoomHandle`] — cheap-to-clone sender used to command a room actor.
//! - [`RoomReply`] — acknowledgement plus the vacancy flag the registry
//!   uses to reap empty rooms.

mod error;
mod registry;
mod room;

pub use error::RoomError;
pub use registry::RoomRegistry;
pub use room::{ClientSender, RoomHandle, RoomReply, spawn_room};
