//! Lobby layer for Warren: who is here, who is ready, and whether the
//! owner may start a session.
//!
//! Three pieces live here:
//!
//! 1. **Presence** ([`Presence`]) — the live, non-durable subset of a
//!    room's members with an open connection, plus their ready flags.
//!    One instance per room, owned by that room's actor; no locking,
//!    because the actor processes one command at a time.
//! 2. **Snapshots and the readiness gate** ([`snapshot`], [`try_start`]) —
//!    pure reads combining the durable roster with live presence.
//! 3. **External-store seams** ([`MembershipStore`], [`EventLog`]) — the
//!    durable membership record and the append-only event log are owned
//!    by other services; the core only queries/notifies them through
//!    these traits. In-memory implementations ship for tests and demos.

#![allow(async_fn_in_trait)]

mod error;
mod presence;
mod snapshot;
mod store;

pub use error::{LobbyError, StoreError};
pub use presence::Presence;
pub use snapshot::{game_url, snapshot, try_start};
pub use store::{
    EventLog, InMemoryEventLog, InMemoryMembership, MemberRecord,
    MembershipStore, RoomRoster,
};
