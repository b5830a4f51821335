//! The broadcast gateway: Warren's network edge.
//!
//! The gateway binds inbound per-connection commands to the room layer
//! and fans resulting frames back out. The flow for one connection:
//!
//! ```text
//! accept → auth frame → identity store verifies token
//!        → command loop: decode frame
//!            → resolve membership (the only await against a store)
//!            → route to the room actor, await its reply
//!            → direct `reply` frame (always), broadcasts (via actors)
//! close/error → disconnect cleanup (same path as explicit leaves)
//! ```
//!
//! Every connection gets a writer task draining an unbounded channel into
//! the socket, so direct replies and ambient broadcasts share one ordered
//! stream.

#![allow(async_fn_in_trait)]

mod error;
mod handler;
mod identity;
mod server;
mod transport;

pub use error::{GatewayError, TransportError};
pub use identity::IdentityProvider;
pub use server::{Server, ServerBuilder};
pub use transport::{ConnectionId, WsConnection, WsListener};
