//! The room registry: the single owner of every live room.
//!
//! Everything per-room lives behind a [`RoomHandle`] in here, keyed by
//! room id, so no two actors can ever exist for the same room. The
//! registry also owns the user→session binding — a user has at most one
//! live game session, and joining another room's session detaches them
//! from the previous one first.
//!
//! The registry itself is passed around behind a mutex by the gateway;
//! it is deliberately not `Sync` on its own.

use std::collections::HashMap;

use warren_game::GameConfig;
use warren_protocol::{RoomId, UserId};

use crate::room::{RoomHandle, spawn_room};

/// Command-queue depth per room actor.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Creates, finds, and reaps room actors.
pub struct RoomRegistry {
    rooms: HashMap<RoomId, RoomHandle>,
    /// Which room's game session each user is attached to.
    game_binding: HashMap<UserId, RoomId>,
    game_config: GameConfig,
}

impl RoomRegistry {
    pub fn new(game_config: GameConfig) -> Self {
        Self {
            rooms: HashMap::new(),
            game_binding: HashMap::new(),
            game_config: game_config.validated(),
        }
    }

    /// The handle for an already-live room.
    pub fn handle(&self, room_id: RoomId) -> Option<RoomHandle> {
        self.rooms.get(&room_id).cloned()
    }

    /// The handle for a room, spawning its actor on first touch.
    pub fn get_or_spawn(&mut self, room_id: RoomId) -> RoomHandle {
        if let Some(handle) = self.rooms.get(&room_id) {
            return handle.clone();
        }
        let handle = spawn_room(room_id, self.game_config.clone(), DEFAULT_CHANNEL_SIZE);
        self.rooms.insert(room_id, handle.clone());
        tracing::info!(%room_id, rooms = self.rooms.len(), "room spawned");
        handle
    }

    /// The room whose game session `user` is currently bound to.
    pub fn game_room(&self, user: UserId) -> Option<RoomId> {
        self.game_binding.get(&user).copied()
    }

    /// Binds a user's game session to `room_id`.
    ///
    /// Returns the previous binding when it pointed at a *different*
    /// room — the caller must run leave semantics against that room
    /// before the new join takes effect.
    pub fn bind_game(&mut self, user: UserId, room_id: RoomId) -> Option<RoomId> {
        let previous = self.game_binding.insert(user, room_id);
        previous.filter(|p| *p != room_id)
    }

    pub fn unbind_game(&mut self, user: UserId) {
        self.game_binding.remove(&user);
    }

    /// Shuts a vacant room down and forgets it, along with any session
    /// bindings that still point at it.
    pub async fn reap(&mut self, room_id: RoomId) {
        if let Some(handle) = self.rooms.remove(&room_id) {
            let _ = handle.shutdown().await;
            self.game_binding.retain(|_, bound| *bound != room_id);
            tracing::info!(%room_id, rooms = self.rooms.len(), "room reaped");
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
