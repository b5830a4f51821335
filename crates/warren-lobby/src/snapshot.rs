//! Lobby snapshots and the readiness gate.
//!
//! Both are pure reads: they combine the durable roster (fetched from the
//! [`MembershipStore`](crate::MembershipStore) *before* any in-memory
//! mutation) with the live [`Presence`]. Snapshots are computed fresh on
//! every query and every broadcast — never cached across mutations.

use warren_protocol::{LobbyMember, LobbySnapshot, RoomId, UserId};

use crate::{LobbyError, Presence, RoomRoster};

/// Builds the derived lobby view for one room.
///
/// Members keep the roster's order (joined-time ascending, the way the
/// membership store returns them). Offline members always show
/// `ready = false`, whatever flag they had while online.
pub fn snapshot(roster: &RoomRoster, presence: &Presence) -> LobbySnapshot {
    let members: Vec<LobbyMember> = roster
        .members
        .iter()
        .map(|m| {
            let online = presence.is_online(m.user_id);
            LobbyMember {
                user_id: m.user_id,
                username: m.username.clone(),
                joined_at: m.joined_at,
                online,
                ready: online && presence.is_ready(m.user_id),
            }
        })
        .collect();

    let online_count = members.iter().filter(|m| m.online).count();
    let ready_count = members.iter().filter(|m| m.ready).count();

    LobbySnapshot {
        room_id: roster.room_id,
        owner_id: roster.owner,
        member_count: members.len(),
        online_count,
        ready_count,
        all_ready: online_count > 0 && ready_count == online_count,
        members,
    }
}

/// The readiness gate for `room.game.start`.
///
/// # Errors
/// - [`LobbyError::NotOwner`] if the requester is not the room owner —
///   checked first, regardless of readiness.
/// - [`LobbyError::NotAllReady`] unless at least one member is online and
///   every online member is ready; carries the display names of the
///   not-ready online members so the owner knows who is holding the
///   room up. An empty lobby fails this way too (nobody to race).
///
/// On success the caller draws a fresh session seed and broadcasts the
/// `room.game.started` event; the game session itself is *not* created
/// here — that happens lazily on the first `game.join`.
pub fn try_start(snapshot: &LobbySnapshot, requester: UserId) -> Result<(), LobbyError> {
    if requester != snapshot.owner_id {
        return Err(LobbyError::NotOwner(requester));
    }
    if !snapshot.all_ready {
        let waiting: Vec<String> = snapshot
            .members
            .iter()
            .filter(|m| m.online && !m.ready)
            .map(|m| m.username.clone())
            .collect();
        return Err(LobbyError::NotAllReady(waiting));
    }
    Ok(())
}

/// The session entry URL announced with `room.game.started`.
pub fn game_url(room_id: RoomId, seed: u64) -> String {
    format!("/game?roomId={}&seed={}", room_id.0, seed)
}

// =========================================================================
// Tests
// =========================================================================
