//! Seams to the durable stores the core does not own.
//!
//! The membership record ("user X belongs to room Y", plus ownership) and
//! the append-only event log live in external services. The core queries
//! membership to authorize joins and reads ownership for the start gate,
//! but never mutates it; it emits notifications to the log but never reads
//! them back.
//!
//! These are the only operations in the whole system allowed to suspend.
//! Handlers call them *before* touching any in-memory state, so a store
//! failure can never leave partial presence or session data behind.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use warren_protocol::{Identity, RoomEventKind, RoomId, UserId};

use crate::StoreError;

/// One durable membership row.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRecord {
    pub user_id: UserId,
    pub username: String,
    pub joined_at: DateTime<Utc>,
}

/// A room's durable roster: owner plus members in joined-time order.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomRoster {
    pub room_id: RoomId,
    pub owner: UserId,
    pub members: Vec<MemberRecord>,
}

/// Read access to the durable membership record.
pub trait MembershipStore: Send + Sync + 'static {
    /// The roster for a room, or `None` if the room does not exist.
    ///
    /// # Errors
    /// [`StoreError::Unavailable`] when the backing store cannot be
    /// reached; surfaced to clients as a generic "unavailable" ack.
    fn roster(
        &self,
        room: RoomId,
    ) -> impl Future<Output = Result<Option<RoomRoster>, StoreError>> + Send;

    /// Whether `user` belongs to `room`.
    fn is_member(
        &self,
        room: RoomId,
        user: UserId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        async move {
            Ok(self
                .roster(room)
                .await?
                .map(|r| r.members.iter().any(|m| m.user_id == user))
                .unwrap_or(false))
        }
    }
}

/// Write access to the durable event log.
///
/// Fire-and-notify: callers log failures and carry on; a broken log never
/// fails a command or leaves partial state.
pub trait EventLog: Send + Sync + 'static {
    fn append(
        &self,
        room: RoomId,
        kind: RoomEventKind,
        user: &Identity,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// In-memory implementations (tests, demos)
// ---------------------------------------------------------------------------

/// A [`MembershipStore`] backed by a plain map. For tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryMembership {
    rooms: Mutex<HashMap<RoomId, RoomRoster>>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a room owned by `owner`, who also becomes its first member.
    pub fn create_room(&self, room: RoomId, owner: &Identity) {
        let mut rooms = self.rooms.lock().expect("membership map poisoned");
        rooms.insert(
            room,
            RoomRoster {
                room_id: room,
                owner: owner.user_id,
                members: vec![MemberRecord {
                    user_id: owner.user_id,
                    username: owner.username.clone(),
                    joined_at: Utc::now(),
                }],
            },
        );
    }

    /// Adds a member to an existing room. Unknown rooms are ignored.
    pub fn add_member(&self, room: RoomId, user: &Identity) {
        let mut rooms = self.rooms.lock().expect("membership map poisoned");
        if let Some(roster) = rooms.get_mut(&room) {
            if roster.members.iter().all(|m| m.user_id != user.user_id) {
                roster.members.push(MemberRecord {
                    user_id: user.user_id,
                    username: user.username.clone(),
                    joined_at: Utc::now(),
                });
            }
        }
    }
}

impl MembershipStore for InMemoryMembership {
    async fn roster(&self, room: RoomId) -> Result<Option<RoomRoster>, StoreError> {
        let rooms = self.rooms.lock().expect("membership map poisoned");
        Ok(rooms.get(&room).cloned())
    }
}

/// An [`EventLog`] that remembers appended entries. For tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    entries: Mutex<Vec<(RoomId, RoomEventKind, UserId)>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(RoomId, RoomEventKind, UserId)> {
        self.entries.lock().expect("event log poisoned").clone()
    }
}

impl EventLog for InMemoryEventLog {
    async fn append(
        &self,
        room: RoomId,
        kind: RoomEventKind,
        user: &Identity,
    ) -> Result<(), StoreError> {
        self.entries
            .lock()
            .expect("event log poisoned")
            .push((room, kind, user.user_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(id: u64, name: &str) -> Identity {
        Identity { user_id: UserId(id), username: name.into() }
    }

    #[tokio::test]
    async fn test_roster_unknown_room_is_none() {
        let store = InMemoryMembership::new();
        assert_eq!(store.roster(RoomId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_room_makes_owner_first_member() {
        let store = InMemoryMembership::new();
        store.create_room(RoomId(1), &ident(10, "ana"));

        let roster = store.roster(RoomId(1)).await.unwrap().unwrap();
        assert_eq!(roster.owner, UserId(10));
        assert_eq!(roster.members.len(), 1);
        assert_eq!(roster.members[0].username, "ana");
    }

    #[tokio::test]
    async fn test_is_member_checks_the_roster() {
        let store = InMemoryMembership::new();
        store.create_room(RoomId(1), &ident(10, "ana"));
        store.add_member(RoomId(1), &ident(11, "bo"));

        assert!(store.is_member(RoomId(1), UserId(11)).await.unwrap());
        assert!(!store.is_member(RoomId(1), UserId(12)).await.unwrap());
        assert!(!store.is_member(RoomId(2), UserId(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_member_is_idempotent() {
        let store = InMemoryMembership::new();
        store.create_room(RoomId(1), &ident(10, "ana"));
        store.add_member(RoomId(1), &ident(11, "bo"));
        store.add_member(RoomId(1), &ident(11, "bo"));

        let roster = store.roster(RoomId(1)).await.unwrap().unwrap();
        assert_eq!(roster.members.len(), 2);
    }

    #[tokio::test]
    async fn test_event_log_records_appends() {
        let log = InMemoryEventLog::new();
        log.append(RoomId(1), RoomEventKind::Join, &ident(10, "ana"))
            .await
            .unwrap();
        let entries = log.entries();
        assert_eq!(entries, vec![(RoomId(1), RoomEventKind::Join, UserId(10))]);
    }
}
