//! Live presence for one room.

use std::collections::HashSet;

use warren_protocol::UserId;

use crate::LobbyError;

/// The set of currently-online members of one room and their ready flags.
///
/// Invariant: a ready flag exists only for a currently-online user — a
/// user can never appear ready while offline. `leave` enforces this by
/// dropping the flag together with the online bit.
///
/// The whole record disappears when the last member leaves: the owning
/// room actor checks [`Presence::is_empty`] after every mutation and tears
/// itself down, so no zombie rooms linger in the registry.
#[derive(Debug, Default)]
pub struct Presence {
    online: HashSet<UserId>,
    ready: HashSet<UserId>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a user online.
    ///
    /// Returns `true` only on a genuine offline→online transition.
    /// Joining while already online is a no-op: the ready flag is kept and
    /// the caller must not re-emit a join notification.
    pub fn join(&mut self, user: UserId) -> bool {
        self.online.insert(user)
    }

    /// Marks a user offline, dropping their ready flag.
    ///
    /// Returns `true` if the user was online.
    pub fn leave(&mut self, user: UserId) -> bool {
        self.ready.remove(&user);
        self.online.remove(&user)
    }

    /// Sets the ready flag for an online user.
    ///
    /// # Errors
    /// [`LobbyError::NotOnline`] if the user has no open connection in
    /// this room — offline users cannot be ready.
    pub fn set_ready(&mut self, user: UserId, ready: bool) -> Result<(), LobbyError> {
        if !self.online.contains(&user) {
            return Err(LobbyError::NotOnline(user));
        }
        if ready {
            self.ready.insert(user);
        } else {
            self.ready.remove(&user);
        }
        Ok(())
    }

    pub fn is_online(&self, user: UserId) -> bool {
        self.online.contains(&user)
    }

    pub fn is_ready(&self, user: UserId) -> bool {
        self.ready.contains(&user)
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Naming convention: `test_{function}_{scenario}_{expected}`.

    use super::*;

    fn uid(id: u64) -> UserId {
        UserId(id)
    }

    #[test]
    fn test_join_new_user_reports_transition() {
        let mut p = Presence::new();
        assert!(p.join(uid(1)));
        assert!(p.is_online(uid(1)));
        assert_eq!(p.online_count(), 1);
    }

    #[test]
    fn test_join_twice_is_idempotent() {
        // Second join must not look like a fresh arrival and must not
        // disturb the ready flag.
        let mut p = Presence::new();
        p.join(uid(1));
        p.set_ready(uid(1), true).unwrap();

        assert!(!p.join(uid(1)), "repeat join is not a transition");
        assert!(p.is_ready(uid(1)), "ready flag survives repeat join");
        assert_eq!(p.online_count(), 1);
    }

    #[test]
    fn test_leave_drops_ready_flag() {
        let mut p = Presence::new();
        p.join(uid(1));
        p.set_ready(uid(1), true).unwrap();

        assert!(p.leave(uid(1)));

        assert!(!p.is_online(uid(1)));
        assert!(!p.is_ready(uid(1)), "no ready flag for offline users");
    }

    #[test]
    fn test_leave_unknown_user_returns_false() {
        let mut p = Presence::new();
        assert!(!p.leave(uid(9)));
    }

    #[test]
    fn test_set_ready_offline_user_is_rejected() {
        let mut p = Presence::new();
        let result = p.set_ready(uid(2), true);
        assert!(matches!(result, Err(LobbyError::NotOnline(u)) if u == uid(2)));
    }

    #[test]
    fn test_set_ready_toggles_both_ways() {
        let mut p = Presence::new();
        p.join(uid(1));
        p.set_ready(uid(1), true).unwrap();
        assert!(p.is_ready(uid(1)));
        p.set_ready(uid(1), false).unwrap();
        assert!(!p.is_ready(uid(1)));
    }

    #[test]
    fn test_last_leave_empties_the_record() {
        let mut p = Presence::new();
        p.join(uid(1));
        p.join(uid(2));
        p.leave(uid(1));
        assert!(!p.is_empty());
        p.leave(uid(2));
        assert!(p.is_empty(), "owning actor reaps the room at this point");
    }
}
