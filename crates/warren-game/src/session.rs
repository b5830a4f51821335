//! Session state and the per-player movement state machine.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use warren_maze::{Dungeon, Point};
use warren_protocol::{
    CellPos, Direction, GamePhase, GameStateUpdate, Identity, PlayerView, RoomId,
    UserId,
};

use crate::{GameConfig, GameError};

/// Display colors handed out in join order.
const PLAYER_COLORS: [&str; 8] = [
    "#ff9c4d", "#4dc3ff", "#7ee787", "#ff6b81", "#c792ea", "#ffd166",
    "#64d8cb", "#f78c6c",
];

/// One racer. Mutated only by its own user's commands (single writer)
/// or removed on leave/disconnect. Position is always an in-bounds
/// floor cell.
#[derive(Debug, Clone)]
pub struct Player {
    pub user_id: UserId,
    pub username: String,
    pub nickname: String,
    pub x: usize,
    pub y: usize,
    pub moves: u64,
    pub last_move_at: Option<Instant>,
    pub color: String,
}

/// What an accepted `game.move` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Position changed; broadcast a normal snapshot.
    Moved,
    /// This move reached the end cell: the session just finished and the
    /// mover is the winner. Broadcast a terminal snapshot.
    Won,
    /// The target cell is a wall. No position change, but the throttle
    /// timestamp advanced and a "bumped into wall" snapshot still goes
    /// out.
    Blocked,
    /// Too soon after the previous accepted move. Not an error — a no-op
    /// acknowledgement carrying the remaining wait. No broadcast.
    Throttled { wait: Duration },
}

/// One room's live match: the dungeon, the racers, and the win state.
///
/// Created lazily on the first `game.join` for a room; destroyed by the
/// owning actor when the last player leaves (the dungeon is regenerated
/// from scratch on the next join — sessions are never persisted).
#[derive(Debug)]
pub struct GameSession {
    room_id: RoomId,
    seed: u64,
    config: GameConfig,
    dungeon: Dungeon,
    round: u64,
    phase: GamePhase,
    winner: Option<UserId>,
    players: HashMap<UserId, Player>,
    /// Join order, for deterministic snapshots and color assignment.
    order: Vec<UserId>,
    /// Total joins ever, so colors aren't reshuffled by leavers.
    joined_total: usize,
}

impl GameSession {
    pub fn new(room_id: RoomId, seed: u64, config: GameConfig) -> Self {
        let config = config.validated();
        let dungeon = Dungeon::generate(seed, config.width, config.height);
        tracing::info!(%room_id, seed, "game session created");
        Self {
            room_id,
            seed,
            config,
            dungeon,
            round: 0,
            phase: GamePhase::Playing,
            winner: None,
            players: HashMap::new(),
            order: Vec::new(),
            joined_total: 0,
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn winner(&self) -> Option<UserId> {
        self.winner
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player(&self, user: UserId) -> Option<&Player> {
        self.players.get(&user)
    }

    /// Attaches a player, creating one on first join and reusing the
    /// existing one on reconnect (position and move count survive; the
    /// display metadata refreshes).
    pub fn join(&mut self, identity: &Identity, nickname: Option<String>) -> &Player {
        let user = identity.user_id;
        if self.players.contains_key(&user) {
            let player = self
                .players
                .get_mut(&user)
                .expect("presence checked above");
            player.username = identity.username.clone();
            if let Some(nick) = nickname {
                player.nickname = nick;
            }
            self.round += 1;
            tracing::debug!(room_id = %self.room_id, %user, "player reattached");
            return player;
        }

        let spawn = self.spawn_cell();
        let color = PLAYER_COLORS[self.joined_total % PLAYER_COLORS.len()];
        let nickname = nickname.unwrap_or_else(|| identity.username.clone());
        let player = Player {
            user_id: user,
            username: identity.username.clone(),
            nickname,
            x: spawn.x,
            y: spawn.y,
            moves: 0,
            last_move_at: None,
            color: color.to_string(),
        };
        self.players.insert(user, player);
        self.order.push(user);
        self.joined_total += 1;
        self.round += 1;
        tracing::info!(
            room_id = %self.room_id,
            %user,
            x = spawn.x,
            y = spawn.y,
            "player spawned"
        );
        &self.players[&user]
    }

    /// Deterministic spawn search: interior points of rooms in placement
    /// order, skipping the end cell and occupied cells. Falls back to the
    /// start cell if everything interior is taken.
    fn spawn_cell(&self) -> Point {
        let end = self.dungeon.end();
        for room in self.dungeon.rooms() {
            for p in room.interior() {
                if p == end {
                    continue;
                }
                if self.occupied(p) {
                    continue;
                }
                return p;
            }
        }
        self.dungeon.start()
    }

    fn occupied(&self, p: Point) -> bool {
        self.players.values().any(|pl| pl.x == p.x && pl.y == p.y)
    }

    /// Runs one move command through the state machine.
    ///
    /// Check order matters and is part of the contract:
    /// action validity → game over → throttle → wall → move/win.
    ///
    /// # Errors
    /// - [`GameError::InvalidAction`] for an unrecognized action string.
    /// - [`GameError::GameOver`] once the phase is `Finished`.
    /// - [`GameError::UnknownPlayer`] if the user never joined.
    pub fn apply_move(
        &mut self,
        user: UserId,
        action: &str,
        now: Instant,
    ) -> Result<MoveOutcome, GameError> {
        let direction = Direction::parse(action)
            .ok_or_else(|| GameError::InvalidAction(action.to_string()))?;

        if self.phase == GamePhase::Finished {
            return Err(GameError::GameOver);
        }

        let interval = self.config.move_interval();
        let (width, height) = (self.dungeon.width(), self.dungeon.height());
        let end = self.dungeon.end();

        let player = self
            .players
            .get_mut(&user)
            .ok_or(GameError::UnknownPlayer(user))?;

        if let Some(last) = player.last_move_at {
            let elapsed = now.duration_since(last);
            if elapsed < interval {
                return Ok(MoveOutcome::Throttled { wait: interval - elapsed });
            }
        }

        let (dx, dy) = direction.delta();
        let nx = (player.x as i64 + dx).clamp(0, width as i64 - 1) as usize;
        let ny = (player.y as i64 + dy).clamp(0, height as i64 - 1) as usize;

        if !self.dungeon.is_floor(nx, ny) {
            // The bump still counts against the throttle.
            player.last_move_at = Some(now);
            self.round += 1;
            return Ok(MoveOutcome::Blocked);
        }

        player.x = nx;
        player.y = ny;
        player.moves += 1;
        player.last_move_at = Some(now);
        self.round += 1;

        if nx == end.x && ny == end.y {
            // The one and only transition to Finished.
            self.phase = GamePhase::Finished;
            self.winner = Some(user);
            tracing::info!(room_id = %self.room_id, %user, "race won");
            return Ok(MoveOutcome::Won);
        }
        Ok(MoveOutcome::Moved)
    }

    /// Detaches a player. Returns `true` if one was removed; the owning
    /// actor destroys the whole session when [`Self::is_empty`] turns
    /// true afterwards.
    pub fn remove(&mut self, user: UserId) -> bool {
        let removed = self.players.remove(&user).is_some();
        if removed {
            self.order.retain(|u| *u != user);
            self.round += 1;
            tracing::debug!(room_id = %self.room_id, %user, "player removed");
        }
        removed
    }

    /// Builds the authoritative broadcast payload.
    pub fn snapshot(&self, hint: impl Into<String>) -> GameStateUpdate {
        let players = self
            .order
            .iter()
            .filter_map(|user| self.players.get(user))
            .map(|p| PlayerView {
                user_id: p.user_id,
                nickname: p.nickname.clone(),
                x: p.x,
                y: p.y,
                moves: p.moves,
                color: p.color.clone(),
            })
            .collect();

        let end = self.dungeon.end();
        GameStateUpdate {
            room_id: self.room_id,
            seed: self.seed,
            width: self.dungeon.width(),
            height: self.dungeon.height(),
            map_rows: self.dungeon.map_rows(),
            end: CellPos { x: end.x, y: end.y },
            players,
            round: self.round,
            phase: self.phase,
            winner: self.winner,
            hint: hint.into(),
            game_over: self.phase == GamePhase::Finished,
            return_delay_ms: self.config.return_delay_ms,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Movement state-machine tests.
    //!
    //! Throttling depends on elapsed time, so every test injects explicit
    //! `Instant`s instead of sleeping: a base instant plus offsets picked
    //! either side of the configured interval.

    use super::*;

    fn ident(id: u64, name: &str) -> Identity {
        Identity { user_id: UserId(id), username: name.into() }
    }

    fn session() -> GameSession {
        GameSession::new(RoomId(1), 42, GameConfig::default())
    }

    /// Places a player on a floor cell whose `direction` neighbour is a
    /// wall, so a move that way must bump. The topmost-leftmost floor
    /// cell always has a wall above it.
    fn place_against_wall(s: &mut GameSession, user: UserId) -> (usize, usize) {
        let (mut wx, mut wy) = (0, 0);
        'scan: for y in 0..s.dungeon.height() {
            for x in 0..s.dungeon.width() {
                if s.dungeon.is_floor(x, y) {
                    (wx, wy) = (x, y);
                    break 'scan;
                }
            }
        }
        assert!(!s.dungeon.is_floor(wx, wy - 1), "cell above must be wall");
        let player = s.players.get_mut(&user).unwrap();
        player.x = wx;
        player.y = wy;
        (wx, wy)
    }

    #[test]
    fn test_join_spawns_on_floor_away_from_end() {
        let mut s = session();
        let p = s.join(&ident(1, "ana"), None).clone();
        assert!(s.dungeon.is_floor(p.x, p.y));
        let end = s.dungeon.end();
        assert!((p.x, p.y) != (end.x, end.y));
        assert_eq!(p.nickname, "ana", "nickname defaults to username");
    }

    #[test]
    fn test_join_two_players_get_distinct_cells_and_colors() {
        let mut s = session();
        let a = s.join(&ident(1, "ana"), None).clone();
        let b = s.join(&ident(2, "bo"), Some("Bo!".into())).clone();
        assert!((a.x, a.y) != (b.x, b.y));
        assert_ne!(a.color, b.color);
        assert_eq!(b.nickname, "Bo!");
    }

    #[test]
    fn test_join_again_reuses_player_state() {
        let mut s = session();
        s.join(&ident(1, "ana"), None);
        let now = Instant::now();
        // Walk somewhere first so position differs from spawn.
        let _ = s.apply_move(UserId(1), "s", now);
        let before = s.player(UserId(1)).unwrap().clone();

        let after = s.join(&ident(1, "ana"), Some("Ana2".into())).clone();

        assert_eq!((after.x, after.y), (before.x, before.y));
        assert_eq!(after.moves, before.moves);
        assert_eq!(after.nickname, "Ana2");
        assert_eq!(s.order.len(), 1, "no duplicate roster entry");
    }

    #[test]
    fn test_apply_move_unknown_action_rejected() {
        let mut s = session();
        s.join(&ident(1, "ana"), None);
        let result = s.apply_move(UserId(1), "teleport", Instant::now());
        assert!(matches!(result, Err(GameError::InvalidAction(_))));
    }

    #[test]
    fn test_apply_move_unknown_player_rejected() {
        let mut s = session();
        let result = s.apply_move(UserId(9), "w", Instant::now());
        assert!(matches!(result, Err(GameError::UnknownPlayer(u)) if u == UserId(9)));
    }

    #[test]
    fn test_apply_move_within_interval_is_throttled_noop() {
        let mut s = session();
        s.join(&ident(1, "ana"), None);
        let t0 = Instant::now();

        // First move accepted (some outcome that stamps the clock).
        let first = s.apply_move(UserId(1), "s", t0).unwrap();
        assert!(matches!(first, MoveOutcome::Moved | MoveOutcome::Blocked));
        let pos = {
            let p = s.player(UserId(1)).unwrap();
            (p.x, p.y, p.moves)
        };

        // 50ms later, interval is 200ms: throttled, nothing changes.
        let second = s
            .apply_move(UserId(1), "s", t0 + Duration::from_millis(50))
            .unwrap();
        match second {
            MoveOutcome::Throttled { wait } => {
                assert!(wait > Duration::ZERO);
                assert!(wait <= Duration::from_millis(150));
            }
            other => panic!("expected Throttled, got {other:?}"),
        }
        let p = s.player(UserId(1)).unwrap();
        assert_eq!((p.x, p.y, p.moves), pos, "throttled move mutates nothing");

        // Past the interval the next move is accepted again.
        let third = s
            .apply_move(UserId(1), "s", t0 + Duration::from_millis(250))
            .unwrap();
        assert!(matches!(third, MoveOutcome::Moved | MoveOutcome::Blocked));
    }

    #[test]
    fn test_apply_move_into_wall_bumps_without_moving() {
        let mut s = session();
        s.join(&ident(1, "ana"), None);
        let (x, y) = place_against_wall(&mut s, UserId(1));
        let moves_before = s.player(UserId(1)).unwrap().moves;
        let now = Instant::now();

        let outcome = s.apply_move(UserId(1), "arrowup", now).unwrap();

        assert_eq!(outcome, MoveOutcome::Blocked);
        let p = s.player(UserId(1)).unwrap();
        assert_eq!((p.x, p.y), (x, y), "position unchanged");
        assert_eq!(p.moves, moves_before, "move counter unchanged");
        assert_eq!(p.last_move_at, Some(now), "bump still arms the throttle");
    }

    #[test]
    fn test_reaching_end_finishes_session_once() {
        let mut s = session();
        s.join(&ident(1, "ana"), None);
        s.join(&ident(2, "bo"), None);
        let end = s.dungeon.end();

        // Teleport player 1 next to the end cell; the end always has at
        // least one floor neighbour (it is reachable).
        let approach = if s.dungeon.is_floor(end.x, end.y + 1) {
            ((end.x, end.y + 1), "w")
        } else if s.dungeon.is_floor(end.x, end.y - 1) {
            ((end.x, end.y - 1), "s")
        } else if s.dungeon.is_floor(end.x + 1, end.y) {
            ((end.x + 1, end.y), "a")
        } else {
            ((end.x - 1, end.y), "d")
        };
        {
            let p = s.players.get_mut(&UserId(1)).unwrap();
            (p.x, p.y) = approach.0;
        }

        let outcome = s.apply_move(UserId(1), approach.1, Instant::now()).unwrap();

        assert_eq!(outcome, MoveOutcome::Won);
        assert_eq!(s.phase(), GamePhase::Finished);
        assert_eq!(s.winner(), Some(UserId(1)));

        // Win is exclusive and idempotent: player 2 can no longer move,
        // and nothing about the outcome can change.
        let b_before = {
            let p = s.player(UserId(2)).unwrap();
            (p.x, p.y)
        };
        let rejected = s.apply_move(UserId(2), "w", Instant::now() + Duration::from_secs(1));
        assert!(matches!(rejected, Err(GameError::GameOver)));
        let p = s.player(UserId(2)).unwrap();
        assert_eq!((p.x, p.y), b_before);
        assert_eq!(s.winner(), Some(UserId(1)));
    }

    #[test]
    fn test_remove_last_player_empties_session() {
        let mut s = session();
        s.join(&ident(1, "ana"), None);
        assert!(s.remove(UserId(1)));
        assert!(s.is_empty());
        assert!(!s.remove(UserId(1)), "second remove is a no-op");
    }

    #[test]
    fn test_snapshot_reflects_session_state() {
        let mut s = session();
        s.join(&ident(1, "ana"), None);
        let snap = s.snapshot("welcome");

        assert_eq!(snap.room_id, RoomId(1));
        assert_eq!(snap.seed, 42);
        assert_eq!(snap.map_rows.len(), snap.height);
        assert_eq!(snap.players.len(), 1);
        assert_eq!(snap.phase, GamePhase::Playing);
        assert!(!snap.game_over);
        assert_eq!(snap.hint, "welcome");
        assert_eq!(snap.return_delay_ms, 5000);
    }

    #[test]
    fn test_round_counter_is_monotonic() {
        let mut s = session();
        let r0 = s.round();
        s.join(&ident(1, "ana"), None);
        let r1 = s.round();
        assert!(r1 > r0);
        let _ = s.apply_move(UserId(1), "s", Instant::now());
        assert!(s.round() > r1);
    }
}
