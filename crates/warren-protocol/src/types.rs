//! Core protocol types for Warren's wire format.
//!
//! Everything in this module gets serialized to JSON, sent over the
//! network, and deserialized on the other side. The exact field spellings
//! are part of the protocol contract — the tests at the bottom lock them
//! in, because a mismatch means existing clients can't parse our frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a user.
///
/// Newtype over `u64` so a `UserId` can never be confused with a [`RoomId`]
/// even though both are plain numbers underneath. `#[serde(transparent)]`
/// keeps the JSON representation a bare number: `UserId(42)` → `42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// A unique identifier for a room (one durable chat/game group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// A verified (user id, display name) pair.
///
/// Produced by the external identity store during the handshake; the core
/// trusts this pair and never re-validates credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

// ---------------------------------------------------------------------------
// Client → server frames
// ---------------------------------------------------------------------------

/// The top-level frame a client sends.
///
/// `seq` is a client-chosen correlation number: the direct
/// [`ServerFrame::Reply`] to this command echoes it back, so a client can
/// pair requests with responses even while ambient broadcasts interleave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub seq: u64,
    #[serde(flatten)]
    pub command: ClientCommand,
}

/// Every command a client can issue, tagged by its wire name.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON, e.g.:
///
/// ```json
/// { "type": "room.ready.set", "room_id": 3, "ready": true }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    /// First frame on every connection: bind an identity to it.
    /// The token is opaque to the core; the identity store verifies it.
    #[serde(rename = "auth")]
    Auth { token: String },

    /// Come online in a room's channel (lobby presence).
    #[serde(rename = "room.join")]
    RoomJoin { room_id: RoomId },

    /// Go offline in a room's channel.
    #[serde(rename = "room.leave")]
    RoomLeave { room_id: RoomId },

    /// Toggle the caller's ready flag in the lobby.
    #[serde(rename = "room.ready.set")]
    ReadySet { room_id: RoomId, ready: bool },

    /// Request the current lobby snapshot (direct reply, not a broadcast).
    #[serde(rename = "room.members.get")]
    MembersGet { room_id: RoomId },

    /// Owner-only: pass the readiness gate and announce a session seed.
    #[serde(rename = "room.game.start")]
    GameStart { room_id: RoomId },

    /// Attach to (and lazily create) the room's live game session.
    #[serde(rename = "game.join")]
    GameJoin {
        room_id: RoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nickname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },

    /// A move command for the caller's player.
    /// `room_id` may be omitted; the server then uses the session the
    /// connection is already bound to.
    #[serde(rename = "game.move")]
    GameMove {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        action: String,
    },
}

// ---------------------------------------------------------------------------
// Server → client frames
// ---------------------------------------------------------------------------

/// A direct acknowledgement of shape `{ ok, message?, ...payload }`.
///
/// Every command that expects a result gets exactly one of these, sent only
/// to the originating connection — in addition to (never instead of) the
/// ambient broadcasts the command may have triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Extra payload fields, spread into the acknowledgement object.
    /// A flattened `Option` serializes nothing when `None`.
    #[serde(flatten)]
    pub data: Option<Map<String, Value>>,
}

impl Ack {
    /// A bare success acknowledgement.
    pub fn ok() -> Self {
        Self { ok: true, message: None, data: None }
    }

    /// A success acknowledgement carrying extra payload fields.
    /// `value` must serialize to a JSON object; anything else is dropped.
    pub fn ok_with(value: Value) -> Self {
        let data = match value {
            Value::Object(map) => Some(map),
            _ => None,
        };
        Self { ok: true, message: None, data }
    }

    /// A failure acknowledgement with a human-readable message.
    pub fn err(message: impl Into<String>) -> Self {
        Self { ok: false, message: Some(message.into()), data: None }
    }
}

/// Every frame the server can send, tagged by its wire name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Direct reply to the command with the matching `seq`.
    #[serde(rename = "reply")]
    Reply {
        seq: u64,
        #[serde(flatten)]
        ack: Ack,
    },

    /// Fresh lobby snapshot, broadcast to every room subscriber after any
    /// presence or readiness change.
    #[serde(rename = "room.lobby.update")]
    LobbyUpdate { snapshot: LobbySnapshot },

    /// Human-readable room notification for transient UI/log display.
    #[serde(rename = "room.event")]
    RoomEvent {
        room_id: RoomId,
        event: RoomEventKind,
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        created_at: DateTime<Utc>,
    },

    /// The readiness gate passed: everyone should navigate to the session.
    #[serde(rename = "room.game.started")]
    GameStarted {
        room_id: RoomId,
        game_url: String,
        game_seed: u64,
        started_by: String,
        started_at: DateTime<Utc>,
    },

    /// Authoritative world-state snapshot for the room's live session.
    #[serde(rename = "game.stateUpdate")]
    GameState {
        #[serde(flatten)]
        update: GameStateUpdate,
    },
}

/// The kind of a [`ServerFrame::RoomEvent`] notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomEventKind {
    Join,
    Leave,
    Ready,
    Unready,
    GameStart,
}

impl fmt::Display for RoomEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join => write!(f, "join"),
            Self::Leave => write!(f, "leave"),
            Self::Ready => write!(f, "ready"),
            Self::Unready => write!(f, "unready"),
            Self::GameStart => write!(f, "game_start"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lobby snapshot
// ---------------------------------------------------------------------------

/// One member row in a [`LobbySnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyMember {
    pub user_id: UserId,
    pub username: String,
    pub joined_at: DateTime<Utc>,
    pub online: bool,
    /// Always `false` for offline members, regardless of any stored flag.
    pub ready: bool,
}

/// Derived view of a room's lobby: durable roster × live presence.
///
/// Computed fresh on every query/event; never cached across mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbySnapshot {
    pub room_id: RoomId,
    pub owner_id: UserId,
    pub member_count: usize,
    pub online_count: usize,
    pub ready_count: usize,
    /// `true` only when at least one member is online and every online
    /// member is ready — the readiness gate condition.
    pub all_ready: bool,
    pub members: Vec<LobbyMember>,
}

// ---------------------------------------------------------------------------
// Game state payload
// ---------------------------------------------------------------------------

/// A grid coordinate in the dungeon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPos {
    pub x: usize,
    pub y: usize,
}

/// Session phase. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Playing,
    Finished,
}

/// One player row in a [`GameStateUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub user_id: UserId,
    pub nickname: String,
    pub x: usize,
    pub y: usize,
    pub moves: u64,
    pub color: String,
}

/// The full authoritative snapshot broadcast after every accepted move
/// (and on join/leave) — the `game.stateUpdate` payload of the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateUpdate {
    pub room_id: RoomId,
    pub seed: u64,
    pub width: usize,
    pub height: usize,
    /// The grid, one string per row: `#` wall, `.` floor.
    pub map_rows: Vec<String>,
    pub end: CellPos,
    pub players: Vec<PlayerView>,
    pub round: u64,
    pub phase: GamePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<UserId>,
    /// Transient human-readable note ("bumped into wall", "Alice wins!").
    pub hint: String,
    pub game_over: bool,
    /// After a victory, how long clients should linger before navigating
    /// back to the lobby.
    pub return_delay_ms: u64,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Wire-format lock-in tests.
    //!
    //! The protocol defines exact JSON shapes; these verify that the serde
    //! attributes produce them. Naming convention:
    //! `test_{type}_{scenario}_{expected}`.

    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_user_id_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&UserId(42)).unwrap(), "42");
    }

    #[test]
    fn test_room_id_round_trips_from_plain_number() {
        let id: RoomId = serde_json::from_str("7").unwrap();
        assert_eq!(id, RoomId(7));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(UserId(3).to_string(), "U-3");
        assert_eq!(RoomId(9).to_string(), "R-9");
    }

    // =====================================================================
    // ClientFrame / ClientCommand
    // =====================================================================

    #[test]
    fn test_client_frame_room_join_json_format() {
        let frame = ClientFrame {
            seq: 5,
            command: ClientCommand::RoomJoin { room_id: RoomId(3) },
        };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["seq"], 5);
        assert_eq!(json["type"], "room.join");
        assert_eq!(json["room_id"], 3);
    }

    #[test]
    fn test_client_command_ready_set_json_format() {
        let cmd = ClientCommand::ReadySet { room_id: RoomId(1), ready: true };
        let json: Value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "room.ready.set");
        assert_eq!(json["ready"], true);
    }

    #[test]
    fn test_client_command_game_join_optional_fields_omitted() {
        let cmd = ClientCommand::GameJoin {
            room_id: RoomId(2),
            nickname: None,
            seed: None,
        };
        let json: Value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "game.join");
        assert!(json.get("nickname").is_none());
        assert!(json.get("seed").is_none());
    }

    #[test]
    fn test_client_command_game_join_parses_without_optionals() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"seq": 1, "type": "game.join", "room_id": 4}"#,
        )
        .unwrap();
        assert_eq!(
            frame.command,
            ClientCommand::GameJoin { room_id: RoomId(4), nickname: None, seed: None }
        );
    }

    #[test]
    fn test_client_command_game_move_round_trip() {
        let cmd = ClientCommand::GameMove {
            room_id: Some(RoomId(8)),
            action: "ArrowUp".into(),
        };
        let bytes = serde_json::to_vec(&cmd).unwrap();
        let decoded: ClientCommand = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(cmd, decoded);
    }

    #[test]
    fn test_client_command_unknown_type_fails() {
        let result: Result<ClientCommand, _> =
            serde_json::from_str(r#"{"type": "room.explode", "room_id": 1}"#);
        assert!(result.is_err());
    }

    // =====================================================================
    // Ack / Reply
    // =====================================================================

    #[test]
    fn test_ack_ok_with_spreads_payload_fields() {
        let ack = Ack::ok_with(serde_json::json!({"game_seed": 42}));
        let json: Value = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["ok"], true);
        // Payload fields are spread flat, not nested under "data".
        assert_eq!(json["game_seed"], 42);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_ack_err_carries_message_only() {
        let ack = Ack::err("not a member");
        let json: Value = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["message"], "not a member");
    }

    #[test]
    fn test_reply_frame_echoes_seq() {
        let frame = ServerFrame::Reply { seq: 11, ack: Ack::ok() };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "reply");
        assert_eq!(json["seq"], 11);
        assert_eq!(json["ok"], true);
    }

    // =====================================================================
    // Broadcast frames
    // =====================================================================

    #[test]
    fn test_room_event_json_format() {
        let frame = ServerFrame::RoomEvent {
            room_id: RoomId(3),
            event: RoomEventKind::GameStart,
            username: "ana".into(),
            content: None,
            created_at: ts(),
        };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "room.event");
        assert_eq!(json["event"], "game_start");
        assert_eq!(json["username"], "ana");
        assert!(json.get("content").is_none());
    }

    #[test]
    fn test_lobby_update_round_trip() {
        let frame = ServerFrame::LobbyUpdate {
            snapshot: LobbySnapshot {
                room_id: RoomId(1),
                owner_id: UserId(10),
                member_count: 2,
                online_count: 1,
                ready_count: 0,
                all_ready: false,
                members: vec![LobbyMember {
                    user_id: UserId(10),
                    username: "ana".into(),
                    joined_at: ts(),
                    online: true,
                    ready: false,
                }],
            },
        };
        let bytes = serde_json::to_vec(&frame).unwrap();
        let decoded: ServerFrame = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_game_state_update_flattens_into_frame() {
        let frame = ServerFrame::GameState {
            update: GameStateUpdate {
                room_id: RoomId(2),
                seed: 42,
                width: 31,
                height: 21,
                map_rows: vec!["###".into()],
                end: CellPos { x: 5, y: 6 },
                players: vec![],
                round: 3,
                phase: GamePhase::Playing,
                winner: None,
                hint: String::new(),
                game_over: false,
                return_delay_ms: 5000,
            },
        };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "game.stateUpdate");
        assert_eq!(json["seed"], 42);
        assert_eq!(json["phase"], "playing");
        assert_eq!(json["end"]["x"], 5);
        assert!(json.get("winner").is_none());
    }

    #[test]
    fn test_game_phase_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&GamePhase::Finished).unwrap(),
            "\"finished\""
        );
    }

    // =====================================================================
    // Malformed input
    // =====================================================================

    #[test]
    fn test_decode_garbage_returns_error() {
        let result: Result<ClientFrame, _> =
            serde_json::from_slice(b"not json at all");
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_missing_seq_returns_error() {
        let result: Result<ClientFrame, _> =
            serde_json::from_str(r#"{"type": "room.join", "room_id": 1}"#);
        assert!(result.is_err());
    }
}
