//! The room actor: one Tokio task per active room.
//!
//! The actor owns the room's presence, the optional game session, and the
//! outbound sender of every subscribed connection. Commands are handled
//! to completion in arrival order; between two commands nothing else can
//! touch the room, so every snapshot a client sees corresponds to a real,
//! whole state of the world.
//!
//! Replies travel over a `oneshot` channel embedded in each command:
//! the gateway sends a command and awaits the response.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use rand::Rng;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use warren_game::{GameConfig, GameSession, MoveOutcome};
use warren_lobby::{LobbyError, Presence, RoomRoster, game_url, snapshot, try_start};
use warren_protocol::{Ack, Identity, RoomEventKind, RoomId, ServerFrame, UserId};

use crate::RoomError;

/// Channel sender delivering outbound frames to one connection's writer.
pub type ClientSender = mpsc::UnboundedSender<ServerFrame>;

/// The outcome of a room command.
#[derive(Debug)]
pub struct RoomReply {
    /// The direct acknowledgement for the originating connection.
    pub ack: Ack,
    /// `true` when the room is now vacant — no one online and no game
    /// session. The registry reaps the actor on seeing this.
    pub vacated: bool,
    /// `true` when this command caused a genuine presence transition
    /// (offline→online or online→offline). The gateway mirrors those to
    /// the durable event log; idempotent repeats stay `false`.
    pub transitioned: bool,
}

/// Commands sent to a room actor.
///
/// Rosters are resolved by the gateway *before* a command is sent (the
/// membership store is the only thing allowed to suspend), so the actor
/// itself never awaits anything but its own channel. Lobby commands that
/// run during cleanup carry `Option<RoomRoster>` — cleanup proceeds even
/// when the store is down, just without a roster-shaped broadcast.
pub(crate) enum RoomCommand {
    Join {
        identity: Identity,
        roster: RoomRoster,
        sender: ClientSender,
        reply: oneshot::Sender<RoomReply>,
    },
    Leave {
        identity: Identity,
        roster: Option<RoomRoster>,
        reply: oneshot::Sender<RoomReply>,
    },
    SetReady {
        identity: Identity,
        ready: bool,
        roster: RoomRoster,
        reply: oneshot::Sender<RoomReply>,
    },
    Members {
        roster: RoomRoster,
        reply: oneshot::Sender<RoomReply>,
    },
    StartGame {
        identity: Identity,
        roster: RoomRoster,
        reply: oneshot::Sender<RoomReply>,
    },
    JoinGame {
        identity: Identity,
        nickname: Option<String>,
        seed: Option<u64>,
        sender: ClientSender,
        reply: oneshot::Sender<RoomReply>,
    },
    LeaveGame {
        user: UserId,
        reply: oneshot::Sender<RoomReply>,
    },
    Move {
        user: UserId,
        action: String,
        reply: oneshot::Sender<RoomReply>,
    },
    Disconnect {
        identity: Identity,
        roster: Option<RoomRoster>,
        reply: oneshot::Sender<RoomReply>,
    },
    Shutdown,
}

/// Handle to a running room actor. Cheap to clone — it wraps an
/// `mpsc::Sender`. The [`RoomRegistry`](crate::RoomRegistry) holds one
/// per room.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<RoomReply>) -> RoomCommand,
    ) -> Result<RoomReply, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    pub async fn join(
        &self,
        identity: Identity,
        roster: RoomRoster,
        sender: ClientSender,
    ) -> Result<RoomReply, RoomError> {
        self.request(|reply| RoomCommand::Join { identity, roster, sender, reply })
            .await
    }

    pub async fn leave(
        &self,
        identity: Identity,
        roster: Option<RoomRoster>,
    ) -> Result<RoomReply, RoomError> {
        self.request(|reply| RoomCommand::Leave { identity, roster, reply })
            .await
    }

    pub async fn set_ready(
        &self,
        identity: Identity,
        ready: bool,
        roster: RoomRoster,
    ) -> Result<RoomReply, RoomError> {
        self.request(|reply| RoomCommand::SetReady { identity, ready, roster, reply })
            .await
    }

    pub async fn members(&self, roster: RoomRoster) -> Result<RoomReply, RoomError> {
        self.request(|reply| RoomCommand::Members { roster, reply }).await
    }

    pub async fn start_game(
        &self,
        identity: Identity,
        roster: RoomRoster,
    ) -> Result<RoomReply, RoomError> {
        self.request(|reply| RoomCommand::StartGame { identity, roster, reply })
            .await
    }

    pub async fn join_game(
        &self,
        identity: Identity,
        nickname: Option<String>,
        seed: Option<u64>,
        sender: ClientSender,
    ) -> Result<RoomReply, RoomError> {
        self.request(|reply| RoomCommand::JoinGame {
            identity,
            nickname,
            seed,
            sender,
            reply,
        })
        .await
    }

    pub async fn leave_game(&self, user: UserId) -> Result<RoomReply, RoomError> {
        self.request(|reply| RoomCommand::LeaveGame { user, reply }).await
    }

    pub async fn game_move(
        &self,
        user: UserId,
        action: String,
    ) -> Result<RoomReply, RoomError> {
        self.request(|reply| RoomCommand::Move { user, action, reply }).await
    }

    pub async fn disconnect(
        &self,
        identity: Identity,
        roster: Option<RoomRoster>,
    ) -> Result<RoomReply, RoomError> {
        self.request(|reply| RoomCommand::Disconnect { identity, roster, reply })
            .await
    }

    /// Tells the room to shut down. Fire-and-forget.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }
}

/// The internal actor state. Runs inside a Tokio task.
struct RoomActor {
    room_id: RoomId,
    presence: Presence,
    session: Option<GameSession>,
    /// Outbound channel per subscribed user. An entry lives while the
    /// user is online in the lobby or has a player in the session.
    senders: HashMap<UserId, ClientSender>,
    game_config: GameConfig,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join { identity, roster, sender, reply } => {
                    let (ack, transitioned) = self.handle_join(identity, &roster, sender);
                    self.respond_with(reply, ack, transitioned);
                }
                RoomCommand::Leave { identity, roster, reply } => {
                    let (ack, transitioned) = self.handle_leave(&identity, roster.as_ref());
                    self.respond_with(reply, ack, transitioned);
                }
                RoomCommand::SetReady { identity, ready, roster, reply } => {
                    let ack = self.handle_set_ready(&identity, ready, &roster);
                    self.respond(reply, ack);
                }
                RoomCommand::Members { roster, reply } => {
                    let ack = self.handle_members(&roster);
                    self.respond(reply, ack);
                }
                RoomCommand::StartGame { identity, roster, reply } => {
                    let ack = self.handle_start(&identity, &roster);
                    self.respond(reply, ack);
                }
                RoomCommand::JoinGame { identity, nickname, seed, sender, reply } => {
                    let ack = self.handle_join_game(&identity, nickname, seed, sender);
                    self.respond(reply, ack);
                }
                RoomCommand::LeaveGame { user, reply } => {
                    let ack = self.handle_leave_game(user);
                    self.respond(reply, ack);
                }
                RoomCommand::Move { user, action, reply } => {
                    let ack = self.handle_move(user, &action);
                    self.respond(reply, ack);
                }
                RoomCommand::Disconnect { identity, roster, reply } => {
                    let (ack, transitioned) = self.handle_disconnect(&identity, roster.as_ref());
                    self.respond_with(reply, ack, transitioned);
                }
                RoomCommand::Shutdown => {
                    tracing::info!(room_id = %self.room_id, "room shutting down");
                    break;
                }
            }
        }

        tracing::info!(room_id = %self.room_id, "room actor stopped");
    }

    fn respond(&self, reply: oneshot::Sender<RoomReply>, ack: Ack) {
        self.respond_with(reply, ack, false);
    }

    fn respond_with(&self, reply: oneshot::Sender<RoomReply>, ack: Ack, transitioned: bool) {
        let vacated = self.presence.is_empty() && self.session.is_none();
        let _ = reply.send(RoomReply { ack, vacated, transitioned });
    }

    // -- lobby ------------------------------------------------------------

    fn handle_join(
        &mut self,
        identity: Identity,
        roster: &RoomRoster,
        sender: ClientSender,
    ) -> (Ack, bool) {
        self.senders.insert(identity.user_id, sender);

        // Idempotent: only a genuine offline→online transition announces
        // anything. A repeat join neither resets the ready flag nor
        // re-emits the join event.
        let fresh = self.presence.join(identity.user_id);
        if fresh {
            tracing::info!(
                room_id = %self.room_id,
                user = %identity.user_id,
                online = self.presence.online_count(),
                "user joined room"
            );
            self.emit_event(RoomEventKind::Join, &identity.username);
            self.broadcast_lobby(roster);
        }
        (Ack::ok(), fresh)
    }

    fn handle_leave(&mut self, identity: &Identity, roster: Option<&RoomRoster>) -> (Ack, bool) {
        let was_online = self.presence.leave(identity.user_id);
        if was_online {
            tracing::info!(
                room_id = %self.room_id,
                user = %identity.user_id,
                online = self.presence.online_count(),
                "user left room"
            );
            self.emit_event(RoomEventKind::Leave, &identity.username);
            if let Some(roster) = roster {
                self.broadcast_lobby(roster);
            }
        }
        self.drop_sender_if_detached(identity.user_id);
        (Ack::ok(), was_online)
    }

    fn handle_set_ready(
        &mut self,
        identity: &Identity,
        ready: bool,
        roster: &RoomRoster,
    ) -> Ack {
        match self.presence.set_ready(identity.user_id, ready) {
            Ok(()) => {
                let kind = if ready { RoomEventKind::Ready } else { RoomEventKind::Unready };
                self.emit_event(kind, &identity.username);
                self.broadcast_lobby(roster);
                Ack::ok_with(json!({ "ready": ready }))
            }
            Err(e) => Ack::err(e.to_string()),
        }
    }

    fn handle_members(&self, roster: &RoomRoster) -> Ack {
        let snap = snapshot(roster, &self.presence);
        match serde_json::to_value(&snap) {
            Ok(value) => Ack::ok_with(value),
            Err(e) => {
                // A stale ack beats a dropped connection.
                tracing::error!(room_id = %self.room_id, error = %e, "snapshot encode failed");
                Ack::ok()
            }
        }
    }

    fn handle_start(&mut self, identity: &Identity, roster: &RoomRoster) -> Ack {
        let snap = snapshot(roster, &self.presence);
        if let Err(e) = try_start(&snap, identity.user_id) {
            let mut ack = Ack::err(e.to_string());
            if let LobbyError::NotAllReady(names) = &e {
                if let serde_json::Value::Object(map) = json!({ "not_ready": names }) {
                    ack.data = Some(map);
                }
            }
            return ack;
        }

        // Gate passed: announce a fresh seed. The session itself is
        // created lazily on the first game.join, which keeps lobby start
        // decoupled from session bootstrap.
        let seed: u64 = rand::rng().random();
        let url = game_url(self.room_id, seed);
        let started_at = Utc::now();
        tracing::info!(
            room_id = %self.room_id,
            user = %identity.user_id,
            seed,
            "game start announced"
        );
        self.emit_event(RoomEventKind::GameStart, &identity.username);
        self.broadcast(ServerFrame::GameStarted {
            room_id: self.room_id,
            game_url: url.clone(),
            game_seed: seed,
            started_by: identity.username.clone(),
            started_at,
        });
        Ack::ok_with(json!({ "game_url": url, "game_seed": seed }))
    }

    // -- game -------------------------------------------------------------

    fn handle_join_game(
        &mut self,
        identity: &Identity,
        nickname: Option<String>,
        seed: Option<u64>,
        sender: ClientSender,
    ) -> Ack {
        self.senders.insert(identity.user_id, sender);

        if self.session.is_none() {
            let seed = seed.unwrap_or_else(|| derived_seed(self.room_id));
            self.session =
                Some(GameSession::new(self.room_id, seed, self.game_config.clone()));
        }
        let session = match self.session.as_mut() {
            Some(s) => s,
            None => return Ack::err("session unavailable"),
        };

        let nickname = session.join(identity, nickname).nickname.clone();
        let seed = session.seed();
        let update = session.snapshot(format!("{nickname} joined the race"));
        self.broadcast(ServerFrame::GameState { update });
        Ack::ok_with(json!({ "seed": seed }))
    }

    fn handle_leave_game(&mut self, user: UserId) -> Ack {
        let mut update = None;
        let mut destroy = false;

        if let Some(session) = self.session.as_mut() {
            let nickname = session.player(user).map(|p| p.nickname.clone());
            if session.remove(user) {
                if session.is_empty() {
                    destroy = true;
                } else {
                    let nickname = nickname.unwrap_or_default();
                    update =
                        Some(session.snapshot(format!("{nickname} left the race")));
                }
            }
        }

        if destroy {
            // Last player gone: the dungeon is regenerated from scratch
            // on the next join. Sessions are never persisted.
            self.session = None;
            tracing::info!(room_id = %self.room_id, "game session destroyed");
        }
        if let Some(update) = update {
            self.broadcast(ServerFrame::GameState { update });
        }
        self.drop_sender_if_detached(user);
        Ack::ok()
    }

    fn handle_move(&mut self, user: UserId, action: &str) -> Ack {
        let session = match self.session.as_mut() {
            Some(s) => s,
            None => return Ack::err("no active game session"),
        };

        let (ack, update) = match session.apply_move(user, action, Instant::now()) {
            Ok(MoveOutcome::Moved) => (
                Ack::ok_with(json!({ "outcome": "moved" })),
                Some(session.snapshot("")),
            ),
            Ok(MoveOutcome::Won) => {
                let nickname = session
                    .player(user)
                    .map(|p| p.nickname.clone())
                    .unwrap_or_default();
                (
                    Ack::ok_with(json!({ "outcome": "won" })),
                    Some(session.snapshot(format!("{nickname} reached the exit!"))),
                )
            }
            Ok(MoveOutcome::Blocked) => (
                Ack::ok_with(json!({ "outcome": "blocked" })),
                Some(session.snapshot("bumped into wall")),
            ),
            // Throttled is a soft rejection: acknowledged, no state
            // change, no broadcast.
            Ok(MoveOutcome::Throttled { wait }) => (
                Ack::ok_with(json!({
                    "outcome": "throttled",
                    "wait_ms": wait.as_millis() as u64,
                })),
                None,
            ),
            Err(e) => (Ack::err(e.to_string()), None),
        };

        if let Some(update) = update {
            self.broadcast(ServerFrame::GameState { update });
        }
        ack
    }

    fn handle_disconnect(
        &mut self,
        identity: &Identity,
        roster: Option<&RoomRoster>,
    ) -> (Ack, bool) {
        // A disconnect is just an event that runs the same cleanup as
        // explicit leaves, for both the lobby and the session.
        let (_, transitioned) = self.handle_leave(identity, roster);
        self.handle_leave_game(identity.user_id);
        self.senders.remove(&identity.user_id);
        (Ack::ok(), transitioned)
    }

    // -- broadcast --------------------------------------------------------

    fn broadcast_lobby(&self, roster: &RoomRoster) {
        let snap = snapshot(roster, &self.presence);
        self.broadcast(ServerFrame::LobbyUpdate { snapshot: snap });
    }

    fn emit_event(&self, event: RoomEventKind, username: &str) {
        self.broadcast(ServerFrame::RoomEvent {
            room_id: self.room_id,
            event,
            username: username.to_string(),
            content: None,
            created_at: Utc::now(),
        });
    }

    /// Fans a frame out to every subscribed connection. A closed receiver
    /// just means that writer is gone; its user will be cleaned up by the
    /// disconnect path.
    fn broadcast(&self, frame: ServerFrame) {
        for sender in self.senders.values() {
            let _ = sender.send(frame.clone());
        }
    }

    fn drop_sender_if_detached(&mut self, user: UserId) {
        let in_game = self
            .session
            .as_ref()
            .map(|s| s.player(user).is_some())
            .unwrap_or(false);
        if !self.presence.is_online(user) && !in_game {
            self.senders.remove(&user);
        }
    }
}

/// The default seed when `game.join` arrives without one (a client that
/// skipped the lobby announcement). Derived from the room id so every
/// such client still lands in the same dungeon.
fn derived_seed(room_id: RoomId) -> u64 {
    room_id.0.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Spawns a room actor task and returns its handle.
///
/// `channel_size` bounds the command queue: when it fills up, senders
/// wait, which is the backpressure story for a hot room.
pub fn spawn_room(
    room_id: RoomId,
    game_config: GameConfig,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let actor = RoomActor {
        room_id,
        presence: Presence::new(),
        session: None,
        senders: HashMap::new(),
        game_config,
        receiver: rx,
    };
    tokio::spawn(actor.run());
    RoomHandle { room_id, sender: tx }
}
