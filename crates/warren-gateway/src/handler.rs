//! Per-connection handling: auth handshake, command dispatch, cleanup.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The flow:
//!
//! 1. Receive the `auth` frame → identity store verifies the token.
//! 2. Spawn a writer task: one unbounded channel drains into the socket,
//!    so direct replies and room broadcasts form a single ordered stream.
//! 3. Loop: decode frames, resolve membership, route to room actors.
//! 4. On close or error, run the disconnect path — the same leave
//!    semantics as explicit commands, for every room this connection
//!    touched.
//!
//! Authorization happens *here*, before a command reaches an actor: the
//! membership lookup is the only suspending call, and no in-memory state
//! is touched until it resolves. Handlers hold the registry lock across
//! the actor round-trip, which keeps room mutations globally one-at-a-time
//! and makes vacancy reaping race-free.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Mutex, mpsc};

use warren_lobby::{EventLog, MembershipStore, RoomRoster};
use warren_protocol::{
    Ack, ClientCommand, ClientFrame, Codec, Identity, JsonCodec, RoomEventKind,
    RoomId, ServerFrame, UserId,
};
use warren_room::{ClientSender, RoomError, RoomRegistry};

use crate::{GatewayError, IdentityProvider, WsConnection};

/// How long a fresh connection has to present its `auth` frame.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared server state handed to every connection task.
pub(crate) struct ServerState<I, M, E> {
    pub(crate) registry: Mutex<RoomRegistry>,
    pub(crate) identity: I,
    pub(crate) membership: M,
    pub(crate) events: E,
    pub(crate) codec: JsonCodec,
}

/// Connection-local bookkeeping after a successful handshake.
struct ConnSession {
    identity: Identity,
    /// Lobbies this connection is online in (several are allowed).
    joined_rooms: HashSet<RoomId>,
    /// The one game session this connection is attached to, if any.
    game_room: Option<RoomId>,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<I, M, E>(
    conn: WsConnection,
    state: Arc<ServerState<I, M, E>>,
) -> Result<(), GatewayError>
where
    I: IdentityProvider,
    M: MembershipStore,
    E: EventLog,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();

    let (auth_seq, identity) = authenticate(&conn, &state).await?;
    tracing::info!(%conn_id, user = %identity.user_id, username = %identity.username, "authenticated");

    // One ordered outbound stream per connection. Room actors get clones
    // of this sender; the writer task is the only thing touching the
    // socket's sink.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let writer = {
        let conn = Arc::clone(&conn);
        let codec = state.codec;
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                match codec.encode(&frame) {
                    Ok(bytes) => {
                        if conn.send(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // Skip the frame; the connection outlives it.
                        tracing::error!(error = %e, "outbound frame encode failed");
                    }
                }
            }
        })
    };

    send_reply(
        &out_tx,
        auth_seq,
        Ack::ok_with(json!({
            "user_id": identity.user_id,
            "username": identity.username,
        })),
    );

    let mut session = ConnSession {
        identity,
        joined_rooms: HashSet::new(),
        game_room: None,
    };

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        let frame: ClientFrame = match state.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "undecodable frame, skipping");
                continue;
            }
        };

        dispatch(&state, &mut session, &out_tx, frame).await;
    }

    cleanup(&state, &session).await;
    writer.abort();
    Ok(())
}

/// Receives and verifies the mandatory first `auth` frame.
async fn authenticate<I, M, E>(
    conn: &WsConnection,
    state: &Arc<ServerState<I, M, E>>,
) -> Result<(u64, Identity), GatewayError>
where
    I: IdentityProvider,
    M: MembershipStore,
    E: EventLog,
{
    let data = tokio::time::timeout(AUTH_TIMEOUT, conn.recv())
        .await
        .map_err(|_| GatewayError::Auth("auth handshake timed out".into()))??
        .ok_or_else(|| GatewayError::Auth("closed before auth".into()))?;

    let frame: ClientFrame = state.codec.decode(&data)?;
    let ClientCommand::Auth { token } = frame.command else {
        refuse(conn, state, frame.seq, "first frame must be auth").await;
        return Err(GatewayError::Auth("first frame must be auth".into()));
    };

    match state.identity.verify(&token).await {
        Ok(identity) => Ok((frame.seq, identity)),
        Err(e) => {
            refuse(conn, state, frame.seq, "authentication failed").await;
            Err(e)
        }
    }
}

/// Best-effort direct refusal before the writer task exists.
async fn refuse<I, M, E>(
    conn: &WsConnection,
    state: &Arc<ServerState<I, M, E>>,
    seq: u64,
    message: &str,
) {
    let reply = ServerFrame::Reply { seq, ack: Ack::err(message) };
    if let Ok(bytes) = state.codec.encode(&reply) {
        let _ = conn.send(&bytes).await;
    }
}

/// Routes one decoded frame and always answers it with a direct reply.
async fn dispatch<I, M, E>(
    state: &Arc<ServerState<I, M, E>>,
    session: &mut ConnSession,
    out: &ClientSender,
    frame: ClientFrame,
) where
    I: IdentityProvider,
    M: MembershipStore,
    E: EventLog,
{
    let seq = frame.seq;
    let ack = match frame.command {
        ClientCommand::Auth { .. } => Ack::err("already authenticated"),
        ClientCommand::RoomJoin { room_id } => {
            room_join(state, session, out, room_id).await
        }
        ClientCommand::RoomLeave { room_id } => {
            room_leave(state, session, room_id).await
        }
        ClientCommand::ReadySet { room_id, ready } => {
            ready_set(state, session, room_id, ready).await
        }
        ClientCommand::MembersGet { room_id } => {
            members_get(state, session, room_id).await
        }
        ClientCommand::GameStart { room_id } => {
            game_start(state, session, room_id).await
        }
        ClientCommand::GameJoin { room_id, nickname, seed } => {
            game_join(state, session, out, room_id, nickname, seed).await
        }
        ClientCommand::GameMove { room_id, action } => {
            game_move(state, session, room_id, &action).await
        }
    };
    send_reply(out, seq, ack);
}

fn send_reply(out: &ClientSender, seq: u64, ack: Ack) {
    let _ = out.send(ServerFrame::Reply { seq, ack });
}

/// Resolves a room's durable roster.
///
/// # Errors
/// - [`RoomError::InvalidRoomId`] for the zero id or an unknown room.
/// - [`RoomError::UpstreamUnavailable`] when the store cannot be
///   reached — nothing in memory has been touched yet.
async fn fetch_roster<M: MembershipStore>(
    membership: &M,
    room_id: RoomId,
) -> Result<RoomRoster, RoomError> {
    if room_id.0 == 0 {
        return Err(RoomError::InvalidRoomId(room_id));
    }
    match membership.roster(room_id).await {
        Ok(Some(roster)) => Ok(roster),
        Ok(None) => Err(RoomError::InvalidRoomId(room_id)),
        Err(e) => {
            tracing::warn!(%room_id, error = %e, "membership lookup failed");
            Err(RoomError::UpstreamUnavailable)
        }
    }
}

fn require_member(roster: &RoomRoster, user: UserId) -> Result<(), RoomError> {
    if roster.members.iter().any(|m| m.user_id == user) {
        Ok(())
    } else {
        Err(RoomError::Unauthorized(roster.room_id))
    }
}

/// The acknowledgement a routing failure turns into. Reported to the
/// originating connection only, never broadcast.
fn deny(e: RoomError) -> Ack {
    match &e {
        RoomError::InvalidRoomId(_) => Ack::err("invalid room id"),
        RoomError::Unauthorized(_) => Ack::err("not a member of this room"),
        RoomError::UpstreamUnavailable => Ack::err("service unavailable"),
        RoomError::Unavailable(room_id) => {
            tracing::warn!(%room_id, "room actor unavailable");
            Ack::err("room unavailable")
        }
    }
}

async fn log_event<E: EventLog>(
    events: &E,
    room_id: RoomId,
    kind: RoomEventKind,
    identity: &Identity,
) {
    if let Err(e) = events.append(room_id, kind, identity).await {
        tracing::warn!(%room_id, error = %e, "event log append failed");
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn room_join<I, M, E>(
    state: &Arc<ServerState<I, M, E>>,
    session: &mut ConnSession,
    out: &ClientSender,
    room_id: RoomId,
) -> Ack
where
    I: IdentityProvider,
    M: MembershipStore,
    E: EventLog,
{
    let roster = match fetch_roster(&state.membership, room_id).await {
        Ok(roster) => roster,
        Err(e) => return deny(e),
    };
    if let Err(e) = require_member(&roster, session.identity.user_id) {
        return deny(e);
    }

    let reply = {
        let mut registry = state.registry.lock().await;
        let handle = registry.get_or_spawn(room_id);
        match handle.join(session.identity.clone(), roster, out.clone()).await {
            Ok(reply) => reply,
            Err(e) => return deny(e),
        }
    };
    session.joined_rooms.insert(room_id);
    if reply.transitioned {
        log_event(&state.events, room_id, RoomEventKind::Join, &session.identity).await;
    }
    reply.ack
}

async fn room_leave<I, M, E>(
    state: &Arc<ServerState<I, M, E>>,
    session: &mut ConnSession,
    room_id: RoomId,
) -> Ack
where
    I: IdentityProvider,
    M: MembershipStore,
    E: EventLog,
{
    // Leaving needs no authorization; the roster is only for the lobby
    // broadcast, and cleanup must proceed even if the store is down.
    let roster = match state.membership.roster(room_id).await {
        Ok(roster) => roster,
        Err(e) => {
            tracing::warn!(%room_id, error = %e, "roster unavailable during leave");
            None
        }
    };

    session.joined_rooms.remove(&room_id);
    let reply = {
        let mut registry = state.registry.lock().await;
        let Some(handle) = registry.handle(room_id) else {
            return Ack::ok();
        };
        match handle.leave(session.identity.clone(), roster).await {
            Ok(reply) => {
                if reply.vacated {
                    registry.reap(room_id).await;
                }
                reply
            }
            Err(e) => return deny(e),
        }
    };
    if reply.transitioned {
        log_event(&state.events, room_id, RoomEventKind::Leave, &session.identity).await;
    }
    reply.ack
}

async fn ready_set<I, M, E>(
    state: &Arc<ServerState<I, M, E>>,
    session: &ConnSession,
    room_id: RoomId,
    ready: bool,
) -> Ack
where
    I: IdentityProvider,
    M: MembershipStore,
    E: EventLog,
{
    let roster = match fetch_roster(&state.membership, room_id).await {
        Ok(roster) => roster,
        Err(e) => return deny(e),
    };
    if let Err(e) = require_member(&roster, session.identity.user_id) {
        return deny(e);
    }

    let registry = state.registry.lock().await;
    // No actor means nobody is online in this room, the caller included.
    let Some(handle) = registry.handle(room_id) else {
        return Ack::err("not online in this room");
    };
    match handle.set_ready(session.identity.clone(), ready, roster).await {
        Ok(reply) => reply.ack,
        Err(e) => deny(e),
    }
}

async fn members_get<I, M, E>(
    state: &Arc<ServerState<I, M, E>>,
    session: &ConnSession,
    room_id: RoomId,
) -> Ack
where
    I: IdentityProvider,
    M: MembershipStore,
    E: EventLog,
{
    let roster = match fetch_roster(&state.membership, room_id).await {
        Ok(roster) => roster,
        Err(e) => return deny(e),
    };
    if let Err(e) = require_member(&roster, session.identity.user_id) {
        return deny(e);
    }

    let mut registry = state.registry.lock().await;
    let handle = registry.get_or_spawn(room_id);
    match handle.members(roster).await {
        Ok(reply) => {
            // A query may have spawned an actor for an empty room.
            if reply.vacated {
                registry.reap(room_id).await;
            }
            reply.ack
        }
        Err(e) => deny(e),
    }
}

async fn game_start<I, M, E>(
    state: &Arc<ServerState<I, M, E>>,
    session: &ConnSession,
    room_id: RoomId,
) -> Ack
where
    I: IdentityProvider,
    M: MembershipStore,
    E: EventLog,
{
    let roster = match fetch_roster(&state.membership, room_id).await {
        Ok(roster) => roster,
        Err(e) => return deny(e),
    };
    if let Err(e) = require_member(&roster, session.identity.user_id) {
        return deny(e);
    }

    let ack = {
        let mut registry = state.registry.lock().await;
        let handle = registry.get_or_spawn(room_id);
        match handle.start_game(session.identity.clone(), roster).await {
            Ok(reply) => {
                if reply.vacated {
                    registry.reap(room_id).await;
                }
                reply.ack
            }
            Err(e) => return deny(e),
        }
    };
    if ack.ok {
        log_event(&state.events, room_id, RoomEventKind::GameStart, &session.identity)
            .await;
    }
    ack
}

async fn game_join<I, M, E>(
    state: &Arc<ServerState<I, M, E>>,
    session: &mut ConnSession,
    out: &ClientSender,
    room_id: RoomId,
    nickname: Option<String>,
    seed: Option<u64>,
) -> Ack
where
    I: IdentityProvider,
    M: MembershipStore,
    E: EventLog,
{
    let roster = match fetch_roster(&state.membership, room_id).await {
        Ok(roster) => roster,
        Err(e) => return deny(e),
    };
    if let Err(e) = require_member(&roster, session.identity.user_id) {
        return deny(e);
    }

    let user = session.identity.user_id;
    let mut registry = state.registry.lock().await;

    // A user owns at most one player across all sessions: switching
    // rooms detaches them from the previous session first, with full
    // leave semantics (the old session dies with its last player).
    if let Some(previous) = registry.bind_game(user, room_id) {
        if let Some(prev_handle) = registry.handle(previous) {
            match prev_handle.leave_game(user).await {
                Ok(reply) => {
                    if reply.vacated {
                        registry.reap(previous).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(room_id = %previous, error = %e, "detach from previous session failed");
                }
            }
        }
    }

    let handle = registry.get_or_spawn(room_id);
    match handle
        .join_game(session.identity.clone(), nickname, seed, out.clone())
        .await
    {
        Ok(reply) => {
            session.game_room = Some(room_id);
            reply.ack
        }
        Err(e) => {
            registry.unbind_game(user);
            deny(e)
        }
    }
}

async fn game_move<I, M, E>(
    state: &Arc<ServerState<I, M, E>>,
    session: &ConnSession,
    room_id: Option<RoomId>,
    action: &str,
) -> Ack
where
    I: IdentityProvider,
    M: MembershipStore,
    E: EventLog,
{
    let user = session.identity.user_id;
    let registry = state.registry.lock().await;
    let target = room_id
        .or(session.game_room)
        .or_else(|| registry.game_room(user));
    let Some(target) = target else {
        return Ack::err("not in a game session");
    };
    let Some(handle) = registry.handle(target) else {
        return Ack::err("no active game session");
    };
    match handle.game_move(user, action.to_string()).await {
        Ok(reply) => reply.ack,
        Err(e) => deny(e),
    }
}

/// The disconnect path: the same cleanup as explicit leaves, for every
/// room this connection touched.
async fn cleanup<I, M, E>(state: &Arc<ServerState<I, M, E>>, session: &ConnSession)
where
    I: IdentityProvider,
    M: MembershipStore,
    E: EventLog,
{
    let mut rooms = session.joined_rooms.clone();
    if let Some(game_room) = session.game_room {
        rooms.insert(game_room);
    }

    for room_id in rooms {
        let roster = state.membership.roster(room_id).await.ok().flatten();

        let transitioned = {
            let mut registry = state.registry.lock().await;
            let Some(handle) = registry.handle(room_id) else {
                continue;
            };
            match handle.disconnect(session.identity.clone(), roster).await {
                Ok(reply) => {
                    if reply.vacated {
                        registry.reap(room_id).await;
                    }
                    reply.transitioned
                }
                Err(e) => {
                    tracing::debug!(%room_id, error = %e, "disconnect cleanup failed");
                    continue;
                }
            }
        };
        if transitioned {
            log_event(&state.events, room_id, RoomEventKind::Leave, &session.identity)
                .await;
        }
    }

    state.registry.lock().await.unbind_game(session.identity.user_id);
    tracing::info!(user = %session.identity.user_id, "connection cleaned up");
}
