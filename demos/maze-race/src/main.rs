//! Runnable maze-race server with in-memory stores.
//!
//! Auth tokens are `"{id}:{username}"` — good enough to click around with
//! a websocket client. A real deployment implements `IdentityProvider`,
//! `MembershipStore`, and `EventLog` against its own services instead.

use warren_gateway::{GatewayError, IdentityProvider, ServerBuilder};
use warren_lobby::{InMemoryEventLog, InMemoryMembership};
use warren_protocol::{Identity, RoomId, UserId};

/// Parses `"{id}:{username}"` tokens. Demo only — never use this shape
/// of "verification" in production.
struct TokenIdentity;

impl IdentityProvider for TokenIdentity {
    async fn verify(&self, token: &str) -> Result<Identity, GatewayError> {
        let (id, username) = token
            .split_once(':')
            .ok_or_else(|| GatewayError::Auth("token must be \"id:username\"".into()))?;
        let user_id: u64 = id
            .parse()
            .map_err(|_| GatewayError::Auth("token id must be a number".into()))?;
        if user_id == 0 || username.is_empty() {
            return Err(GatewayError::Auth("empty identity".into()));
        }
        Ok(Identity { user_id: UserId(user_id), username: username.to_string() })
    }
}

fn demo_membership() -> InMemoryMembership {
    let membership = InMemoryMembership::new();
    let ana = Identity { user_id: UserId(1), username: "ana".into() };
    let bo = Identity { user_id: UserId(2), username: "bo".into() };
    membership.create_room(RoomId(1), &ana);
    membership.add_member(RoomId(1), &bo);
    membership
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let server = ServerBuilder::new()
        .bind("0.0.0.0:9100")
        .build(TokenIdentity, demo_membership(), InMemoryEventLog::new())
        .await?;

    tracing::info!(addr = %server.local_addr()?, "maze-race demo up; room 1 belongs to ana (token \"1:ana\")");
    server.run().await?;
    Ok(())
}

// =========================================================================
// End-to-end tests: real websocket clients against a real server.
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn start() -> String {
        let server = ServerBuilder::new()
            .bind("127.0.0.1:0")
            .build(TokenIdentity, demo_membership(), InMemoryEventLog::new())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        addr
    }

    async fn ws(addr: &str) -> Ws {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        ws
    }

    async fn send(ws: &mut Ws, value: Value) {
        ws.send(Message::Text(value.to_string().into())).await.unwrap();
    }

    async fn next_json(ws: &mut Ws) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("websocket error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).expect("frame is JSON");
            }
        }
    }

    /// Scans past broadcasts until the direct reply for `seq` arrives.
    async fn reply_for(ws: &mut Ws, seq: u64) -> Value {
        loop {
            let v = next_json(ws).await;
            if v["type"] == "reply" && v["seq"] == seq {
                return v;
            }
        }
    }

    /// Scans until a frame of the given type arrives.
    async fn frame_of(ws: &mut Ws, frame_type: &str) -> Value {
        loop {
            let v = next_json(ws).await;
            if v["type"] == frame_type {
                return v;
            }
        }
    }

    async fn auth(ws: &mut Ws, token: &str) {
        send(ws, json!({"seq": 0, "type": "auth", "token": token})).await;
        let reply = reply_for(ws, 0).await;
        assert_eq!(reply["ok"], true, "auth failed: {reply}");
    }

    #[tokio::test]
    async fn auth_rejects_malformed_tokens() {
        let addr = start().await;
        let mut c = ws(&addr).await;
        send(&mut c, json!({"seq": 0, "type": "auth", "token": "nope"})).await;
        let reply = reply_for(&mut c, 0).await;
        assert_eq!(reply["ok"], false);
    }

    #[tokio::test]
    async fn non_member_cannot_join_room() {
        let addr = start().await;
        let mut c = ws(&addr).await;
        auth(&mut c, "99:mallory").await;

        send(&mut c, json!({"seq": 1, "type": "room.join", "room_id": 1})).await;
        let reply = reply_for(&mut c, 1).await;
        assert_eq!(reply["ok"], false);
        assert!(reply["message"].as_str().unwrap().contains("member"));
    }

    #[tokio::test]
    async fn members_get_returns_direct_snapshot() {
        let addr = start().await;
        let mut ana = ws(&addr).await;
        auth(&mut ana, "1:ana").await;

        send(&mut ana, json!({"seq": 1, "type": "room.join", "room_id": 1})).await;
        assert_eq!(reply_for(&mut ana, 1).await["ok"], true);

        send(&mut ana, json!({"seq": 2, "type": "room.members.get", "room_id": 1})).await;
        let reply = reply_for(&mut ana, 2).await;
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["member_count"], 2);
        assert_eq!(reply["online_count"], 1);
        assert_eq!(reply["owner_id"], 1);
    }

    #[tokio::test]
    async fn lobby_flow_ready_gate_and_start() {
        let addr = start().await;
        let mut ana = ws(&addr).await;
        let mut bo = ws(&addr).await;
        auth(&mut ana, "1:ana").await;
        auth(&mut bo, "2:bo").await;

        send(&mut ana, json!({"seq": 1, "type": "room.join", "room_id": 1})).await;
        reply_for(&mut ana, 1).await;
        send(&mut bo, json!({"seq": 1, "type": "room.join", "room_id": 1})).await;
        reply_for(&mut bo, 1).await;

        // Bo (not the owner) cannot start.
        send(&mut bo, json!({"seq": 2, "type": "room.game.start", "room_id": 1})).await;
        let reply = reply_for(&mut bo, 2).await;
        assert_eq!(reply["ok"], false);

        // Ana can't start while bo is not ready; bo is named in the refusal.
        send(&mut ana, json!({"seq": 2, "type": "room.ready.set", "room_id": 1, "ready": true})).await;
        reply_for(&mut ana, 2).await;
        send(&mut ana, json!({"seq": 3, "type": "room.game.start", "room_id": 1})).await;
        let reply = reply_for(&mut ana, 3).await;
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["not_ready"], json!(["bo"]));

        // Bo readies up; now the gate opens.
        send(&mut bo, json!({"seq": 3, "type": "room.ready.set", "room_id": 1, "ready": true})).await;
        reply_for(&mut bo, 3).await;
        send(&mut ana, json!({"seq": 4, "type": "room.game.start", "room_id": 1})).await;

        // Broadcasts are queued before the direct reply, so read the
        // ambient announcement first, then the ack.
        let started = frame_of(&mut ana, "room.game.started").await;
        assert_eq!(started["started_by"], "ana");
        let reply = reply_for(&mut ana, 4).await;
        assert_eq!(reply["ok"], true);
        let seed = reply["game_seed"].as_u64().expect("seed in start ack");
        assert_eq!(started["game_seed"].as_u64().unwrap(), seed);

        let started = frame_of(&mut bo, "room.game.started").await;
        assert_eq!(started["game_seed"].as_u64().unwrap(), seed);
        assert_eq!(started["started_by"], "ana");
    }

    #[tokio::test]
    async fn game_join_and_moves_broadcast_state() {
        let addr = start().await;
        let mut ana = ws(&addr).await;
        let mut bo = ws(&addr).await;
        auth(&mut ana, "1:ana").await;
        auth(&mut bo, "2:bo").await;

        // The join broadcast is queued before the direct reply.
        send(&mut ana, json!({"seq": 1, "type": "game.join", "room_id": 1, "nickname": "Ana", "seed": 42})).await;
        let state = frame_of(&mut ana, "game.stateUpdate").await;
        assert_eq!(state["seed"], 42);
        assert_eq!(state["width"], 31);
        assert_eq!(state["phase"], "playing");
        assert_eq!(state["players"].as_array().unwrap().len(), 1);
        assert_eq!(state["map_rows"].as_array().unwrap().len(), 21);

        let reply = reply_for(&mut ana, 1).await;
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["seed"], 42);

        // Bo joins the same session and both see two players.
        send(&mut bo, json!({"seq": 1, "type": "game.join", "room_id": 1, "seed": 42})).await;
        reply_for(&mut bo, 1).await;
        let state = frame_of(&mut ana, "game.stateUpdate").await;
        assert_eq!(state["players"].as_array().unwrap().len(), 2);

        // A move is acknowledged and broadcast to the other player.
        send(&mut ana, json!({"seq": 2, "type": "game.move", "room_id": 1, "action": "ArrowDown"})).await;
        let reply = reply_for(&mut ana, 2).await;
        assert_eq!(reply["ok"], true);
        let outcome = reply["outcome"].as_str().unwrap();
        assert!(outcome == "moved" || outcome == "blocked", "{outcome}");
        let state = frame_of(&mut bo, "game.stateUpdate").await;
        assert!(state["round"].as_u64().unwrap() > 0);

        // An unknown action is a hard error.
        send(&mut ana, json!({"seq": 3, "type": "game.move", "action": "fly"})).await;
        let reply = reply_for(&mut ana, 3).await;
        assert_eq!(reply["ok"], false);
    }

    #[tokio::test]
    async fn disconnect_broadcasts_leave_to_remaining_member() {
        let addr = start().await;
        let mut ana = ws(&addr).await;
        let mut bo = ws(&addr).await;
        auth(&mut ana, "1:ana").await;
        auth(&mut bo, "2:bo").await;

        send(&mut ana, json!({"seq": 1, "type": "room.join", "room_id": 1})).await;
        reply_for(&mut ana, 1).await;
        send(&mut bo, json!({"seq": 1, "type": "room.join", "room_id": 1})).await;
        reply_for(&mut bo, 1).await;

        drop(bo); // socket closes; server runs the leave path

        loop {
            let event = frame_of(&mut ana, "room.event").await;
            if event["event"] == "leave" {
                assert_eq!(event["username"], "bo");
                break;
            }
        }
    }
}
