//! Server builder and accept loop.

use std::sync::Arc;

use tokio::sync::Mutex;

use warren_game::GameConfig;
use warren_lobby::{EventLog, MembershipStore};
use warren_protocol::JsonCodec;
use warren_room::RoomRegistry;

use crate::handler::{ServerState, handle_connection};
use crate::{GatewayError, IdentityProvider, WsListener};

/// Builder for configuring and starting a Warren gateway.
///
/// # Example
///
/// ```rust,ignore
/// let server = ServerBuilder::new()
///     .bind("0.0.0.0:9100")
///     .build(my_identity, my_membership, my_event_log)
///     .await?;
/// server.run().await
/// ```
pub struct ServerBuilder {
    bind_addr: String,
    game_config: GameConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:9100".to_string(),
            game_config: GameConfig::default(),
        }
    }

    /// Sets the address to bind to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the session tunables used by every room.
    pub fn game_config(mut self, config: GameConfig) -> Self {
        self.game_config = config;
        self
    }

    /// Binds the listener and assembles the shared state.
    pub async fn build<I, M, E>(
        self,
        identity: I,
        membership: M,
        events: E,
    ) -> Result<Server<I, M, E>, GatewayError>
    where
        I: IdentityProvider,
        M: MembershipStore,
        E: EventLog,
    {
        let listener = WsListener::bind(&self.bind_addr).await?;
        let state = Arc::new(ServerState {
            registry: Mutex::new(RoomRegistry::new(self.game_config)),
            identity,
            membership,
            events,
            codec: JsonCodec,
        });
        Ok(Server { listener, state })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Warren gateway.
pub struct Server<I, M, E> {
    listener: WsListener,
    state: Arc<ServerState<I, M, E>>,
}

impl<I, M, E> Server<I, M, E>
where
    I: IdentityProvider,
    M: MembershipStore,
    E: EventLog,
{
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    ///
    /// Each connection runs in its own task; a connection's failure is
    /// its own problem and never takes the server down.
    pub async fn run(mut self) -> Result<(), GatewayError> {
        tracing::info!("warren gateway running");

        loop {
            match self.listener.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
