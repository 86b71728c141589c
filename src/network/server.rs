//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections. Each connection
//! gets a player id and an outbound queue; everything game-related is
//! forwarded to the match session.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ArenaConfig, ConfigError};
use crate::core::rng::derive_match_seed;
use crate::game::state::{MatchState, PlayerId};
use crate::network::protocol::{message_type, ClientMessage, ErrorCode, ServerError, ServerMessage};
use crate::network::session::{MatchSession, SessionConfig, SessionError, SessionHandle};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Tick rate for game simulation (Hz).
    pub tick_rate: u32,
    /// Arena file; the built-in arena when `None`.
    pub arena_path: Option<PathBuf>,
    /// Operator seed mixed into the match seed.
    pub seed: Option<u64>,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            tick_rate: crate::TICK_RATE,
            arena_path: None,
            seed: None,
            version: crate::VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Read `FLAG_ARENA_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("FLAG_ARENA_BIND") {
            config.bind_addr = value
                .parse()
                .map_err(|_| ConfigError::InvalidAddress { key: "FLAG_ARENA_BIND", value })?;
        }
        if let Some(value) = lookup("FLAG_ARENA_TICK_RATE") {
            config.tick_rate = match value.parse::<u32>() {
                Ok(rate) if rate > 0 => rate,
                _ => return Err(ConfigError::InvalidValue { key: "FLAG_ARENA_TICK_RATE", value }),
            };
        }
        if let Some(value) = lookup("FLAG_ARENA_MAX_CONNECTIONS") {
            config.max_connections = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: "FLAG_ARENA_MAX_CONNECTIONS", value })?;
        }
        if let Some(value) = lookup("FLAG_ARENA_SEED") {
            let seed = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: "FLAG_ARENA_SEED", value })?;
            config.seed = Some(seed);
        }
        config.arena_path = lookup("FLAG_ARENA_CONFIG").map(PathBuf::from);

        Ok(config)
    }

    /// Arena from `arena_path`, or the built-in one.
    pub fn load_arena(&self) -> Result<ArenaConfig, ConfigError> {
        match &self.arena_path {
            Some(path) => ArenaConfig::from_file(path),
            None => Ok(ArenaConfig::default()),
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Arena or environment configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// The match.
    session: SessionHandle,
    /// Session task.
    session_task: JoinHandle<()>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, PlayerId>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server and start its match session.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: ServerConfig) -> Result<Self, GameServerError> {
        let arena = config.load_arena()?;
        let match_id = *uuid::Uuid::new_v4().as_bytes();
        let rng_seed = derive_match_seed(&match_id, config.seed);
        let state = MatchState::new(match_id, rng_seed, &arena)?;

        info!(
            match_id = %hex::encode(&match_id[..4]),
            rng_seed,
            teams = arena.teams.len(),
            items = arena.items.len(),
            "Match created"
        );

        let session_config = SessionConfig { tick_rate: config.tick_rate, ..Default::default() };
        let (session, session_task) = MatchSession::new(state, session_config).spawn();
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            session,
            session_task,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        })
    }

    /// Handle to the match session.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Bind and run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                tokio::spawn(Self::reject_full(stream, addr));
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Complete the handshake only to tell the client the server is full.
    async fn reject_full(stream: TcpStream, addr: SocketAddr) {
        let mut ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!("Handshake with rejected {} failed: {}", addr, e);
                return;
            }
        };

        let error = ServerMessage::Error(ServerError::new(ErrorCode::ServerFull, "Server is full"));
        if let Ok(text) = error.to_json() {
            let _ = ws_stream.send(Message::Text(text)).await;
        }
        let _ = ws_stream.close(None).await;
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let session = self.session.clone();
        let version = self.config.version.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(256);
            let player_id = PlayerId::random();

            clients.write().await.insert(addr, player_id);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let _ = msg_tx
                .send(ServerMessage::Welcome { player_id, server_version: version })
                .await;
            if session.connect(player_id, msg_tx.clone()).await.is_err() {
                error!("Session closed, dropping {}", addr);
                let _ = msg_tx.send(session_gone()).await;
            } else {
                Self::read_loop(addr, player_id, &mut ws_receiver, &session, &msg_tx, &mut shutdown_rx)
                    .await;
            }

            // Cleanup
            let _ = session.disconnect(player_id).await;
            clients.write().await.remove(&addr);
            drop(msg_tx);
            if tokio::time::timeout(Duration::from_secs(1), sender_task).await.is_err() {
                debug!("Sender for {} did not finish", addr);
            }

            info!("Client {} cleaned up", addr);
        });
    }

    /// Forward inbound frames to the session until the client leaves.
    async fn read_loop<S>(
        addr: SocketAddr,
        player_id: PlayerId,
        ws_receiver: &mut S,
        session: &SessionHandle,
        msg_tx: &mpsc::Sender<ServerMessage>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let client_msg = match ClientMessage::from_json(&text) {
                                Ok(m) => m,
                                Err(e) if message_type(&text).as_deref() == Some("move") => {
                                    debug!("Dropping malformed move from {}: {}", addr, e);
                                    continue;
                                }
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    let _ = msg_tx.send(ServerMessage::Error(
                                        ServerError::new(ErrorCode::InvalidInput, "Invalid message format"),
                                    )).await;
                                    continue;
                                }
                            };

                            if session.send(player_id, client_msg).await.is_err() {
                                error!("Session closed while {} was connected", addr);
                                let _ = msg_tx.send(session_gone()).await;
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error for {}: {}", addr, e);
                            break;
                        }
                        _ => {}
                    }
                }
                _ = shutdown_rx.recv() => {
                    let _ = msg_tx.send(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    }).await;
                    break;
                }
            }
        }
    }

    /// Stop accepting, close connections and stop the session.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        if self.session.shutdown().await.is_err() {
            debug!("Session already stopped");
        }
    }

    /// Whether the session task has exited.
    pub fn is_session_finished(&self) -> bool {
        self.session_task.is_finished()
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

fn session_gone() -> ServerMessage {
    ServerMessage::Error(ServerError::new(ErrorCode::InternalError, "Match session unavailable"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_tungstenite::connect_async;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.arena_path.is_none());
    }

    #[test]
    fn test_server_config_from_lookup() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("FLAG_ARENA_BIND", "127.0.0.1:9000"),
            ("FLAG_ARENA_TICK_RATE", "30"),
            ("FLAG_ARENA_MAX_CONNECTIONS", "16"),
            ("FLAG_ARENA_SEED", "42"),
            ("FLAG_ARENA_CONFIG", "arena.json"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.arena_path, Some(PathBuf::from("arena.json")));
    }

    #[test]
    fn test_server_config_rejects_bad_values() {
        let bad_bind = ServerConfig::from_lookup(lookup(&[("FLAG_ARENA_BIND", "nowhere")]));
        assert!(matches!(bad_bind, Err(ConfigError::InvalidAddress { .. })));

        let zero_rate = ServerConfig::from_lookup(lookup(&[("FLAG_ARENA_TICK_RATE", "0")]));
        assert!(matches!(zero_rate, Err(ConfigError::InvalidValue { key: "FLAG_ARENA_TICK_RATE", .. })));

        let bad_seed = ServerConfig::from_lookup(lookup(&[("FLAG_ARENA_SEED", "-1")]));
        assert!(matches!(bad_seed, Err(ConfigError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = GameServer::new(ServerConfig::default()).unwrap();
        assert_eq!(server.connection_count().await, 0);

        let snapshot = server.session().snapshot().await.unwrap();
        assert!(snapshot.players.is_empty());
        assert_eq!(snapshot.teams.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_arena_file_fails() {
        let config = ServerConfig {
            arena_path: Some(PathBuf::from("/nonexistent/arena.json")),
            ..Default::default()
        };
        assert!(matches!(GameServer::new(config), Err(GameServerError::Config(ConfigError::Io(_)))));
    }

    #[tokio::test]
    async fn test_websocket_join() {
        let server = Arc::new(GameServer::new(ServerConfig::default()).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let serving = server.clone();
        let serve_task = tokio::spawn(async move { serving.serve(listener).await });

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let next = |text: Message| ServerMessage::from_json(text.to_text().unwrap()).unwrap();
        let welcome = next(ws.next().await.unwrap().unwrap());
        let ServerMessage::Welcome { player_id, .. } = welcome else {
            panic!("expected welcome, got {:?}", welcome);
        };

        // Garbage gets an error, a malformed move gets nothing
        ws.send(Message::Text("garbage".into())).await.unwrap();
        assert!(matches!(next(ws.next().await.unwrap().unwrap()), ServerMessage::Error(_)));
        ws.send(Message::Text(r#"{"type":"move"}"#.into())).await.unwrap();

        ws.send(Message::Text(r#"{"type":"join","name":"ws"}"#.into())).await.unwrap();
        assert_eq!(next(ws.next().await.unwrap().unwrap()), ServerMessage::ok("join"));

        let snapshot = server.session().snapshot().await.unwrap();
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].id, player_id);
        assert_eq!(server.connection_count().await, 1);

        server.shutdown().await;
        serve_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connection_over_limit_is_told_server_full() {
        let config = ServerConfig { max_connections: 1, ..Default::default() };
        let server = Arc::new(GameServer::new(config).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let serving = server.clone();
        let serve_task = tokio::spawn(async move { serving.serve(listener).await });

        let (mut first, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let welcome = first.next().await.unwrap().unwrap();
        assert!(matches!(
            ServerMessage::from_json(welcome.to_text().unwrap()).unwrap(),
            ServerMessage::Welcome { .. }
        ));

        let (mut second, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let reply = second.next().await.unwrap().unwrap();
        let ServerMessage::Error(error) = ServerMessage::from_json(reply.to_text().unwrap()).unwrap() else {
            panic!("expected error, got {:?}", reply);
        };
        assert_eq!(error.code, ErrorCode::ServerFull);
        assert_eq!(server.connection_count().await, 1);

        server.shutdown().await;
        serve_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stopped_session_reports_internal_error() {
        let server = Arc::new(GameServer::new(ServerConfig::default()).unwrap());
        server.session().shutdown().await.unwrap();
        while !server.is_session_finished() {
            tokio::task::yield_now().await;
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = server.clone();
        let serve_task = tokio::spawn(async move { serving.serve(listener).await });

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let next = |text: Message| ServerMessage::from_json(text.to_text().unwrap()).unwrap();
        assert!(matches!(next(ws.next().await.unwrap().unwrap()), ServerMessage::Welcome { .. }));
        let ServerMessage::Error(error) = next(ws.next().await.unwrap().unwrap()) else {
            panic!("expected error");
        };
        assert_eq!(error.code, ErrorCode::InternalError);

        server.shutdown().await;
        serve_task.await.unwrap().unwrap();
    }
}
