//! WebSocket Game Server
//!
//! Async WebSocket edge of the match engine. Parses client messages,
//! pairs joiners into sessions and forwards each session's events to the
//! connections of its participants.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::game::state::ParticipantId;
use crate::network::protocol::{ChampionData, ClientMessage, ErrorCode, ServerMessage};
use crate::network::session::{SessionConfig, SessionError, SessionHandle, SessionManager};
use crate::store::ChampionStatusStore;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How often idle clients and closed sessions are swept.
    pub cleanup_interval: Duration,
    /// Connections outside a running match that stay silent for longer are
    /// closed.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
    /// Settings for every session the server creates.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            max_connections: 1000,
            cleanup_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `ARENA_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = std::env::var("ARENA_BIND_ADDR")
            .ok()
            .and_then(|v| match v.parse() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    warn!("Ignoring ARENA_BIND_ADDR={:?}: {}", v, e);
                    None
                }
            })
            .unwrap_or(defaults.bind_addr);

        Self {
            bind_addr,
            max_connections: std::env::var("ARENA_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            cleanup_interval: std::env::var("ARENA_CLEANUP_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
            idle_timeout: std::env::var("ARENA_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            session: SessionConfig::from_env(),
            ..defaults
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

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// Connected client state.
struct ConnectedClient {
    /// Champion this connection joined with.
    participant_id: Option<ParticipantId>,
    /// Session the champion is in.
    session: Option<SessionHandle>,
    /// Task relaying session events to this connection.
    forwarder: Option<JoinHandle<()>>,
    /// Last activity.
    last_activity: Instant,
    /// Tells the connection task to close the socket, with a reason.
    evict: Option<oneshot::Sender<String>>,
}

impl ConnectedClient {
    fn new(evict: oneshot::Sender<String>) -> Self {
        Self {
            participant_id: None,
            session: None,
            forwarder: None,
            last_activity: Instant::now(),
            evict: Some(evict),
        }
    }

    /// Idle and not in a running match. Session events keep a participant's
    /// connection busy even when the client itself sends nothing.
    fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        !self.in_live_session() && now.duration_since(self.last_activity) > timeout
    }

    /// Take the match membership, stopping the event relay.
    fn detach(&mut self) -> Option<(SessionHandle, ParticipantId)> {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        let session = self.session.take()?;
        let participant_id = self.participant_id.take()?;
        Some((session, participant_id))
    }

    /// In a session that is still running.
    fn in_live_session(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_closed())
    }
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

fn server_time_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session manager.
    sessions: Arc<SessionManager>,
    /// Connected clients.
    clients: Clients,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server backed by a champion status store.
    pub fn new(config: ServerConfig, store: Arc<dyn ChampionStatusStore>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let sessions = Arc::new(SessionManager::new(config.session.clone(), store));

        Self {
            config,
            sessions,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server v{} listening on {}", self.config.version, listener.local_addr()?);

        let cleanup_clients = self.clients.clone();
        let cleanup_sessions = self.sessions.clone();
        let cleanup_config = self.config.clone();
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, cleanup_sessions, cleanup_config).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Rejecting {}: {}", addr, GameServerError::ConnectionLimitReached);
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

        cleanup_handle.abort();
        self.sessions.shutdown_all("server shutting down").await;

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let sessions = self.sessions.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            if let Err(e) = Self::serve_connection(stream, addr, &clients, &sessions, shutdown_rx).await {
                error!("Connection {} failed: {}", addr, e);
            }
            Self::disconnect(addr, &clients).await;

            info!("Client {} cleaned up", addr);
        });
    }

    async fn serve_connection(
        stream: TcpStream,
        addr: SocketAddr,
        clients: &Clients,
        sessions: &Arc<SessionManager>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), GameServerError> {
        let ws_stream = accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
        let (evict_tx, mut evict_rx) = oneshot::channel::<String>();

        clients.write().await.insert(addr, ConnectedClient::new(evict_tx));
        let mut evictable = true;

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
                // Session teardown ends the connection
                if matches!(msg, ServerMessage::SessionClosed { .. }) {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let client_msg = match ClientMessage::from_json(&text) {
                                Ok(m) => m,
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    let _ = msg_tx
                                        .send(ServerMessage::error(ErrorCode::InvalidMessage, "Invalid message format"))
                                        .await;
                                    continue;
                                }
                            };

                            if let Some(client) = clients.write().await.get_mut(&addr) {
                                client.last_activity = Instant::now();
                            }

                            Self::handle_client_message(addr, client_msg, clients, sessions, &msg_tx).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            sender_task.abort();
                            Self::disconnect(addr, clients).await;
                            return Err(e.into());
                        }
                        _ => {}
                    }
                }
                _ = shutdown_rx.recv() => {
                    let _ = msg_tx.send(ServerMessage::SessionClosed {
                        reason: "server shutting down".to_string(),
                    }).await;
                    break;
                }
                evicted = &mut evict_rx, if evictable => {
                    evictable = false;
                    if let Ok(reason) = evicted {
                        let _ = msg_tx.send(ServerMessage::SessionClosed { reason }).await;
                        break;
                    }
                }
            }
        }

        // Leave before flushing so the opponent is not kept waiting
        Self::disconnect(addr, clients).await;
        drop(msg_tx);
        let _ = tokio::time::timeout(Duration::from_secs(1), sender_task).await;
        Ok(())
    }

    /// Forget a connection. Dropping out of a match is an unconsented leave.
    async fn disconnect(addr: SocketAddr, clients: &Clients) {
        let membership = clients.write().await.remove(&addr).and_then(|mut c| c.detach());
        if let Some((session, participant_id)) = membership {
            session.leave(participant_id, false).await;
        }
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &Clients,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Join { champion_id, champion } => {
                Self::handle_join(addr, &champion_id, champion, clients, sessions, sender).await;
            }
            ClientMessage::Leave { consented } => {
                let membership = match clients.write().await.get_mut(&addr) {
                    Some(client) => client.detach(),
                    None => None,
                };
                match membership {
                    Some((session, participant_id)) => session.leave(participant_id, consented).await,
                    None => {
                        let _ = sender.send(ServerMessage::error(ErrorCode::NotInMatch, "Not in a match")).await;
                    }
                }
            }
            ClientMessage::SetStance { stance } => {
                let membership = clients.read().await.get(&addr).and_then(|c| {
                    Some((c.session.clone()?, c.participant_id.clone()?))
                });
                match membership {
                    Some((session, participant_id)) => session.set_stance(participant_id, stance).await,
                    None => {
                        let _ = sender.send(ServerMessage::error(ErrorCode::NotInMatch, "Not in a match")).await;
                    }
                }
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp,
                    server_time: server_time_ms(),
                }).await;
            }
        }
    }

    /// Validate champion data, join or create a session, start relaying.
    async fn handle_join(
        addr: SocketAddr,
        champion_id: &str,
        champion: Option<ChampionData>,
        clients: &Clients,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let already_joined = clients
            .read()
            .await
            .get(&addr)
            .is_some_and(ConnectedClient::in_live_session);
        if already_joined {
            let _ = sender.send(ServerMessage::error(ErrorCode::AlreadyJoined, "Already in a match")).await;
            return;
        }

        let profile = champion
            .ok_or_else(|| SessionError::MissingChampionData("champion data is required".to_string()))
            .and_then(|data| {
                data.to_profile(champion_id)
                    .map_err(|e| SessionError::MissingChampionData(e.to_string()))
            });

        let joined = match profile {
            Ok(profile) => sessions.join_or_create(profile).await,
            Err(e) => Err(e),
        };

        let (session, accepted) = match joined {
            Ok(joined) => joined,
            Err(e) => {
                debug!("Join from {} rejected: {}", addr, e);
                let _ = sender.send(ServerMessage::error(e.error_code(), e.to_string())).await;
                return;
            }
        };

        let participant = accepted.participant;
        let _ = sender.send(ServerMessage::Joined {
            session_id: uuid::Uuid::from_bytes(accepted.session_id).to_string(),
            participant_id: participant.id.clone(),
            side: participant.side,
            position: participant.position,
        }).await;

        let forwarder = tokio::spawn(Self::forward_events(accepted.events, sender.clone()));

        let mut registry = clients.write().await;
        let Some(client) = registry.get_mut(&addr) else {
            // Connection went away mid-join
            drop(registry);
            forwarder.abort();
            session.leave(participant.id, false).await;
            return;
        };

        if let Some(old) = client.forwarder.replace(forwarder) {
            old.abort();
        }
        client.session = Some(session);
        client.participant_id = Some(participant.id);
    }

    /// Relay session events until the session closes or the client goes.
    async fn forward_events(
        mut events: broadcast::Receiver<ServerMessage>,
        sender: mpsc::Sender<ServerMessage>,
    ) {
        loop {
            match events.recv().await {
                Ok(msg) => {
                    let closing = matches!(msg, ServerMessage::SessionClosed { .. });
                    if sender.send(msg).await.is_err() || closing {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Client fell behind, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(clients: Clients, sessions: Arc<SessionManager>, config: ServerConfig) {
        let mut interval = interval(config.cleanup_interval);

        loop {
            interval.tick().await;

            let now = Instant::now();
            let idle: Vec<(SessionHandle, ParticipantId)> = {
                let mut clients = clients.write().await;
                let to_remove: Vec<SocketAddr> = clients
                    .iter()
                    .filter(|(_, c)| c.is_idle(now, config.idle_timeout))
                    .map(|(addr, _)| *addr)
                    .collect();

                to_remove
                    .into_iter()
                    .filter_map(|addr| {
                        info!("Closing idle client {}", addr);
                        let mut client = clients.remove(&addr)?;
                        if let Some(evict) = client.evict.take() {
                            let _ = evict.send("idle timeout".to_string());
                        }
                        // Only a finished session can still be attached here
                        client.detach()
                    })
                    .collect()
            };

            for (session, participant_id) in idle {
                session.leave(participant_id, false).await;
            }

            sessions.cleanup().await;
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }
}
