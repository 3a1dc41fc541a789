//! Server network layer handling TCP connections and session loop coordination

use crate::broadcast::GameMessage;
use crate::client_manager::{ClientManager, HEARTBEAT_TIMEOUT};
use crate::coordinator::{CoordinatorError, MatchCoordinator, SessionConfig};
use crate::lobby::Lobby;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{decode_packet, encode_packet, ConnectionId, MatchPhase, Packet, RejectReason};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWrite;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Largest frame accepted from or sent to a peer
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Messages sent from network tasks and collaborators to the main server loop
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Connected {
        connection_id: ConnectionId,
    },
    PacketReceived {
        connection_id: ConnectionId,
        packet: Packet,
    },
    ConnectionClosed {
        connection_id: ConnectionId,
    },
    ClientTimeout {
        connection_id: ConnectionId,
    },
    Death {
        connection_id: ConnectionId,
    },
    Damage {
        connection_id: ConnectionId,
        amount: f32,
    },
    Heal {
        connection_id: ConnectionId,
        amount: f32,
    },
    Cutscene {
        connection_id: ConnectionId,
        active: bool,
    },
    AllPlayersReady,
    ResetSession,
    Shutdown,
}

/// Transport tunables
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub tick_duration: Duration,
    pub max_connections: usize,
    pub heartbeat_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(33),
            max_connections: 16,
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
        }
    }
}

/// Cloneable entry point for in-process collaborators
///
/// Damage, health and cutscene systems report through this handle. Their
/// reports are queued behind client traffic and applied one at a time by the
/// server loop. Every method returns false once the server has stopped.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    pub fn notify_death(&self, connection_id: ConnectionId) -> bool {
        self.send(ServerMessage::Death { connection_id })
    }

    pub fn notify_damage(&self, connection_id: ConnectionId, amount: f32) -> bool {
        self.send(ServerMessage::Damage {
            connection_id,
            amount,
        })
    }

    pub fn notify_heal(&self, connection_id: ConnectionId, amount: f32) -> bool {
        self.send(ServerMessage::Heal {
            connection_id,
            amount,
        })
    }

    pub fn set_cutscene(&self, connection_id: ConnectionId, active: bool) -> bool {
        self.send(ServerMessage::Cutscene {
            connection_id,
            active,
        })
    }

    /// Starts the match without waiting for lobby ready flags
    pub fn notify_all_players_ready(&self) -> bool {
        self.send(ServerMessage::AllPlayersReady)
    }

    pub fn reset_session(&self) -> bool {
        self.send(ServerMessage::ResetSession)
    }

    pub fn shutdown(&self) -> bool {
        self.send(ServerMessage::Shutdown)
    }

    fn send(&self, message: ServerMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Main server coordinating networking and the match session
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: Arc<RwLock<ClientManager>>,
    coordinator: MatchCoordinator,
    lobby: Lobby,
    options: ServerOptions,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: SessionConfig,
        options: ServerOptions,
    ) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: Arc::new(RwLock::new(ClientManager::new(
                options.max_connections,
                options.heartbeat_timeout,
            ))),
            lobby: Lobby::new(config.min_players),
            coordinator: MatchCoordinator::new(config, game_tx.clone()),
            options,
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            tx: self.server_tx.clone(),
        }
    }

    /// Spawns task that accepts connections and starts one socket task each
    fn spawn_acceptor(&self, listener: TcpListener) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                        let connection_id = {
                            let mut clients_guard = clients.write().await;
                            clients_guard.add_connection(addr, outbound_tx)
                        };

                        let Some(connection_id) = connection_id else {
                            warn!("Refusing connection from {}: server full", addr);
                            tokio::spawn(Self::refuse(stream));
                            continue;
                        };

                        if let Err(e) = server_tx.send(ServerMessage::Connected { connection_id }) {
                            error!("Failed to send connection to main loop: {}", e);
                            break;
                        }
                        tokio::spawn(Self::connection_task(
                            stream,
                            connection_id,
                            outbound_rx,
                            server_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Reads frames from one peer and writes its outbound queue
    ///
    /// The task ends when the peer closes, a frame fails to write, or the
    /// connection table drops the outbound queue.
    async fn connection_task(
        stream: TcpStream,
        connection_id: ConnectionId,
        mut outbound_rx: mpsc::UnboundedReceiver<Packet>,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, frame_codec());
        let mut writer = FramedWrite::new(write_half, frame_codec());

        loop {
            tokio::select! {
                frame = reader.next() => match frame {
                    Some(Ok(bytes)) => match decode_packet(&bytes) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { connection_id, packet })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to decode packet from connection {}: {}", connection_id, e),
                    },
                    Some(Err(e)) => {
                        warn!("Read error on connection {}: {}", connection_id, e);
                        break;
                    }
                    None => {
                        debug!("Connection {} closed by peer", connection_id);
                        break;
                    }
                },

                outbound = outbound_rx.recv() => match outbound {
                    Some(packet) => {
                        if let Err(e) = write_packet(&mut writer, &packet).await {
                            warn!("Failed to write to connection {}: {}", connection_id, e);
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        // Already-removed connections make this a no-op in the main loop
        let _ = server_tx.send(ServerMessage::ConnectionClosed { connection_id });
    }

    async fn refuse(stream: TcpStream) {
        let mut writer = FramedWrite::new(stream, frame_codec());
        let packet = Packet::Disconnected {
            reason: "Server full".to_string(),
        };
        if let Err(e) = write_packet(&mut writer, &packet).await {
            debug!("Failed to notify refused peer: {}", e);
        }
    }

    /// Spawns task that routes coordinator output to connection queues
    fn spawn_network_sender(&self, mut game_rx: mpsc::UnboundedReceiver<GameMessage>) {
        let clients = Arc::clone(&self.clients);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                let clients_guard = clients.read().await;
                match message {
                    GameMessage::SendPacket {
                        connection_id,
                        packet,
                    } => {
                        if !clients_guard.send_to(connection_id, packet) {
                            debug!("Dropping packet for closed connection {}", connection_id);
                        }
                    }
                    GameMessage::BroadcastPacket { packet } => {
                        clients_guard.broadcast(&packet);
                    }
                }
            }
        });
    }

    /// Spawns task that monitors heartbeat timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for connection_id in timed_out {
                    warn!("Connection {} timed out", connection_id);
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { connection_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    fn send_packet(&self, connection_id: ConnectionId, packet: Packet) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket {
            connection_id,
            packet,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn reject(&self, connection_id: ConnectionId, reason: RejectReason) {
        self.send_packet(connection_id, Packet::Rejected { reason });
    }

    /// Tells the requesting client why its request failed
    fn respond(&self, connection_id: ConnectionId, result: Result<(), CoordinatorError>) {
        if let Err(e) = result {
            warn!("Rejected request from connection {}: {}", connection_id, e);
            self.reject(connection_id, e.reject_reason());
        }
    }

    /// Collaborator reports have nobody to answer, so failures are only logged
    fn log_report(&self, report: &str, connection_id: ConnectionId, result: Result<(), CoordinatorError>) {
        if let Err(e) = result {
            warn!("Ignored {} report for connection {}: {}", report, connection_id, e);
        }
    }

    fn registered_ids(&self) -> Vec<ConnectionId> {
        self.coordinator
            .players()
            .iter()
            .map(|player| player.connection_id)
            .collect()
    }

    fn start_match(&mut self) {
        if let Err(e) = self.coordinator.notify_all_players_ready() {
            warn!("Could not start match: {}", e);
        }
    }

    fn mark_ready(&mut self, connection_id: ConnectionId) {
        if self.coordinator.player(connection_id).is_none() {
            self.reject(connection_id, RejectReason::NotRegistered);
            return;
        }
        if self.coordinator.phase() != MatchPhase::Waiting {
            debug!(
                "Ignoring lobby ready from {} while {}",
                connection_id,
                self.coordinator.phase()
            );
            return;
        }

        let roster = self.registered_ids();
        if self.lobby.mark_ready(connection_id, &roster) {
            self.start_match();
        }
    }

    /// Forgets a connection at the transport level and in the session
    async fn drop_connection(&mut self, connection_id: ConnectionId) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_connection(&connection_id);
        }

        if let Err(e) = self.coordinator.unregister_player(connection_id) {
            warn!("Failed to unregister connection {}: {}", connection_id, e);
        }

        let roster = self.registered_ids();
        if self.lobby.remove(connection_id, &roster) && self.coordinator.phase() == MatchPhase::Waiting {
            self.start_match();
        }
    }

    /// Applies one client packet to the session
    async fn handle_packet(&mut self, connection_id: ConnectionId, packet: Packet) {
        match packet {
            Packet::Join { nickname } => {
                info!("Connection {} joining as {}", connection_id, nickname);
                let result = self
                    .coordinator
                    .register_player(connection_id, nickname)
                    .map(|_| ());
                self.respond(connection_id, result);
            }

            Packet::SetNickname { nickname } => {
                let result = self.coordinator.set_nickname(connection_id, nickname);
                self.respond(connection_id, result);
            }

            Packet::LobbyReady => self.mark_ready(connection_id),

            Packet::SceneLoaded => {
                let result = self.coordinator.notify_ready(connection_id).map(|_| ());
                self.respond(connection_id, result);
            }

            Packet::Heartbeat => {}

            Packet::Leave => {
                info!("Connection {} left", connection_id);
                self.drop_connection(connection_id).await;
            }

            _ => {
                warn!("Unexpected packet type from connection {}", connection_id);
            }
        }
    }

    async fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Connected { connection_id } => {
                self.send_packet(connection_id, Packet::Connected { connection_id });
            }
            ServerMessage::PacketReceived {
                connection_id,
                packet,
            } => {
                {
                    let mut clients = self.clients.write().await;
                    clients.touch(connection_id);
                }
                self.handle_packet(connection_id, packet).await;
            }
            ServerMessage::ConnectionClosed { connection_id }
            | ServerMessage::ClientTimeout { connection_id } => {
                self.drop_connection(connection_id).await;
            }
            ServerMessage::Death { connection_id } => {
                let result = self.coordinator.notify_death(connection_id);
                self.log_report("death", connection_id, result);
            }
            ServerMessage::Damage {
                connection_id,
                amount,
            } => {
                let result = self.coordinator.notify_damage(connection_id, amount);
                self.log_report("damage", connection_id, result);
            }
            ServerMessage::Heal {
                connection_id,
                amount,
            } => {
                let result = self.coordinator.notify_heal(connection_id, amount);
                self.log_report("heal", connection_id, result);
            }
            ServerMessage::Cutscene {
                connection_id,
                active,
            } => {
                let result = self.coordinator.set_cutscene(connection_id, active);
                self.log_report("cutscene", connection_id, result);
            }
            ServerMessage::AllPlayersReady => self.start_match(),
            ServerMessage::ResetSession => {
                self.coordinator.reset_session();
                self.lobby.reset();
            }
            ServerMessage::Shutdown => {}
        }

        self.recover_stalled_start();
    }

    /// Resets a Starting session that can no longer reach InProgress
    ///
    /// That happens when everyone left during scene load, or when the
    /// barrier released for a roster the role table does not cover.
    fn recover_stalled_start(&mut self) {
        if self.coordinator.phase() != MatchPhase::Starting {
            return;
        }

        let roster = self.coordinator.roster_len();
        if roster > 0 && !self.coordinator.barrier().is_released() {
            return;
        }

        warn!("Match cannot start with {} players, resetting session", roster);
        self.coordinator.reset_session();
        self.lobby.reset();
    }

    fn on_tick(&mut self) {
        let before = self.coordinator.phase();
        self.coordinator.tick(Instant::now());

        // The coordinator resets itself after a finished match
        if before == MatchPhase::Ended && self.coordinator.phase() == MatchPhase::Waiting {
            self.lobby.reset();
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> ServerResult<()> {
        let listener = self.listener.take().ok_or("server is already running")?;
        let game_rx = self.game_rx.take().ok_or("server is already running")?;

        // Initialize concurrent tasks
        self.spawn_acceptor(listener);
        self.spawn_network_sender(game_rx);
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.options.tick_duration);
        let mut tick: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network and collaborator events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                        Some(message) => self.handle_message(message).await,
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    tick += 1;
                    self.on_tick();

                    if tick % 300 == 0 {
                        let connection_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };
                        debug!(
                            "Tick {}: {} connections, {} players, phase {}",
                            tick,
                            connection_count,
                            self.coordinator.roster_len(),
                            self.coordinator.phase()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}

fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

async fn write_packet<W>(
    writer: &mut FramedWrite<W, LengthDelimitedCodec>,
    packet: &Packet,
) -> ServerResult<()>
where
    W: AsyncWrite + Unpin,
{
    let data = encode_packet(packet)?;
    writer.send(Bytes::from(data)).await?;
    Ok(())
}
