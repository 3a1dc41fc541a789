use crate::connection::{ClientResult, Connection};
use crate::state::ClientMatchState;
use log::{info, warn};
use shared::{Packet, ServerEvent};
use std::time::Duration;
use tokio::time::interval;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub nickname: String,
    /// Flag ready in the lobby as soon as the server accepts the join
    pub auto_ready: bool,
    pub heartbeat_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            nickname: "player".to_string(),
            auto_ready: true,
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

/// Headless match participant
///
/// Joins on connect, flags ready, acknowledges the scene load when the match
/// starts and joins again after a session reset. Everything it learns is kept
/// in a `ClientMatchState`.
pub struct Client {
    connection: Connection,
    options: ClientOptions,
    state: ClientMatchState,
}

impl Client {
    pub async fn new(server_addr: &str, options: ClientOptions) -> ClientResult<Self> {
        info!("Connecting to server at {}...", server_addr);
        let connection = Connection::connect(server_addr).await?;

        Ok(Client {
            connection,
            options,
            state: ClientMatchState::new(),
        })
    }

    pub fn state(&self) -> &ClientMatchState {
        &self.state
    }

    pub async fn send(&mut self, packet: &Packet) -> ClientResult<()> {
        self.connection.send(packet).await
    }

    async fn join(&mut self) -> ClientResult<()> {
        let packet = Packet::Join {
            nickname: self.options.nickname.clone(),
        };
        self.send(&packet).await
    }

    /// Applies a packet and answers it. Returns false when the server
    /// dropped us.
    async fn handle_packet(&mut self, packet: Packet) -> ClientResult<bool> {
        let joined = matches!(packet, Packet::Joined { .. });
        let connected = matches!(packet, Packet::Connected { .. });
        let disconnected = matches!(packet, Packet::Disconnected { .. });

        let event = self.state.apply(packet);

        if connected {
            self.join().await?;
        }
        if joined && self.options.auto_ready {
            self.send(&Packet::LobbyReady).await?;
        }

        match event {
            Some(ServerEvent::MatchStarting) if self.state.stable_index().is_some() => {
                info!("Match starting, scene loaded");
                self.send(&Packet::SceneLoaded).await?;
            }
            Some(ServerEvent::SessionReset) => {
                info!("Session reset, joining again");
                self.join().await?;
            }
            _ => {}
        }

        if disconnected {
            warn!(
                "Server dropped the connection: {}",
                self.state.disconnect_reason().unwrap_or("unknown")
            );
        }
        Ok(!disconnected)
    }

    /// Runs until `done` holds for the mirrored state or the server goes away
    pub async fn run_until<F>(&mut self, mut done: F) -> ClientResult<()>
    where
        F: FnMut(&ClientMatchState) -> bool,
    {
        let mut heartbeat_interval = interval(self.options.heartbeat_interval);

        loop {
            if done(&self.state) {
                return Ok(());
            }

            tokio::select! {
                packet = self.connection.recv() => {
                    match packet? {
                        Some(packet) => {
                            if !self.handle_packet(packet).await? {
                                return Ok(());
                            }
                        }
                        None => {
                            info!("Server closed the connection");
                            return Ok(());
                        }
                    }
                },

                _ = heartbeat_interval.tick() => {
                    self.send(&Packet::Heartbeat).await?;
                },
            }
        }
    }

    pub async fn run(&mut self) -> ClientResult<()> {
        self.run_until(|_| false).await
    }

    /// Says goodbye so the server can drop us without waiting for a timeout
    pub async fn leave(mut self) -> ClientResult<()> {
        self.send(&Packet::Leave).await
    }
}
