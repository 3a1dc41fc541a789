//! Transport-level connection table for the match server
//!
//! This module tracks the TCP connections behind the coordinator:
//! - Connection id allocation and capacity enforcement
//! - Per-connection outbound queues used for targeted sends and broadcasts
//! - Heartbeat tracking and timeout detection
//!
//! Connections are not players. A connection becomes a player only once it
//! sends `Join` and the coordinator registers it; the table here exists so the
//! substrate can deliver packets and notice peers that silently went away.

use log::info;
use shared::{ConnectionId, Packet};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Default time without any inbound frame before a connection is dropped
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// A live transport connection
#[derive(Debug)]
pub struct Connection {
    /// Identifier handed to the coordinator
    pub id: ConnectionId,
    /// Peer address, for logging
    pub addr: SocketAddr,
    /// Last time any frame arrived from this peer
    pub last_seen: Instant,
    /// Queue drained by the connection's socket task
    sender: mpsc::UnboundedSender<Packet>,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: mpsc::UnboundedSender<Packet>) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            sender,
        }
    }

    /// Queues a packet for this peer. Returns false if the socket task is gone.
    pub fn send(&self, packet: Packet) -> bool {
        self.sender.send(packet).is_ok()
    }

    /// Checks if the connection has been silent for longer than `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all open connections
///
/// Dropping a `Connection` drops its outbound sender, which tells the
/// socket task to close the stream.
pub struct ClientManager {
    /// Open connections indexed by id
    connections: HashMap<ConnectionId, Connection>,
    /// Next id for a new connection
    next_connection_id: ConnectionId,
    /// Maximum number of concurrent connections
    max_connections: usize,
    /// Silence allowed before a connection is considered lost
    timeout: Duration,
}

impl ClientManager {
    /// Creates an empty table. Ids start from 1.
    pub fn new(max_connections: usize, timeout: Duration) -> Self {
        Self {
            connections: HashMap::new(),
            next_connection_id: 1,
            max_connections,
            timeout,
        }
    }

    /// Admits a new connection
    ///
    /// Returns None if the table is full; the caller is expected to refuse
    /// the socket.
    pub fn add_connection(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Packet>,
    ) -> Option<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }

        let id = self.next_connection_id;
        self.next_connection_id += 1;

        info!("Connection {} opened from {}", id, addr);
        self.connections.insert(id, Connection::new(id, addr, sender));
        Some(id)
    }

    /// Removes a connection. Returns true if it was present.
    pub fn remove_connection(&mut self, id: &ConnectionId) -> bool {
        if let Some(connection) = self.connections.remove(id) {
            info!("Connection {} from {} closed", connection.id, connection.addr);
            true
        } else {
            false
        }
    }

    /// Refreshes the heartbeat of a connection
    pub fn touch(&mut self, id: ConnectionId) -> bool {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.last_seen = Instant::now();
            true
        } else {
            false
        }
    }

    /// Queues a packet for one connection
    pub fn send_to(&self, id: ConnectionId, packet: Packet) -> bool {
        self.connections
            .get(&id)
            .map(|connection| connection.send(packet))
            .unwrap_or(false)
    }

    /// Queues a packet for every open connection. Returns how many accepted it.
    pub fn broadcast(&self, packet: &Packet) -> usize {
        self.connections
            .values()
            .filter(|connection| connection.send(packet.clone()))
            .count()
    }

    /// Removes and returns every connection that missed its heartbeat
    ///
    /// Each removed peer is told why before its queue is dropped.
    pub fn check_timeouts(&mut self) -> Vec<ConnectionId> {
        let timeout = self.timeout;
        let timed_out: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for id in &timed_out {
            self.send_to(
                *id,
                Packet::Disconnected {
                    reason: "Heartbeat timeout".to_string(),
                },
            );
            self.remove_connection(id);
        }

        timed_out
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
