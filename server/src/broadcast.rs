//! Outbound notifications from the coordinator to the transport

use log::{debug, error};
use shared::{ConnectionId, Packet, ServerEvent};
use std::collections::HashSet;
use tokio::sync::mpsc;

/// Messages sent from the coordinator to the network sender task
#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    SendPacket {
        connection_id: ConnectionId,
        packet: Packet,
    },
    BroadcastPacket {
        packet: Packet,
    },
}

/// Announcements that may go out at most once per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Announcement {
    MatchStarting,
    RolesAssigned,
    MatchInitialized,
    MatchEnded,
}

impl Announcement {
    pub fn of(event: &ServerEvent) -> Option<Self> {
        match event {
            ServerEvent::MatchStarting => Some(Announcement::MatchStarting),
            ServerEvent::RolesAssigned => Some(Announcement::RolesAssigned),
            ServerEvent::MatchInitialized => Some(Announcement::MatchInitialized),
            ServerEvent::MatchEnded { .. } => Some(Announcement::MatchEnded),
            _ => None,
        }
    }
}

/// Sequenced one-to-many channel for session events
///
/// Every event gets the next sequence number so clients can discard
/// duplicates. Sequence numbers keep growing across session resets.
pub struct EventBroadcaster {
    tx: mpsc::UnboundedSender<GameMessage>,
    next_sequence: u64,
    announced: HashSet<Announcement>,
}

impl EventBroadcaster {
    pub fn new(tx: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self {
            tx,
            next_sequence: 1,
            announced: HashSet::new(),
        }
    }

    /// Broadcasts an event to every connected client. One-shot
    /// announcements are dropped after their first delivery this session.
    /// Returns false if the event was suppressed.
    pub fn announce(&mut self, event: ServerEvent) -> bool {
        if let Some(kind) = Announcement::of(&event) {
            if !self.announced.insert(kind) {
                debug!("Suppressing repeated {:?} announcement", kind);
                return false;
            }
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue(GameMessage::BroadcastPacket {
            packet: Packet::Event { sequence, event },
        });
        true
    }

    pub fn has_announced(&self, kind: Announcement) -> bool {
        self.announced.contains(&kind)
    }

    /// Broadcasts a packet outside the event sequence (roster snapshots)
    pub fn broadcast(&self, packet: Packet) {
        self.queue(GameMessage::BroadcastPacket { packet });
    }

    /// Sends a packet to a single client
    pub fn send_to(&self, connection_id: ConnectionId, packet: Packet) {
        self.queue(GameMessage::SendPacket {
            connection_id,
            packet,
        });
    }

    /// Allows one-shot announcements again for a new session
    pub fn reset(&mut self) {
        self.announced.clear();
    }

    fn queue(&self, message: GameMessage) {
        if let Err(e) = self.tx.send(message) {
            error!("Failed to queue outbound message: {}", e);
        }
    }
}
