//! Room-level ready flags
//!
//! Clients flag ready with `LobbyReady` while the session is Waiting. The
//! lobby tells the server when the whole room is ready so it can call
//! `MatchCoordinator::notify_all_players_ready`.

use log::info;
use shared::ConnectionId;
use std::collections::HashSet;

/// Ready flags for one session
///
/// Fires once per session when every registered player has flagged ready
/// and the room holds at least `min_players`.
#[derive(Debug)]
pub struct Lobby {
    ready: HashSet<ConnectionId>,
    min_players: usize,
    fired: bool,
}

impl Lobby {
    pub fn new(min_players: usize) -> Self {
        Self {
            ready: HashSet::new(),
            min_players,
            fired: false,
        }
    }

    /// Marks a player ready. `roster` is the current set of registered
    /// connections. Returns true when the whole room just became ready.
    pub fn mark_ready(&mut self, connection_id: ConnectionId, roster: &[ConnectionId]) -> bool {
        if !roster.contains(&connection_id) {
            return false;
        }
        self.ready.insert(connection_id);
        self.check(roster)
    }

    /// Forgets a player that left. The rest of the room may now be ready.
    pub fn remove(&mut self, connection_id: ConnectionId, roster: &[ConnectionId]) -> bool {
        self.ready.remove(&connection_id);
        self.check(roster)
    }

    fn check(&mut self, roster: &[ConnectionId]) -> bool {
        if self.fired || roster.len() < self.min_players {
            return false;
        }
        if !roster.iter().all(|id| self.ready.contains(id)) {
            return false;
        }

        self.fired = true;
        info!("All {} players in the room are ready", roster.len());
        true
    }

    /// Players currently flagged ready
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Clears every flag so the next session can fire again
    pub fn reset(&mut self) {
        self.ready.clear();
        self.fired = false;
    }
}
