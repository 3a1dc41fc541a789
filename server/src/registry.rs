//! Player roster for a single match session
//!
//! This module owns the authoritative record of who is playing:
//! - One `Player` per registered connection, keyed by `ConnectionId`
//! - Stable seat indices drawn from a monotonic counter
//! - Server-owned lifecycle, role and health fields
//!
//! Stable indices are never compacted. Other clients key seat-based visuals
//! on them, so a player leaving from the middle of the roster must not shift
//! anyone else's index.

use crate::error::CoordinatorError;
use log::info;
use shared::{ConnectionId, LifecycleState, PlayerView, Role};
use std::collections::HashMap;

/// A registered participant
///
/// Everything except `nickname` is owned by the server and only ever
/// replicated outward. `role` stays private to the owning client until the
/// match ends.
#[derive(Debug, Clone)]
pub struct Player {
    /// Transport connection this player belongs to
    pub connection_id: ConnectionId,
    /// Seat number, assigned once and kept across role assignment
    pub stable_index: u32,
    /// Display name chosen by the client
    pub nickname: String,
    /// Alive, in a cutscene, or dead
    pub lifecycle: LifecycleState,
    /// Hidden role, `Role::None` until assignment
    pub role: Role,
    /// Remaining health; reaching zero kills the player
    pub health: f32,
}

impl Player {
    pub fn new(
        connection_id: ConnectionId,
        stable_index: u32,
        nickname: String,
        max_health: f32,
    ) -> Self {
        Self {
            connection_id,
            stable_index,
            nickname,
            lifecycle: LifecycleState::Alive,
            role: Role::None,
            health: max_health,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.lifecycle.is_alive()
    }

    /// Public replicated view, without the role
    pub fn view(&self) -> PlayerView {
        PlayerView {
            stable_index: self.stable_index,
            nickname: self.nickname.clone(),
            lifecycle: self.lifecycle,
        }
    }
}

/// Tracks every registered player of one session
///
/// The registry enforces one player per connection and hands out stable
/// indices. It does not know about match phases; the coordinator decides
/// when registration is allowed.
pub struct PlayerRegistry {
    /// Registered players indexed by their connection
    players: HashMap<ConnectionId, Player>,
    /// Next stable index to hand out
    next_stable_index: u32,
    /// Maximum number of concurrent players
    capacity: usize,
    /// Health every new player starts with
    max_health: f32,
}

impl PlayerRegistry {
    /// Creates an empty registry with the given capacity
    pub fn new(capacity: usize, max_health: f32) -> Self {
        Self {
            players: HashMap::new(),
            next_stable_index: 0,
            capacity,
            max_health,
        }
    }

    /// Registers a player for `connection_id`
    ///
    /// Fails with `DuplicateRegistration` if the connection already has a
    /// player and with `SessionFull` once capacity is reached. The stable
    /// index comes from a counter that is never rewound within a session, so
    /// a newcomer never inherits the seat of someone who left.
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        nickname: String,
    ) -> Result<&Player, CoordinatorError> {
        if self.players.contains_key(&connection_id) {
            return Err(CoordinatorError::DuplicateRegistration);
        }
        if self.players.len() >= self.capacity {
            return Err(CoordinatorError::SessionFull {
                capacity: self.capacity,
            });
        }

        let stable_index = self.next_stable_index;
        self.next_stable_index += 1;

        info!(
            "Registered connection {} as seat {} ({})",
            connection_id, stable_index, nickname
        );

        let player = Player::new(connection_id, stable_index, nickname, self.max_health);
        Ok(self.players.entry(connection_id).or_insert(player))
    }

    /// Removes the player for `connection_id`, returning it if present
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<Player> {
        let removed = self.players.remove(&connection_id);
        if let Some(player) = &removed {
            info!(
                "Unregistered connection {} (seat {})",
                connection_id, player.stable_index
            );
        }
        removed
    }

    pub fn stable_index(&self, connection_id: ConnectionId) -> Result<u32, CoordinatorError> {
        self.players
            .get(&connection_id)
            .map(|player| player.stable_index)
            .ok_or(CoordinatorError::NotFound)
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&Player> {
        self.players.get(&connection_id)
    }

    pub fn get_mut(&mut self, connection_id: ConnectionId) -> Option<&mut Player> {
        self.players.get_mut(&connection_id)
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.players.contains_key(&connection_id)
    }

    /// Players ordered by stable index
    pub fn players(&self) -> Vec<&Player> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by_key(|player| player.stable_index);
        players
    }

    /// Connection ids ordered by stable index
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.players()
            .into_iter()
            .map(|player| player.connection_id)
            .collect()
    }

    /// Roles of every player still alive
    pub fn alive_roles(&self) -> Vec<Role> {
        self.players
            .values()
            .filter(|player| player.is_alive())
            .map(|player| player.role)
            .collect()
    }

    /// True once every registered player holds a real role
    pub fn all_assigned(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.role != Role::None)
    }

    pub fn views(&self) -> Vec<PlayerView> {
        self.players().into_iter().map(Player::view).collect()
    }

    /// Drops every player and restarts the index counter for a new session
    pub fn clear(&mut self) {
        self.players.clear();
        self.next_stable_index = 0;
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
