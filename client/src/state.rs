//! Client-side mirror of the match session
//!
//! The server is the only authority. This mirror just applies what arrives:
//! sequenced events, roster snapshots and the player's own role. Events with
//! a sequence number at or below the last applied one are dropped, so a
//! repeated delivery never applies twice.

use log::{debug, info};
use shared::{
    ConnectionId, LifecycleState, MatchPhase, Packet, PlayerView, RejectReason, Role,
    ServerEvent, Team,
};
use std::collections::BTreeMap;

/// Outcome announced when the match ended
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub winning_team: Team,
    pub revealed_roles: Vec<(String, Role)>,
}

#[derive(Debug, Default)]
pub struct ClientMatchState {
    connection_id: Option<ConnectionId>,
    stable_index: Option<u32>,
    role: Role,
    phase: MatchPhase,
    roster: BTreeMap<u32, PlayerView>,
    roles_assigned: bool,
    result: Option<MatchResult>,
    last_sequence: u64,
    last_rejection: Option<RejectReason>,
    disconnect_reason: Option<String>,
}

impl ClientMatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one server packet
    ///
    /// Returns the event if the packet carried a new one, so the caller can
    /// react to it. Duplicates and non-event packets return None.
    pub fn apply(&mut self, packet: Packet) -> Option<ServerEvent> {
        match packet {
            Packet::Connected { connection_id } => {
                self.connection_id = Some(connection_id);
            }
            Packet::Joined { stable_index } => {
                info!("Joined the room as seat {}", stable_index);
                self.stable_index = Some(stable_index);
            }
            Packet::YourRole { role } => {
                info!("Our role is {}", role);
                self.role = role;
            }
            Packet::Roster { phase, players } => {
                self.phase = phase;
                self.roster = players
                    .into_iter()
                    .map(|view| (view.stable_index, view))
                    .collect();
            }
            Packet::Event { sequence, event } => {
                if sequence <= self.last_sequence {
                    debug!("Dropping duplicate event {}", sequence);
                    return None;
                }
                self.last_sequence = sequence;
                self.apply_event(&event);
                return Some(event);
            }
            Packet::Rejected { reason } => {
                info!("Server rejected request: {:?}", reason);
                self.last_rejection = Some(reason);
            }
            Packet::Disconnected { reason } => {
                info!("Disconnected by server: {}", reason);
                self.disconnect_reason = Some(reason);
            }
            _ => debug!("Ignoring client-bound packet"),
        }
        None
    }

    fn apply_event(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::PhaseChanged { new, .. } => self.phase = *new,
            ServerEvent::PlayerJoined {
                stable_index,
                nickname,
            } => {
                self.roster.insert(
                    *stable_index,
                    PlayerView {
                        stable_index: *stable_index,
                        nickname: nickname.clone(),
                        lifecycle: LifecycleState::Alive,
                    },
                );
            }
            ServerEvent::PlayerLeft { stable_index } => {
                self.roster.remove(stable_index);
            }
            ServerEvent::NicknameChanged {
                stable_index, new, ..
            } => {
                if let Some(view) = self.roster.get_mut(stable_index) {
                    view.nickname = new.clone();
                }
            }
            ServerEvent::LifecycleChanged {
                stable_index, new, ..
            } => {
                if let Some(view) = self.roster.get_mut(stable_index) {
                    view.lifecycle = *new;
                }
            }
            ServerEvent::RolesAssigned => self.roles_assigned = true,
            ServerEvent::MatchEnded {
                winning_team,
                revealed_roles,
            } => {
                info!("Match ended, {} win", winning_team);
                self.result = Some(MatchResult {
                    winning_team: *winning_team,
                    revealed_roles: revealed_roles.clone(),
                });
            }
            ServerEvent::SessionReset => self.reset_session(),
            ServerEvent::MatchStarting | ServerEvent::MatchInitialized => {}
        }
    }

    /// Forgets everything tied to the finished session. The connection and
    /// the event sequence survive.
    fn reset_session(&mut self) {
        self.stable_index = None;
        self.role = Role::None;
        self.phase = MatchPhase::Waiting;
        self.roster.clear();
        self.roles_assigned = false;
        self.result = None;
        self.last_rejection = None;
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn stable_index(&self) -> Option<u32> {
        self.stable_index
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn roster(&self) -> impl Iterator<Item = &PlayerView> {
        self.roster.values()
    }

    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }

    pub fn roles_assigned(&self) -> bool {
        self.roles_assigned
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    /// Whether our side won, once the match has ended and we held a role
    pub fn won(&self) -> Option<bool> {
        let result = self.result.as_ref()?;
        self.role.team().map(|team| team == result.winning_team)
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn last_rejection(&self) -> Option<RejectReason> {
        self.last_rejection
    }

    pub fn disconnect_reason(&self) -> Option<&str> {
        self.disconnect_reason.as_deref()
    }
}
