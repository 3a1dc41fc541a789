//! Match session coordinator
//!
//! The coordinator is the single writer for one match session. It owns the
//! roster, the phase machine, the scene-load barrier and role assignment,
//! and it is the only place win conditions are evaluated. Every inbound
//! event is applied through `&mut self`, so two triggers can never
//! interleave: whichever death or disconnect is processed first decides the
//! match, and the second one finds the session already Ended.
//!
//! Outbound traffic goes through the `EventBroadcaster`; the coordinator
//! never touches sockets.

use crate::barrier::SceneLoadBarrier;
use crate::broadcast::{EventBroadcaster, GameMessage};
use crate::registry::{Player, PlayerRegistry};
use crate::roles;
use crate::state_machine::MatchStateMachine;
use crate::win;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ConnectionId, LifecycleState, MatchPhase, Packet, Role, ServerEvent, Team};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub use crate::error::CoordinatorError;

/// Default nickname limit in bytes. Snapshots and the end-of-match reveal
/// carry every nickname in one frame, so the roster times this limit has to
/// stay well under the transport's frame size.
pub const MAX_NICKNAME_LEN: usize = 32;

/// Tunables for a single session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Players required before the lobby may start the match
    pub min_players: usize,
    /// Roster capacity
    pub max_players: usize,
    /// Health each player starts with
    pub max_health: f32,
    /// Automatically reset this long after the match ends
    pub reset_after_end: Option<Duration>,
    /// Roster snapshots go out at most once per this many ticks
    pub snapshot_every_ticks: u64,
    /// Longest accepted nickname, in bytes
    pub max_nickname_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_players: roles::MIN_TABLE_PLAYERS,
            max_players: roles::MAX_TABLE_PLAYERS,
            max_health: 100.0,
            reset_after_end: Some(Duration::from_secs(10)),
            snapshot_every_ticks: 15,
            max_nickname_len: MAX_NICKNAME_LEN,
        }
    }
}

/// Authoritative state of one match session
///
/// Owns the roster, phase, scene barrier and role assignment. Outbound
/// packets are queued as `GameMessage`s; the caller decides how they reach
/// the wire. Not thread-safe on purpose: the server loop is its only owner.
pub struct MatchCoordinator {
    config: SessionConfig,
    registry: PlayerRegistry,
    barrier: SceneLoadBarrier,
    machine: MatchStateMachine,
    broadcaster: EventBroadcaster,
    rng: StdRng,
    roles_assigned: bool,
    winner: Option<Team>,
    ended_at: Option<Instant>,
    ticks: u64,
    roster_dirty: bool,
}

impl MatchCoordinator {
    /// Coordinator with an entropy-seeded role shuffle
    pub fn new(config: SessionConfig, outbound: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self::with_rng(config, outbound, StdRng::from_entropy())
    }

    /// Coordinator with a reproducible role shuffle
    pub fn with_seed(
        config: SessionConfig,
        outbound: mpsc::UnboundedSender<GameMessage>,
        seed: u64,
    ) -> Self {
        Self::with_rng(config, outbound, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        config: SessionConfig,
        outbound: mpsc::UnboundedSender<GameMessage>,
        rng: StdRng,
    ) -> Self {
        Self {
            registry: PlayerRegistry::new(config.max_players, config.max_health),
            barrier: SceneLoadBarrier::new(),
            machine: MatchStateMachine::new(),
            broadcaster: EventBroadcaster::new(outbound),
            rng,
            roles_assigned: false,
            winner: None,
            ended_at: None,
            ticks: 0,
            roster_dirty: false,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> MatchPhase {
        self.machine.phase()
    }

    /// Winning team once the match has ended
    pub fn winner(&self) -> Option<Team> {
        self.winner
    }

    /// Registered player for a connection
    pub fn player(&self, connection_id: ConnectionId) -> Option<&Player> {
        self.registry.get(connection_id)
    }

    /// Read-only roster ordered by stable index
    pub fn players(&self) -> Vec<&Player> {
        self.registry.players()
    }

    pub fn roster_len(&self) -> usize {
        self.registry.len()
    }

    /// Seat number of a registered connection, `NotFound` otherwise
    pub fn stable_index(&self, connection_id: ConnectionId) -> Result<u32, CoordinatorError> {
        self.registry.stable_index(connection_id)
    }

    /// Scene-load barrier state, for hosts that watch a Starting session
    pub fn barrier(&self) -> &SceneLoadBarrier {
        &self.barrier
    }

    /// Admits a player and returns its stable index. Only possible while
    /// Waiting.
    pub fn register_player(
        &mut self,
        connection_id: ConnectionId,
        nickname: String,
    ) -> Result<u32, CoordinatorError> {
        match self.phase() {
            MatchPhase::Waiting => {}
            MatchPhase::Ended => return Err(CoordinatorError::SessionEnded),
            phase => return Err(CoordinatorError::RegistrationClosed(phase)),
        }
        self.check_nickname(&nickname)?;

        let player = self.registry.register(connection_id, nickname)?;
        let stable_index = player.stable_index;
        let nickname = player.nickname.clone();

        self.broadcaster
            .send_to(connection_id, Packet::Joined { stable_index });
        self.broadcaster.send_to(connection_id, self.snapshot());
        self.broadcaster.announce(ServerEvent::PlayerJoined {
            stable_index,
            nickname,
        });
        self.on_roster_changed(None);

        Ok(stable_index)
    }

    /// Removes a player. Unknown connections are ignored.
    pub fn unregister_player(&mut self, connection_id: ConnectionId) -> Result<(), CoordinatorError> {
        let Some(player) = self.registry.unregister(connection_id) else {
            debug!("Unregister for unknown connection {}", connection_id);
            return Ok(());
        };

        self.broadcaster.announce(ServerEvent::PlayerLeft {
            stable_index: player.stable_index,
        });
        self.on_roster_changed(Some(connection_id));
        Ok(())
    }

    /// Lobby trigger: every player in the room is ready
    pub fn notify_all_players_ready(&mut self) -> Result<(), CoordinatorError> {
        match self.phase() {
            MatchPhase::Waiting => {}
            MatchPhase::Ended => return Err(CoordinatorError::SessionEnded),
            phase => {
                debug!("Ignoring ready trigger while {}", phase);
                return Ok(());
            }
        }

        let have = self.registry.len();
        if have < self.config.min_players {
            return Err(CoordinatorError::NotEnoughPlayers {
                have,
                need: self.config.min_players,
            });
        }

        self.advance(MatchPhase::Starting)?;
        self.barrier.arm(self.registry.connection_ids());
        self.broadcaster.announce(ServerEvent::MatchStarting);
        Ok(())
    }

    /// Scene-load acknowledgement. Returns true if it released the barrier.
    pub fn notify_ready(&mut self, connection_id: ConnectionId) -> Result<bool, CoordinatorError> {
        if self.machine.is(MatchPhase::Ended) {
            return Err(CoordinatorError::SessionEnded);
        }
        if !self.registry.contains(connection_id) {
            return Err(CoordinatorError::NotFound);
        }
        if !self.machine.is(MatchPhase::Starting) {
            debug!(
                "Ignoring scene ack from {} while {}",
                connection_id,
                self.phase()
            );
            return Ok(false);
        }

        let released = self.barrier.acknowledge(connection_id);
        if released {
            self.on_barrier_released();
        }
        Ok(released)
    }

    /// Distributes roles and starts the match. Runs automatically when the
    /// barrier releases; calling it again is rejected with `AlreadyAssigned`.
    pub fn assign_roles(&mut self) -> Result<(), CoordinatorError> {
        self.distribute_roles()?;

        if self.advance(MatchPhase::InProgress).is_ok() {
            self.broadcaster.announce(ServerEvent::MatchInitialized);
        }
        Ok(())
    }

    /// A damage collaborator reports that a player died
    pub fn notify_death(&mut self, connection_id: ConnectionId) -> Result<(), CoordinatorError> {
        self.ensure_in_progress()?;

        let player = self
            .registry
            .get(connection_id)
            .ok_or(CoordinatorError::NotFound)?;
        if player.lifecycle == LifecycleState::Dead {
            debug!("Connection {} is already dead", connection_id);
            return Ok(());
        }

        self.kill(connection_id);
        Ok(())
    }

    /// Applies damage; a player whose health reaches zero dies
    pub fn notify_damage(
        &mut self,
        connection_id: ConnectionId,
        amount: f32,
    ) -> Result<(), CoordinatorError> {
        self.ensure_in_progress()?;

        let player = self
            .registry
            .get_mut(connection_id)
            .ok_or(CoordinatorError::NotFound)?;
        if !player.is_alive() || amount <= 0.0 {
            return Ok(());
        }

        player.health = (player.health - amount).max(0.0);
        debug!(
            "Seat {} took {} damage, {} left",
            player.stable_index, amount, player.health
        );

        if player.health <= 0.0 {
            self.kill(connection_id);
        }
        Ok(())
    }

    /// Restores health up to the configured maximum
    pub fn notify_heal(
        &mut self,
        connection_id: ConnectionId,
        amount: f32,
    ) -> Result<(), CoordinatorError> {
        self.ensure_in_progress()?;

        let max_health = self.config.max_health;
        let player = self
            .registry
            .get_mut(connection_id)
            .ok_or(CoordinatorError::NotFound)?;
        if !player.is_alive() || amount <= 0.0 {
            return Ok(());
        }

        player.health = (player.health + amount).min(max_health);
        debug!("Seat {} healed to {}", player.stable_index, player.health);
        Ok(())
    }

    /// Moves a living player into or out of a cutscene
    pub fn set_cutscene(
        &mut self,
        connection_id: ConnectionId,
        active: bool,
    ) -> Result<(), CoordinatorError> {
        self.ensure_in_progress()?;

        let player = self
            .registry
            .get_mut(connection_id)
            .ok_or(CoordinatorError::NotFound)?;
        let old = player.lifecycle;
        let new = match (old, active) {
            (LifecycleState::Alive, true) => LifecycleState::Cutscene,
            (LifecycleState::Cutscene, false) => LifecycleState::Alive,
            _ => return Ok(()),
        };
        player.lifecycle = new;
        let stable_index = player.stable_index;

        self.broadcaster.announce(ServerEvent::LifecycleChanged {
            stable_index,
            old,
            new,
        });
        self.roster_dirty = true;
        Ok(())
    }

    /// Renames a player in any phase but Ended
    pub fn set_nickname(
        &mut self,
        connection_id: ConnectionId,
        nickname: String,
    ) -> Result<(), CoordinatorError> {
        if self.machine.is(MatchPhase::Ended) {
            return Err(CoordinatorError::SessionEnded);
        }
        self.check_nickname(&nickname)?;

        let player = self
            .registry
            .get_mut(connection_id)
            .ok_or(CoordinatorError::NotFound)?;
        if player.nickname == nickname {
            return Ok(());
        }

        let old = std::mem::replace(&mut player.nickname, nickname.clone());
        let stable_index = player.stable_index;

        self.broadcaster.announce(ServerEvent::NicknameChanged {
            stable_index,
            old,
            new: nickname,
        });
        self.roster_dirty = true;
        Ok(())
    }

    /// Clears roster, roles and barrier and returns to Waiting
    pub fn reset_session(&mut self) {
        info!(
            "Resetting session ({} players, phase {})",
            self.registry.len(),
            self.phase()
        );

        self.registry.clear();
        self.barrier.reset();
        self.roles_assigned = false;
        self.winner = None;
        self.ended_at = None;
        self.broadcaster.reset();

        let old = self.machine.reset();
        if old != MatchPhase::Waiting {
            self.broadcaster.announce(ServerEvent::PhaseChanged {
                old,
                new: MatchPhase::Waiting,
            });
        }
        self.broadcaster.announce(ServerEvent::SessionReset);
        self.roster_dirty = true;
    }

    /// Per-session timer callback, driven at the server tick rate
    pub fn tick(&mut self, now: Instant) {
        self.ticks += 1;

        if let (Some(delay), Some(ended_at)) = (self.config.reset_after_end, self.ended_at) {
            if now.saturating_duration_since(ended_at) >= delay {
                self.reset_session();
            }
        }

        if self.roster_dirty && self.ticks % self.config.snapshot_every_ticks.max(1) == 0 {
            self.broadcaster.broadcast(self.snapshot());
            self.roster_dirty = false;
        }
    }

    /// Public roster state. Roles are never included.
    pub fn snapshot(&self) -> Packet {
        Packet::Roster {
            phase: self.phase(),
            players: self.registry.views(),
        }
    }

    fn on_roster_changed(&mut self, departed: Option<ConnectionId>) {
        self.roster_dirty = true;

        let Some(connection_id) = departed else {
            return;
        };

        match self.phase() {
            MatchPhase::Starting => {
                if self.barrier.forget(connection_id) {
                    self.on_barrier_released();
                }
            }
            MatchPhase::InProgress => self.check_win(),
            _ => {}
        }
    }

    fn on_barrier_released(&mut self) {
        info!(
            "Scene barrier released ({} of {} acknowledged)",
            self.barrier.acknowledged_count(),
            self.barrier.expected_count()
        );

        if let Err(e) = self.assign_roles() {
            warn!("Role assignment skipped: {}", e);
        }
    }

    fn distribute_roles(&mut self) -> Result<(), CoordinatorError> {
        if self.machine.is(MatchPhase::Ended) {
            return Err(CoordinatorError::SessionEnded);
        }
        if self.roles_assigned || self.registry.all_assigned() {
            return Err(CoordinatorError::AlreadyAssigned);
        }
        if !self.machine.is(MatchPhase::Starting) || !self.barrier.is_released() {
            return Err(CoordinatorError::InvalidTransition {
                from: self.phase(),
                to: MatchPhase::InProgress,
            });
        }

        let player_count = self.registry.len();
        let roles = roles::distribute(player_count, &mut self.rng);
        if roles.is_empty() {
            return Err(CoordinatorError::InvalidRosterSize(player_count));
        }

        let seats = self.registry.connection_ids();
        for (connection_id, role) in seats.into_iter().zip(roles) {
            if let Some(player) = self.registry.get_mut(connection_id) {
                player.role = role;
            }
            self.broadcaster
                .send_to(connection_id, Packet::YourRole { role });
        }

        self.roles_assigned = true;
        info!("Assigned roles to {} players", player_count);
        self.broadcaster.announce(ServerEvent::RolesAssigned);
        Ok(())
    }

    fn kill(&mut self, connection_id: ConnectionId) {
        let Some(player) = self.registry.get_mut(connection_id) else {
            return;
        };

        let old = player.lifecycle;
        player.lifecycle = LifecycleState::Dead;
        player.health = 0.0;
        let stable_index = player.stable_index;
        info!("Seat {} ({}) died", stable_index, player.nickname);

        self.broadcaster.announce(ServerEvent::LifecycleChanged {
            stable_index,
            old,
            new: LifecycleState::Dead,
        });
        self.roster_dirty = true;
        self.check_win();
    }

    fn check_win(&mut self) {
        if !self.machine.is(MatchPhase::InProgress) {
            return;
        }

        if let Some(team) = win::evaluate(&self.registry.alive_roles()) {
            self.end_match(team);
        }
    }

    fn end_match(&mut self, winning_team: Team) {
        if self.advance(MatchPhase::Ended).is_err() {
            return;
        }

        self.winner = Some(winning_team);
        self.ended_at = Some(Instant::now());
        info!("Match ended, {} win", winning_team);

        let revealed_roles: Vec<(String, Role)> = self
            .registry
            .players()
            .into_iter()
            .map(|player| (player.nickname.clone(), player.role))
            .collect();

        self.broadcaster.announce(ServerEvent::MatchEnded {
            winning_team,
            revealed_roles,
        });
    }

    fn check_nickname(&self, nickname: &str) -> Result<(), CoordinatorError> {
        let max = self.config.max_nickname_len;
        if nickname.len() > max {
            return Err(CoordinatorError::NicknameTooLong {
                len: nickname.len(),
                max,
            });
        }
        Ok(())
    }

    fn ensure_in_progress(&self) -> Result<(), CoordinatorError> {
        match self.phase() {
            MatchPhase::InProgress => Ok(()),
            MatchPhase::Ended => Err(CoordinatorError::SessionEnded),
            phase => Err(CoordinatorError::MatchNotInProgress(phase)),
        }
    }

    fn advance(&mut self, to: MatchPhase) -> Result<(), CoordinatorError> {
        match self.machine.advance(to) {
            Ok(old) => {
                self.broadcaster
                    .announce(ServerEvent::PhaseChanged { old, new: to });
                self.roster_dirty = true;
                Ok(())
            }
            Err(e) => {
                error!("Rejected phase change: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn coordinator() -> (MatchCoordinator, mpsc::UnboundedReceiver<GameMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = SessionConfig {
            snapshot_every_ticks: 1,
            ..SessionConfig::default()
        };
        (MatchCoordinator::with_seed(config, tx, 42), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<GameMessage>) -> Vec<GameMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn events(messages: &[GameMessage]) -> Vec<ServerEvent> {
        messages
            .iter()
            .filter_map(|message| match message {
                GameMessage::BroadcastPacket {
                    packet: Packet::Event { event, .. },
                } => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    fn register(coordinator: &mut MatchCoordinator, count: u32) {
        for id in 1..=count {
            coordinator
                .register_player(id, format!("player{}", id))
                .unwrap();
        }
    }

    fn start(coordinator: &mut MatchCoordinator, count: u32) {
        register(coordinator, count);
        coordinator.notify_all_players_ready().unwrap();
        for id in 1..=count {
            coordinator.notify_ready(id).unwrap();
        }
        assert_eq!(coordinator.phase(), MatchPhase::InProgress);
    }

    fn seat_with(coordinator: &MatchCoordinator, role: Role) -> Vec<ConnectionId> {
        coordinator
            .players()
            .into_iter()
            .filter(|player| player.role == role)
            .map(|player| player.connection_id)
            .collect()
    }

    #[test]
    fn test_register_sends_joined_and_announces() {
        let (mut coordinator, mut rx) = coordinator();

        assert_eq!(coordinator.register_player(7, "alice".into()), Ok(0));

        let messages = drain(&mut rx);
        assert!(messages.contains(&GameMessage::SendPacket {
            connection_id: 7,
            packet: Packet::Joined { stable_index: 0 },
        }));
        assert_eq!(
            events(&messages),
            vec![ServerEvent::PlayerJoined {
                stable_index: 0,
                nickname: "alice".into(),
            }]
        );
    }

    #[test]
    fn test_duplicate_registration() {
        let (mut coordinator, _rx) = coordinator();
        coordinator.register_player(1, "a".into()).unwrap();

        assert_eq!(
            coordinator.register_player(1, "b".into()),
            Err(CoordinatorError::DuplicateRegistration)
        );
        assert_eq!(coordinator.roster_len(), 1);
    }

    #[test]
    fn test_oversized_nickname_rejected() {
        let (mut coordinator, mut rx) = coordinator();

        assert_eq!(
            coordinator.register_player(1, "x".repeat(40_000)),
            Err(CoordinatorError::NicknameTooLong {
                len: 40_000,
                max: MAX_NICKNAME_LEN,
            })
        );
        assert_eq!(coordinator.roster_len(), 0);
        assert!(drain(&mut rx).is_empty());

        let longest = "y".repeat(MAX_NICKNAME_LEN);
        assert_eq!(coordinator.register_player(1, longest.clone()), Ok(0));
        assert!(matches!(
            coordinator.set_nickname(1, "z".repeat(MAX_NICKNAME_LEN + 1)),
            Err(CoordinatorError::NicknameTooLong { .. })
        ));
        assert_eq!(coordinator.player(1).unwrap().nickname, longest);
    }

    #[test]
    fn test_start_requires_minimum_players() {
        let (mut coordinator, _rx) = coordinator();
        register(&mut coordinator, 3);

        assert_eq!(
            coordinator.notify_all_players_ready(),
            Err(CoordinatorError::NotEnoughPlayers { have: 3, need: 4 })
        );
        assert_eq!(coordinator.phase(), MatchPhase::Waiting);
    }

    #[test]
    fn test_registration_closed_after_start() {
        let (mut coordinator, _rx) = coordinator();
        register(&mut coordinator, 4);
        coordinator.notify_all_players_ready().unwrap();

        assert_eq!(
            coordinator.register_player(9, "late".into()),
            Err(CoordinatorError::RegistrationClosed(MatchPhase::Starting))
        );
    }

    #[test]
    fn test_full_start_assigns_every_role_once() {
        let (mut coordinator, mut rx) = coordinator();
        start(&mut coordinator, 5);

        assert_eq!(seat_with(&coordinator, Role::Sheriff).len(), 1);
        assert_eq!(seat_with(&coordinator, Role::Renegade).len(), 1);
        assert_eq!(seat_with(&coordinator, Role::Outlaw).len(), 2);
        assert_eq!(seat_with(&coordinator, Role::Deputy).len(), 1);

        let messages = drain(&mut rx);
        let private_roles = messages
            .iter()
            .filter(|m| {
                matches!(
                    m,
                    GameMessage::SendPacket {
                        packet: Packet::YourRole { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(private_roles, 5);

        let events = events(&messages);
        let count = |wanted: &ServerEvent| events.iter().filter(|e| *e == wanted).count();
        assert_eq!(count(&ServerEvent::MatchStarting), 1);
        assert_eq!(count(&ServerEvent::RolesAssigned), 1);
        assert_eq!(count(&ServerEvent::MatchInitialized), 1);
    }

    #[test]
    fn test_roles_never_broadcast_before_end() {
        let (mut coordinator, mut rx) = coordinator();
        start(&mut coordinator, 4);

        for message in drain(&mut rx) {
            if let GameMessage::BroadcastPacket { packet } = message {
                assert!(!matches!(packet, Packet::YourRole { .. }));
            }
        }
    }

    #[test]
    fn test_assign_roles_twice_rejected() {
        let (mut coordinator, _rx) = coordinator();
        start(&mut coordinator, 4);

        assert_eq!(
            coordinator.assign_roles(),
            Err(CoordinatorError::AlreadyAssigned)
        );
    }

    #[test]
    fn test_assign_roles_before_barrier_release_rejected() {
        let (mut coordinator, _rx) = coordinator();
        register(&mut coordinator, 4);
        coordinator.notify_all_players_ready().unwrap();

        assert!(matches!(
            coordinator.assign_roles(),
            Err(CoordinatorError::InvalidTransition { .. })
        ));
        assert!(coordinator.players().iter().all(|p| p.role == Role::None));
    }

    #[test]
    fn test_scene_ack_outside_starting_is_ignored() {
        let (mut coordinator, _rx) = coordinator();
        register(&mut coordinator, 4);

        assert_eq!(coordinator.notify_ready(1), Ok(false));
        assert_eq!(coordinator.notify_ready(99), Err(CoordinatorError::NotFound));
    }

    #[test]
    fn test_scene_ack_after_leaving_does_not_move_barrier() {
        let (mut coordinator, _rx) = coordinator();
        register(&mut coordinator, 5);
        coordinator.notify_all_players_ready().unwrap();

        coordinator.unregister_player(5).unwrap();
        assert_eq!(coordinator.barrier().expected_count(), 4);

        assert_eq!(coordinator.notify_ready(5), Err(CoordinatorError::NotFound));
        assert_eq!(coordinator.barrier().expected_count(), 4);
        assert_eq!(coordinator.barrier().acknowledged_count(), 0);
        assert!(!coordinator.barrier().is_released());

        for id in 1..=3 {
            assert_eq!(coordinator.notify_ready(id), Ok(false));
        }
        assert_eq!(coordinator.notify_ready(4), Ok(true));
        assert_eq!(coordinator.phase(), MatchPhase::InProgress);
    }

    #[test]
    fn test_roster_too_small_at_release_skips_assignment() {
        let (mut coordinator, _rx) = coordinator();
        register(&mut coordinator, 4);
        coordinator.notify_all_players_ready().unwrap();

        coordinator.notify_ready(1).unwrap();
        coordinator.notify_ready(2).unwrap();
        coordinator.notify_ready(3).unwrap();
        // Acknowledged then left: still counts, but only three players remain
        coordinator.unregister_player(3).unwrap();
        assert_eq!(coordinator.notify_ready(4), Ok(true));

        assert_eq!(coordinator.phase(), MatchPhase::Starting);
        assert_eq!(
            coordinator.assign_roles(),
            Err(CoordinatorError::InvalidRosterSize(3))
        );
    }

    #[test]
    fn test_lifecycle_calls_require_in_progress() {
        let (mut coordinator, _rx) = coordinator();
        register(&mut coordinator, 4);

        assert_eq!(
            coordinator.notify_death(1),
            Err(CoordinatorError::MatchNotInProgress(MatchPhase::Waiting))
        );
        assert_eq!(
            coordinator.notify_damage(1, 10.0),
            Err(CoordinatorError::MatchNotInProgress(MatchPhase::Waiting))
        );
    }

    #[test]
    fn test_damage_kills_at_zero_health() {
        let (mut coordinator, _rx) = coordinator();
        start(&mut coordinator, 7);
        let deputy = seat_with(&coordinator, Role::Deputy)[0];

        coordinator.notify_damage(deputy, 60.0).unwrap();
        assert_approx_eq!(coordinator.player(deputy).unwrap().health, 40.0);
        assert_eq!(
            coordinator.player(deputy).unwrap().lifecycle,
            LifecycleState::Alive
        );

        coordinator.notify_damage(deputy, 60.0).unwrap();
        let player = coordinator.player(deputy).unwrap();
        assert_approx_eq!(player.health, 0.0);
        assert_eq!(player.lifecycle, LifecycleState::Dead);
        assert_eq!(coordinator.phase(), MatchPhase::InProgress);
    }

    #[test]
    fn test_heal_is_capped_and_ignored_for_dead() {
        let (mut coordinator, _rx) = coordinator();
        start(&mut coordinator, 7);
        let deputies = seat_with(&coordinator, Role::Deputy);

        coordinator.notify_damage(deputies[0], 30.0).unwrap();
        coordinator.notify_heal(deputies[0], 50.0).unwrap();
        assert_approx_eq!(coordinator.player(deputies[0]).unwrap().health, 100.0);

        coordinator.notify_death(deputies[1]).unwrap();
        coordinator.notify_heal(deputies[1], 50.0).unwrap();
        assert_approx_eq!(coordinator.player(deputies[1]).unwrap().health, 0.0);
    }

    #[test]
    fn test_cutscene_round_trip() {
        let (mut coordinator, mut rx) = coordinator();
        start(&mut coordinator, 4);
        drain(&mut rx);

        coordinator.set_cutscene(1, true).unwrap();
        assert_eq!(
            coordinator.player(1).unwrap().lifecycle,
            LifecycleState::Cutscene
        );
        coordinator.set_cutscene(1, true).unwrap();
        coordinator.set_cutscene(1, false).unwrap();
        assert_eq!(
            coordinator.player(1).unwrap().lifecycle,
            LifecycleState::Alive
        );

        let changes = events(&drain(&mut rx))
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::LifecycleChanged { .. }))
            .count();
        assert_eq!(changes, 2);
    }

    #[test]
    fn test_sheriff_death_ends_match_for_outlaws() {
        let (mut coordinator, mut rx) = coordinator();
        start(&mut coordinator, 6);
        drain(&mut rx);

        let sheriff = seat_with(&coordinator, Role::Sheriff)[0];
        coordinator.notify_death(sheriff).unwrap();

        assert_eq!(coordinator.phase(), MatchPhase::Ended);
        assert_eq!(coordinator.winner(), Some(Team::Outlaws));

        let ended: Vec<ServerEvent> = events(&drain(&mut rx))
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::MatchEnded { .. }))
            .collect();
        assert_eq!(ended.len(), 1);
        match &ended[0] {
            ServerEvent::MatchEnded { revealed_roles, .. } => {
                assert_eq!(revealed_roles.len(), 6);
                assert_eq!(revealed_roles[0].0, "player1");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_disconnect_can_end_match() {
        let (mut coordinator, _rx) = coordinator();
        start(&mut coordinator, 4);

        for connection_id in seat_with(&coordinator, Role::Outlaw) {
            coordinator.notify_death(connection_id).unwrap();
        }
        assert_eq!(coordinator.phase(), MatchPhase::InProgress);

        let renegade = seat_with(&coordinator, Role::Renegade)[0];
        coordinator.unregister_player(renegade).unwrap();

        assert_eq!(coordinator.winner(), Some(Team::Sheriff));
    }

    #[test]
    fn test_calls_after_end_rejected() {
        let (mut coordinator, _rx) = coordinator();
        start(&mut coordinator, 4);
        let sheriff = seat_with(&coordinator, Role::Sheriff)[0];
        coordinator.notify_death(sheriff).unwrap();

        assert_eq!(coordinator.notify_death(1), Err(CoordinatorError::SessionEnded));
        assert_eq!(coordinator.assign_roles(), Err(CoordinatorError::SessionEnded));
        assert_eq!(
            coordinator.notify_all_players_ready(),
            Err(CoordinatorError::SessionEnded)
        );
        assert_eq!(
            coordinator.register_player(50, "late".into()),
            Err(CoordinatorError::SessionEnded)
        );
    }

    #[test]
    fn test_reset_returns_to_waiting() {
        let (mut coordinator, _rx) = coordinator();
        start(&mut coordinator, 4);
        let sheriff = seat_with(&coordinator, Role::Sheriff)[0];
        coordinator.notify_death(sheriff).unwrap();

        coordinator.reset_session();

        assert_eq!(coordinator.phase(), MatchPhase::Waiting);
        assert_eq!(coordinator.roster_len(), 0);
        assert_eq!(coordinator.winner(), None);
        assert!(!coordinator.barrier().is_armed());

        start(&mut coordinator, 4);
        assert_eq!(seat_with(&coordinator, Role::Sheriff).len(), 1);
    }

    #[test]
    fn test_tick_resets_after_game_over_delay() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = SessionConfig {
            reset_after_end: Some(Duration::from_secs(5)),
            ..SessionConfig::default()
        };
        let mut coordinator = MatchCoordinator::with_seed(config, tx, 3);
        start(&mut coordinator, 4);
        let sheriff = seat_with(&coordinator, Role::Sheriff)[0];
        coordinator.notify_death(sheriff).unwrap();

        coordinator.tick(Instant::now());
        assert_eq!(coordinator.phase(), MatchPhase::Ended);

        coordinator.tick(Instant::now() + Duration::from_secs(6));
        assert_eq!(coordinator.phase(), MatchPhase::Waiting);
    }

    #[test]
    fn test_tick_sends_snapshot_only_when_dirty() {
        let (mut coordinator, mut rx) = coordinator();
        register(&mut coordinator, 2);
        drain(&mut rx);

        coordinator.tick(Instant::now());
        let first = drain(&mut rx);
        assert_eq!(first.len(), 1);
        match &first[0] {
            GameMessage::BroadcastPacket {
                packet: Packet::Roster { phase, players },
            } => {
                assert_eq!(*phase, MatchPhase::Waiting);
                assert_eq!(players.len(), 2);
            }
            other => panic!("Unexpected message {:?}", other),
        }

        coordinator.tick(Instant::now());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_nickname_change_announced() {
        let (mut coordinator, mut rx) = coordinator();
        coordinator.register_player(1, "old".into()).unwrap();
        drain(&mut rx);

        coordinator.set_nickname(1, "new".into()).unwrap();
        assert_eq!(coordinator.player(1).unwrap().nickname, "new");
        assert_eq!(
            events(&drain(&mut rx)),
            vec![ServerEvent::NicknameChanged {
                stable_index: 0,
                old: "old".into(),
                new: "new".into(),
            }]
        );
        assert_eq!(
            coordinator.set_nickname(2, "x".into()),
            Err(CoordinatorError::NotFound)
        );
    }
}
