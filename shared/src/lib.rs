use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a transport connection, stable for the connection's lifetime
pub type ConnectionId = u32;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    None,
    Sheriff,
    Deputy,
    Outlaw,
    Renegade,
}

impl Role {
    /// The coalition this role wins with, if any
    pub fn team(self) -> Option<Team> {
        match self {
            Role::None => None,
            Role::Sheriff | Role::Deputy => Some(Team::Sheriff),
            Role::Outlaw => Some(Team::Outlaws),
            Role::Renegade => Some(Team::Renegade),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::None => "None",
            Role::Sheriff => "Sheriff",
            Role::Deputy => "Deputy",
            Role::Outlaw => "Outlaw",
            Role::Renegade => "Renegade",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    #[default]
    Alive,
    Cutscene,
    Dead,
}

impl LifecycleState {
    /// Cutscene players are still in the match
    pub fn is_alive(self) -> bool {
        !matches!(self, LifecycleState::Dead)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Team {
    /// Sheriff and Deputies
    Sheriff,
    /// Outlaws, joined by the Renegade while the Sheriff lives
    Outlaws,
    Renegade,
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Team::Sheriff => "Sheriff",
            Team::Outlaws => "Outlaws",
            Team::Renegade => "Renegade",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatchPhase {
    #[default]
    Waiting,
    Starting,
    InProgress,
    Ended,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchPhase::Waiting => "Waiting",
            MatchPhase::Starting => "Starting",
            MatchPhase::InProgress => "InProgress",
            MatchPhase::Ended => "Ended",
        };
        f.write_str(name)
    }
}

/// Publicly replicated view of a player. Roles are deliberately absent.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerView {
    pub stable_index: u32,
    pub nickname: String,
    pub lifecycle: LifecycleState,
}

/// Why the server refused a request
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    DuplicateRegistration,
    NotFound,
    AlreadyAssigned,
    SessionEnded,
    InvalidRosterSize,
    SessionFull,
    RegistrationClosed,
    NotEnoughPlayers,
    MatchNotInProgress,
    InvalidTransition,
    NotRegistered,
    NicknameTooLong,
}

/// Session-wide notifications. Each one is delivered inside
/// `Packet::Event` with a sequence number clients use to drop duplicates.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    PhaseChanged {
        old: MatchPhase,
        new: MatchPhase,
    },
    PlayerJoined {
        stable_index: u32,
        nickname: String,
    },
    PlayerLeft {
        stable_index: u32,
    },
    NicknameChanged {
        stable_index: u32,
        old: String,
        new: String,
    },
    LifecycleChanged {
        stable_index: u32,
        old: LifecycleState,
        new: LifecycleState,
    },
    /// Clients should load the match scene and answer with `SceneLoaded`
    MatchStarting,
    RolesAssigned,
    MatchInitialized,
    MatchEnded {
        winning_team: Team,
        revealed_roles: Vec<(String, Role)>,
    },
    SessionReset,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client to server
    Join {
        nickname: String,
    },
    SetNickname {
        nickname: String,
    },
    LobbyReady,
    SceneLoaded,
    Heartbeat,
    Leave,

    // Server to client
    Connected {
        connection_id: ConnectionId,
    },
    Joined {
        stable_index: u32,
    },
    YourRole {
        role: Role,
    },
    Event {
        sequence: u64,
        event: ServerEvent,
    },
    Roster {
        phase: MatchPhase,
        players: Vec<PlayerView>,
    },
    Rejected {
        reason: RejectReason,
    },
    Disconnected {
        reason: String,
    },
}

pub fn encode_packet(packet: &Packet) -> bincode::Result<Vec<u8>> {
    bincode::serialize(packet)
}

pub fn decode_packet(bytes: &[u8]) -> bincode::Result<Packet> {
    bincode::deserialize(bytes)
}
