use shared::{MatchPhase, RejectReason};

/// Every coordinator error rejects the offending call and leaves the
/// session untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("connection already has a registered player")]
    DuplicateRegistration,

    #[error("no player registered for this connection")]
    NotFound,

    #[error("roles have already been assigned this session")]
    AlreadyAssigned,

    #[error("session has ended")]
    SessionEnded,

    #[error("no role table for a roster of {0} players")]
    InvalidRosterSize(usize),

    #[error("session is full ({capacity} players)")]
    SessionFull { capacity: usize },

    #[error("registration is closed while {0}")]
    RegistrationClosed(MatchPhase),

    #[error("not enough players: have {have}, need {need}")]
    NotEnoughPlayers { have: usize, need: usize },

    #[error("match not in progress ({0})")]
    MatchNotInProgress(MatchPhase),

    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition { from: MatchPhase, to: MatchPhase },

    #[error("nickname is {len} bytes, limit is {max}")]
    NicknameTooLong { len: usize, max: usize },
}

impl CoordinatorError {
    /// Reason sent back to the client whose request was refused
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            CoordinatorError::DuplicateRegistration => RejectReason::DuplicateRegistration,
            CoordinatorError::NotFound => RejectReason::NotFound,
            CoordinatorError::AlreadyAssigned => RejectReason::AlreadyAssigned,
            CoordinatorError::SessionEnded => RejectReason::SessionEnded,
            CoordinatorError::InvalidRosterSize(_) => RejectReason::InvalidRosterSize,
            CoordinatorError::SessionFull { .. } => RejectReason::SessionFull,
            CoordinatorError::RegistrationClosed(_) => RejectReason::RegistrationClosed,
            CoordinatorError::NotEnoughPlayers { .. } => RejectReason::NotEnoughPlayers,
            CoordinatorError::MatchNotInProgress(_) => RejectReason::MatchNotInProgress,
            CoordinatorError::InvalidTransition { .. } => RejectReason::InvalidTransition,
            CoordinatorError::NicknameTooLong { .. } => RejectReason::NicknameTooLong,
        }
    }
}
