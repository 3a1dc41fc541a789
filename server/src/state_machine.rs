use crate::error::CoordinatorError;
use log::info;
use shared::MatchPhase;

/// Session phase with one-directional transitions
///
/// Waiting -> Starting -> InProgress -> Ended. The only way back is `reset`,
/// which starts a fresh session on the same instance.
#[derive(Debug, Default)]
pub struct MatchStateMachine {
    phase: MatchPhase,
}

impl MatchStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn is(&self, phase: MatchPhase) -> bool {
        self.phase == phase
    }

    /// Moves to `to` if it directly follows the current phase.
    /// Returns the phase that was left.
    pub fn advance(&mut self, to: MatchPhase) -> Result<MatchPhase, CoordinatorError> {
        let from = self.phase;
        let allowed = matches!(
            (from, to),
            (MatchPhase::Waiting, MatchPhase::Starting)
                | (MatchPhase::Starting, MatchPhase::InProgress)
                | (MatchPhase::InProgress, MatchPhase::Ended)
        );

        if !allowed {
            return Err(CoordinatorError::InvalidTransition { from, to });
        }

        self.phase = to;
        info!("Match phase {} -> {}", from, to);
        Ok(from)
    }

    /// Returns to Waiting. Returns the phase that was left.
    pub fn reset(&mut self) -> MatchPhase {
        std::mem::take(&mut self.phase)
    }
}
