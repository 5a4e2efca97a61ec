use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the learning loop is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Observing,
    Proposing,
    Governing,
    AwaitingExecution,
    Rewarding,
    Updated,
    Terminated,
}

impl LoopState {
    /// Whether an episode is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self, LoopState::Idle | LoopState::Terminated)
    }

    pub fn can_transition_to(&self, next: LoopState) -> bool {
        use LoopState::*;
        if next == Terminated {
            return self.is_active();
        }
        matches!(
            (self, next),
            (Idle, Observing)
                | (Observing, Observing)
                | (Observing, Proposing)
                // A triggered stop is governed without asking the agent.
                | (Observing, Governing)
                | (Proposing, Governing)
                | (Governing, AwaitingExecution)
                | (Governing, Rewarding)
                | (AwaitingExecution, Rewarding)
                | (Rewarding, Updated)
                | (Updated, Observing)
                | (Terminated, Idle)
        )
    }
}

/// Why an episode ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationReason {
    MaxSteps,
    /// Drawdown stayed at or above the fatal bar for the configured number of ticks.
    FatalDrawdown { drawdown: Decimal },
    Stopped,
    FeedExhausted,
    DataUnavailable { consecutive_skips: u32 },
    AgentFailure { detail: String },
    Fault { detail: String },
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::MaxSteps => f.write_str("max steps reached"),
            TerminationReason::FatalDrawdown { drawdown } => {
                write!(f, "fatal drawdown {drawdown}")
            }
            TerminationReason::Stopped => f.write_str("stopped"),
            TerminationReason::FeedExhausted => f.write_str("feed exhausted"),
            TerminationReason::DataUnavailable { consecutive_skips } => {
                write!(f, "data unavailable for {consecutive_skips} consecutive ticks")
            }
            TerminationReason::AgentFailure { detail } => write!(f, "agent failure: {detail}"),
            TerminationReason::Fault { detail } => write!(f, "fault: {detail}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LoopState::*;
    use super::*;

    #[test]
    fn the_happy_path_is_a_cycle() {
        let path = [
            Idle,
            Observing,
            Proposing,
            Governing,
            AwaitingExecution,
            Rewarding,
            Updated,
            Observing,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn vetoes_skip_execution() {
        assert!(Governing.can_transition_to(Rewarding));
        assert!(!Proposing.can_transition_to(AwaitingExecution));
        assert!(!Rewarding.can_transition_to(Observing));
    }

    #[test]
    fn only_active_states_terminate() {
        for state in [Observing, Proposing, Governing, AwaitingExecution, Rewarding, Updated] {
            assert!(state.can_transition_to(Terminated));
        }
        assert!(!Idle.can_transition_to(Terminated));
        assert!(!Terminated.can_transition_to(Terminated));
        assert!(Terminated.can_transition_to(Idle));
        assert!(!Terminated.can_transition_to(Observing));
    }
}
