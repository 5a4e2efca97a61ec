use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The side of the market a position is exposed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// `+1` for long, `-1` for short. Multiplying a price move by this yields P&L per unit.
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
    /// Closed by a stop-loss trigger rather than by the agent.
    Liquidated,
}

/// What kind of session an episode belongs to.
///
/// Exploration is only ever allowed in `Training` and `Simulation` sessions; the mode
/// is carried explicitly through configuration instead of being inferred at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Training,
    /// Paper trading against live-like data.
    Simulation,
    /// Read-only replay of a frozen policy (parallel backtests).
    Evaluation,
    Live,
}

impl SessionMode {
    pub fn allows_exploration(&self) -> bool {
        matches!(self, SessionMode::Training | SessionMode::Simulation)
    }

    /// Evaluation replicas follow a published policy and never update it.
    pub fn learns(&self) -> bool {
        !matches!(self, SessionMode::Evaluation)
    }
}

/// Identifies which `StrategyAgent` variant to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Tabular,
    Linear,
    RuleBased,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentKind::Tabular => "tabular",
            AgentKind::Linear => "linear",
            AgentKind::RuleBased => "rule_based",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exploration_is_limited_to_training_and_simulation() {
        assert!(SessionMode::Training.allows_exploration());
        assert!(SessionMode::Simulation.allows_exploration());
        assert!(!SessionMode::Evaluation.allows_exploration());
        assert!(!SessionMode::Live.allows_exploration());
        assert!(SessionMode::Live.learns());
        assert!(!SessionMode::Evaluation.learns());
    }

    #[test]
    fn direction_sign_matches_side() {
        assert_eq!(Direction::Long.sign(), Decimal::ONE);
        assert_eq!(Direction::Short.sign(), Decimal::NEGATIVE_ONE);
        assert_eq!(Direction::Long.opposite(), Direction::Short);
    }
}
