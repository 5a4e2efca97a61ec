use core_types::{AgentKind, CoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Agent received invalid parameters: {0}")]
    InvalidParameters(String),

    /// The observation was built for a different schema than the agent expects.
    #[error("Observation shape mismatch: expected schema v{expected_version} with {expected_dim} features, got v{actual_version} with {actual_dim}")]
    ShapeMismatch {
        expected_version: u32,
        expected_dim: usize,
        actual_version: u32,
        actual_dim: usize,
    },

    #[error("Policy snapshot is for a '{found}' agent, expected '{expected}'")]
    KindMismatch { expected: AgentKind, found: AgentKind },

    #[error("Failed to (de)serialize policy state: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Agent produced an invalid action: {0}")]
    InvalidAction(#[from] CoreError),
}
