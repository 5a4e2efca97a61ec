//! # Meridian Strategy Agents
//!
//! This crate contains the learned policies of the Meridian decision loop. It defines a
//! universal `StrategyAgent` trait and provides several interchangeable implementations.
//!
//! ## Architectural Principles
//!
//! - **Pure Logic:** Agents have no knowledge of databases, feeds or execution. They
//!   map observations to actions and learn from transitions handed to them.
//! - **Agent Agnostic Engine:** The learning loop only talks to `StrategyAgent`, so a
//!   tabular, linear or rule-based policy can be swapped in through configuration.
//! - **Idempotent Learning:** Every agent keeps a ledger of applied transition ids. A
//!   replayed batch is skipped and leaves the serialized policy byte-identical.
//!
//! ## Public API
//!
//! - `StrategyAgent`: The core trait all agents implement.
//! - `create_agent`: The factory function to construct the configured agent.
//! - `PolicySnapshot`, `PolicyPublisher`, `PolicySubscriber`: Atomic policy distribution.
//! - The concrete agents themselves (`TabularQAgent`, `LinearQAgent`, `RuleBasedAgent`).

// Declare all the modules that constitute this crate.
pub mod action_space;
pub mod error;
pub mod exploration;
pub mod factory;
pub mod ledger;
pub mod linear;
pub mod rule_based;
pub mod snapshot;
pub mod tabular;

// Re-export the key components to create a clean, public-facing API.
pub use action_space::CatalogAction;
pub use error::StrategyError;
pub use exploration::EpsilonGreedy;
pub use factory::create_agent;
pub use ledger::TransitionLedger;
pub use linear::LinearQAgent;
pub use rule_based::RuleBasedAgent;
pub use snapshot::{PolicyPublisher, PolicySnapshot, PolicySubscriber};
pub use tabular::TabularQAgent;

use core_types::{Action, AgentKind, Observation, SessionMode, Transition};
use serde::{Deserialize, Serialize};

/// The observation layout an agent was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub schema_version: u32,
    pub dim: usize,
}

impl InputShape {
    /// Fails closed when `observation` was built for a different schema.
    pub fn check(&self, observation: &Observation) -> Result<(), StrategyError> {
        if observation.schema_version != self.schema_version || observation.len() != self.dim {
            return Err(StrategyError::ShapeMismatch {
                expected_version: self.schema_version,
                expected_dim: self.dim,
                actual_version: observation.schema_version,
                actual_dim: observation.len(),
            });
        }
        Ok(())
    }
}

/// The result of one learning update.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateStats {
    /// Transitions that changed the policy.
    pub applied: usize,
    /// Transitions already in the ledger.
    pub skipped: usize,
    /// Mean absolute temporal-difference error over the applied transitions.
    pub mean_td_error: f64,
}

/// The core trait that all strategy agents must implement.
///
/// The `&mut self` in `propose` is required because exploration advances the agent's
/// random number generator. The `Send + Sync` bounds allow agents to be moved into the
/// tokio tasks that run concurrent episodes.
pub trait StrategyAgent: Send + Sync {
    fn kind(&self) -> AgentKind;

    fn input_shape(&self) -> InputShape;

    /// Maps an observation to a proposed action.
    ///
    /// # Returns
    ///
    /// * `Ok(Action)` - the proposal, which the risk governor may still clamp or veto.
    /// * `Err(StrategyError::ShapeMismatch)` - if the observation has the wrong shape.
    fn propose(&mut self, observation: &Observation) -> Result<Action, StrategyError>;

    /// Learns from a batch of transitions, skipping any already applied.
    fn update(&mut self, batch: &[Transition]) -> Result<UpdateStats, StrategyError>;

    /// Encodes the full learnable state. Identical states encode to identical bytes.
    fn serialize(&self) -> Result<Vec<u8>, StrategyError>;

    /// Replaces the learnable state with a previously serialized one.
    fn deserialize(&mut self, blob: &[u8]) -> Result<(), StrategyError>;

    /// Exploration is only active in training and simulation sessions.
    fn set_mode(&mut self, mode: SessionMode);

    /// Called once per finished episode; decays exploration.
    fn on_episode_end(&mut self);

    /// Highest transition id the policy has learned from, `0` for a fresh agent.
    fn applied_watermark(&self) -> u64;

    /// The exploration rate currently in effect.
    fn exploration_rate(&self) -> f64;
}
