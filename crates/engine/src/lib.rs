//! # Meridian Engine
//!
//! This crate is the master orchestrator: the `LearningLoop` that closes the circle
//! between market data, the policy, the risk governor, the execution boundary and the
//! learner.
//!
//! ## Architectural Principles
//!
//! - **Explicit State Machine:** Each tick walks `Observing -> Proposing -> Governing ->
//!   AwaitingExecution -> Rewarding -> Updated`, and every transition is checked.
//! - **Failures Stay Inside:** Missing data skips a tick, execution failures score zero,
//!   and fatal conditions terminate the episode with a recorded reason.
//! - **Injected Collaborators:** Feed, agent, executor, store and event bus are all handed
//!   in, so the same loop drives training, paper trading and evaluation replicas.
//!
//! ## Public API
//!
//! - `LearningLoop`, `TickOutcome`: the loop and the result of one tick.
//! - `LoopState`, `TerminationReason`, `EpisodeReport`: lifecycle and outcome types.
//! - `checkpoint`: persistence keys and policy/episode checkpoints.
//! - `run_concurrently`: independent episodes as parallel tokio tasks.
//! - `EngineError`: The specific error types that can be returned from this crate.

pub mod backoff;
pub mod buffer;
pub mod checkpoint;
pub mod error;
pub mod learning_loop;
pub mod report;
pub mod runner;
pub mod state;

pub use error::EngineError;
pub use learning_loop::{LearningLoop, TickOutcome};
pub use report::EpisodeReport;
pub use runner::run_concurrently;
pub use state::{LoopState, TerminationReason};
