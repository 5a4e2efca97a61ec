//! # Meridian Analytics
//!
//! This crate scores the outcome of every tick and aggregates episode performance. It
//! acts as the "unbiased judge" of the learning loop: the same numbers feed the agent's
//! reward and the external report.
//!
//! ## Architectural Principles
//!
//! - **Pure Shaping:** The reward formula lives in `reward::shape`, a pure function of
//!   the realized P&L delta and the drawdown change, so its properties can be tested in
//!   isolation.
//! - **Stateless Calculation:** `AnalyticsEngine` derives drawdown and Sharpe figures
//!   from an equity curve without holding state of its own.
//! - **Single Recorder:** `PerformanceTracker` is the only place rewards are produced,
//!   which keeps vetoes and failed executions scored consistently.
//!
//! ## Public API
//!
//! - `PerformanceTracker`: Records ticks and produces `RewardSignal`s.
//! - `Disposition`: What happened to the proposal on a tick.
//! - `RewardWeights` and `shape`: The reward formula.
//! - `AnalyticsEngine`: Drawdown and ratio calculations over an equity curve.
//! - `PerformanceSummary`: The aggregated episode report.

// Declare the modules that constitute this crate.
pub mod engine;
pub mod error;
pub mod report;
pub mod reward;
pub mod tracker;

// Re-export the key components to create a clean, public-facing API.
pub use engine::AnalyticsEngine;
pub use error::AnalyticsError;
pub use report::PerformanceSummary;
pub use reward::{shape, RewardWeights};
pub use tracker::{Disposition, PerformanceTracker};
