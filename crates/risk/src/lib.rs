//! # Meridian Risk Crate
//!
//! The `RiskGovernor` sits between the strategy agent and the execution boundary. Every
//! proposed action, including forced stop-loss exits, passes through it and comes out
//! either approved (possibly clamped, with the order to submit) or vetoed with a reason.
//!
//! ## Architectural Principles
//!
//! - **Pure Decisions:** `evaluate` is a function of the action, the portfolio, the
//!   market context, the limits and the current `RiskMode`. It has no side effects.
//! - **Explicit Latch:** The drawdown halt is not hidden state. `next_mode` computes the
//!   next `RiskMode` from the previous one and the current drawdown, and the caller
//!   carries it between ticks.
//!
//! ## Public API
//!
//! - `RiskGovernor`: The evaluator.
//! - `MarketContext`: Prices and liquidity for one tick.
//! - `RiskMode` and `next_mode`: The drawdown hysteresis latch.
//! - `Decision`, `ApprovedAction`, `VetoReason`: The outcome of an evaluation.

pub mod error;
pub mod governor;

pub use error::RiskError;
pub use governor::{
    next_mode, ApprovedAction, Decision, MarketContext, RiskGovernor, RiskMode, VetoReason,
};
