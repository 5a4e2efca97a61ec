//! # Meridian Executor Crate
//!
//! This crate provides the execution boundary of the learning loop and the portfolio
//! state that fills are applied to. It defines a generic `Executor` trait, a
//! `SimulatedExecutor` paper venue, and `PortfolioState`, the single owner of an
//! episode's cash and positions.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** An `Executor` only turns an `OrderRequest` into a
//!   `Fill` (or a rejection). It never touches the portfolio. `PortfolioState` applies a
//!   confirmed fill, so a rejected or timed-out order leaves the account untouched.
//! - **Execution Abstraction:** The learning loop is agnostic about whether orders go to
//!   the paper venue or a live adapter supplied by the caller.
//!
//! ## Public API
//!
//! - `Executor`: The core trait for all execution venues.
//! - `SimulatedExecutor`: The paper venue with slippage and taker fees.
//! - `PortfolioState`: The in-memory state of one episode's account.
//! - `Valuation`: A marked-to-market view of the portfolio.
//! - `ExecutorError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod error;
pub mod exchange;
pub mod portfolio;

// Re-export the key components to provide a clean, public-facing API.
pub use error::ExecutorError;
pub use exchange::{Executor, SimulatedExecutor};
pub use portfolio::{FillOutcome, PortfolioState, Valuation};
