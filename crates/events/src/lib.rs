//! # Meridian Events
//!
//! This crate defines the typed events a learning loop emits while it runs, for
//! progress reporting, dashboards and audit trails.
//!
//! As a Layer 0 crate, it depends only on `core-types` and provides the definitive
//! vocabulary for describing what happened on each tick of an episode.
//!
//! ## Public API
//!
//! - `LoopEvent`: the top-level, JSON-tagged event enum.
//! - `EventBus`: a cloneable broadcast sender that never blocks the loop.
//! - `PortfolioSnapshot`, `LogMessage`, `LogLevel`: event payloads.

// Declare the modules that make up this crate.
pub mod bus;
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use bus::EventBus;
pub use error::EventsError;
pub use messages::{LogLevel, LogMessage, LoopEvent, PortfolioSnapshot};
