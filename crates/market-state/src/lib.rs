//! # Meridian Market State
//!
//! This crate turns raw market data into the fixed-shape `Observation` the strategy
//! agents consume, and defines the `DataFeed` boundary that supplies that raw data.
//!
//! ## Architectural Principles
//!
//! - **Pure Transform:** `MarketStateBuilder::build` has no side effects and builds fresh
//!   indicator state on every call, so identical snapshots always yield identical
//!   observations.
//! - **Fail Closed:** A snapshot missing a required field is rejected with
//!   `DataIncomplete`. Optional features fall back to their declared neutral value and
//!   the observation is flagged incomplete.
//! - **Versioned Schema:** Every observation carries the version of the `FeatureSchema`
//!   that produced it, so a consumer can reject vectors it was not built for.
//!
//! ## Public API
//!
//! - `RawSnapshot`: One collaborator-supplied market snapshot.
//! - `FeatureSchema` / `FeatureSpec` / `FeatureSource`: The versioned feature layout.
//! - `MarketStateBuilder`: Converts snapshots into observations.
//! - `DataFeed`: The async data collaborator trait, with `ReplayFeed` and `SyntheticFeed`.

pub mod builder;
pub mod error;
pub mod feed;
pub mod schema;

pub use builder::{MarketStateBuilder, RawSnapshot};
pub use error::{FeedError, MarketStateError};
pub use feed::{DataFeed, ReplayFeed, SyntheticFeed, SyntheticFeedConfig};
pub use schema::{FeatureSchema, FeatureSource, FeatureSpec};
