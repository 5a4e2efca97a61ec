//! # Meridian Database Crate
//!
//! This crate is the persistence collaborator of the learning loop: a small key-value
//! interface for policy snapshots, episode reports and portfolio checkpoints.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 Adapter:** All database-specific logic lives here. The rest of the
//!   application only sees `KeyValueStore`, so PostgreSQL, memory and the degrading
//!   wrapper are interchangeable.
//! - **Explicit Lifecycle:** Stores are constructed at process start, handed to the
//!   components that need them, and closed at shutdown. There is no global handle.
//! - **Asynchronous & Pooled:** All operations are asynchronous, and the PostgreSQL store
//!   uses a connection pool (`PgPool`).
//!
//! ## Public API
//!
//! - `KeyValueStore`: `save(key, blob)` / `load(key)`, with `save_json` / `load_json`.
//! - `PgStore`, `MemoryStore`, `ResilientStore`: the implementations.
//! - `connect`, `run_migrations`: pool construction and schema migration.
//! - `DbError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use store::{load_json, save_json, KeyValueStore, MemoryStore, PgStore, ResilientStore};
