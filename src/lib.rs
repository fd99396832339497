//! pipesync - Pipefy card sync into a local project store
//!
//! Pulls cards from configured Pipefy pipes, maps their user-defined fields to
//! a canonical project schema through stable field identifiers, and upserts
//! the result idempotently.
//!
//! # Architecture
//!
//! - **config**: YAML configuration, field bindings, validation
//! - **sync**: extraction, mapping, query strategy, reconciliation, orchestration
//! - **integrations**: Pipefy GraphQL client and retry policy
//! - **store**: SQLite project store with conflict-aware upserts

pub mod config;
pub mod error;
pub mod integrations;
pub mod logging;
pub mod store;
pub mod sync;

// Re-exports
pub use error::{PipeSyncError, Result};
