//! Card sync pipeline
//!
//! Pulls cards from Pipefy pipes, normalizes their fields into canonical
//! project records and upserts them into the project store.
//!
//! # Flow
//!
//! 1. **Query** (`query`): list a pipe's cards, `allCards` first, phase-nested
//!    listing as fallback
//! 2. **Extract** (`extract`): card fields → stable id → value
//! 3. **Map** (`mapper`): field map + bindings → `CanonicalProjectRecord`
//! 4. **Reconcile** (`reconcile`): batch upsert keyed on `external_id`
//!
//! `orchestrator` drives the flow per pipe and isolates failures; `watch`
//! repeats it on an interval.

pub mod card;
pub mod extract;
pub mod mapper;
pub mod metrics;
pub mod orchestrator;
pub mod query;
pub mod reconcile;
pub mod watch;

pub use card::{CardField, ExternalCard, FieldDefinition, FieldRef};
pub use extract::{extract_fields, FieldMap};
pub use mapper::{coerce_date, coerce_hours, map_card, CanonicalProjectRecord, IMPORTED_STATUS};
pub use orchestrator::{run_sync, ContainerError, SyncOrchestrator, SyncReport, SyncRunResult};
pub use query::{
    fallback_reason, CardResolver, FallbackReason, GraphQlError, GraphQlReply, GraphQlRequest,
    ListingError, QueryShape, QueryStrategy, RemoteQuery, ResolvedVia,
};
pub use reconcile::Reconciler;
pub use watch::watch;
