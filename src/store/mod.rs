//! Project store
//!
//! Durable home of synced projects. The sync pipeline only needs a
//! conflict-aware batch upsert keyed on `external_id`; reads serve the CLI.

mod sqlite;

pub use sqlite::{SqliteProjectStore, StoreConfig, MAX_LIST_LIMIT};

use crate::sync::mapper::CanonicalProjectRecord;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A project row as persisted, with its sync timestamps
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredProject {
    #[serde(flatten)]
    pub record: CanonicalProjectRecord,
    pub created_at: String,
    pub updated_at: String,
}

/// Capability: conflict-safe persistence of canonical project records
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Insert or replace `records` keyed on `external_id`, all or nothing
    ///
    /// New rows get `created_at = updated_at = synced_at`; existing rows keep
    /// `created_at` and have every sync-owned column replaced. Returns the
    /// number of records written.
    async fn upsert_batch(
        &self,
        records: &[CanonicalProjectRecord],
        synced_at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Most recently created projects first, `limit` clamped to `1..=MAX_LIST_LIMIT`
    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredProject>>;

    async fn get(&self, external_id: &str) -> Result<Option<StoredProject>>;

    async fn count(&self) -> Result<usize>;
}

#[async_trait]
impl<T: ProjectStore + ?Sized> ProjectStore for std::sync::Arc<T> {
    async fn upsert_batch(
        &self,
        records: &[CanonicalProjectRecord],
        synced_at: DateTime<Utc>,
    ) -> Result<usize> {
        (**self).upsert_batch(records, synced_at).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredProject>> {
        (**self).list_recent(limit).await
    }

    async fn get(&self, external_id: &str) -> Result<Option<StoredProject>> {
        (**self).get(external_id).await
    }

    async fn count(&self) -> Result<usize> {
        (**self).count().await
    }
}
