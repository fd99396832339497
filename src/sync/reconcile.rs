//! Reconciliation into the project store
//!
//! One container's records become one conflict-aware batch write keyed on
//! `external_id`. There is no read-before-write: overlapping runs converge
//! on the store's `ON CONFLICT` rule instead of racing on existence checks.

use super::mapper::CanonicalProjectRecord;
use crate::store::ProjectStore;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Applies mapped records to a `ProjectStore`
pub struct Reconciler<S> {
    store: S,
}

impl<S: ProjectStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Upsert `records` stamped with the current time
    pub async fn reconcile(&self, records: &[CanonicalProjectRecord]) -> Result<usize> {
        self.reconcile_at(records, Utc::now()).await
    }

    /// Upsert `records` stamped with `synced_at`
    ///
    /// `updated_at` advances on every call, changed content or not. When a
    /// batch repeats an `external_id` the last record wins. An empty batch
    /// touches nothing.
    pub async fn reconcile_at(
        &self,
        records: &[CanonicalProjectRecord],
        synced_at: DateTime<Utc>,
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let records = latest_per_id(records);
        self.store.upsert_batch(&records, synced_at).await
    }
}

/// Keep the last record for each `external_id`, in order of last appearance
fn latest_per_id(records: &[CanonicalProjectRecord]) -> Vec<CanonicalProjectRecord> {
    let mut seen = HashSet::new();
    let mut latest: Vec<_> = records
        .iter()
        .rev()
        .filter(|r| seen.insert(r.external_id.as_str()))
        .cloned()
        .collect();
    latest.reverse();
    latest
}
