//! Sync orchestration
//!
//! Runs fetch → map → reconcile for every configured pipe. Pipes are
//! independent failure domains: a pipe that cannot be fetched or stored is
//! recorded in the run result and the run moves on.

use super::mapper::map_card;
use super::metrics;
use super::query::{CardResolver, RemoteQuery};
use super::reconcile::Reconciler;
use crate::config::{ensure_configured, FieldBindings, PipeSyncConfig};
use crate::store::ProjectStore;
use crate::{PipeSyncError, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Default cap on pipes fetched at the same time
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default upper bound on one pipe's fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// A failure attributed to one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerError {
    pub container: String,
    pub message: String,
}

/// Aggregate of one sync run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncRunResult {
    pub containers_attempted: usize,
    pub containers_failed: usize,
    pub records_upserted: usize,
    pub errors: Vec<ContainerError>,
}

impl SyncRunResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Metric label for this run
    pub fn outcome(&self) -> &'static str {
        if self.containers_attempted == 0 {
            "empty"
        } else if self.errors.is_empty() {
            "success"
        } else if self.containers_failed == self.containers_attempted {
            "failed"
        } else {
            "partial"
        }
    }

    pub fn report(&self) -> SyncReport {
        SyncReport {
            ok: !self.has_errors(),
            upserts: self.records_upserted,
            errors: self.errors.clone(),
        }
    }
}

/// What a sync trigger hands back: `{ ok, upserts, errors: [{container, message}] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub ok: bool,
    pub upserts: usize,
    pub errors: Vec<ContainerError>,
}

/// Drives a sync run over a set of containers
pub struct SyncOrchestrator<Q, S> {
    resolver: CardResolver<Q>,
    reconciler: Reconciler<S>,
    bindings: FieldBindings,
    max_concurrent: usize,
    fetch_timeout: Duration,
}

impl<Q: RemoteQuery, S: ProjectStore> SyncOrchestrator<Q, S> {
    pub fn new(remote: Q, store: S, bindings: FieldBindings) -> Self {
        Self {
            resolver: CardResolver::new(remote),
            reconciler: Reconciler::new(store),
            bindings,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Orchestrator using the bindings, concurrency and timeout of `config`
    pub fn from_config(config: &PipeSyncConfig, remote: Q, store: S) -> Self {
        Self::new(remote, store, config.bindings.clone())
            .with_max_concurrent(config.max_concurrent_containers)
            .with_fetch_timeout(config.fetch_timeout())
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn store(&self) -> &S {
        self.reconciler.store()
    }

    /// Sync every container, isolating failures per container
    ///
    /// Never fails: container errors are collected in the result, in the
    /// order the containers were given.
    pub async fn run(&self, containers: &[String]) -> SyncRunResult {
        let outcomes: Vec<(&String, Result<usize>)> = stream::iter(containers)
            .map(|container| async move { (container, self.sync_container(container).await) })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let mut result = SyncRunResult {
            containers_attempted: outcomes.len(),
            ..Default::default()
        };

        for (container, outcome) in outcomes {
            match outcome {
                Ok(written) => result.records_upserted += written,
                Err(e) => {
                    error!(container = %container, error = %e, "Container sync failed");
                    result.containers_failed += 1;
                    result.errors.push(ContainerError {
                        container: container.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        metrics::record_sync_run(result.outcome());
        info!(
            containers = result.containers_attempted,
            failed = result.containers_failed,
            upserts = result.records_upserted,
            "Sync run complete"
        );
        result
    }

    /// Fetch, map and reconcile one container
    pub async fn sync_container(&self, container: &str) -> Result<usize> {
        let started = Instant::now();
        let fetched =
            match tokio::time::timeout(self.fetch_timeout, self.resolver.fetch_cards(container))
                .await
            {
                Ok(Ok(fetched)) => fetched,
                Ok(Err(e)) => {
                    metrics::record_container_failure(container, "fetch");
                    return Err(e);
                }
                Err(_) => {
                    metrics::record_container_failure(container, "timeout");
                    return Err(PipeSyncError::Timeout(self.fetch_timeout));
                }
            };
        metrics::record_fetch_duration(container, started.elapsed().as_secs_f64());

        let records: Vec<_> = fetched
            .cards
            .iter()
            .map(|card| map_card(card, &self.bindings))
            .collect();

        let written = match self.reconciler.reconcile(&records).await {
            Ok(written) => written,
            Err(e) => {
                metrics::record_container_failure(container, "store");
                return Err(e);
            }
        };

        metrics::record_upserts(container, written);
        info!(container = %container, cards = fetched.cards.len(), upserts = written, "Container synced");
        Ok(written)
    }
}

/// "Run sync now": validate configuration, then sync every configured pipe
///
/// Missing credentials or pipes fail with `NotConfigured` before any request
/// is made. Anything that goes wrong past that point is reported per pipe
/// inside the returned `SyncReport`.
pub async fn run_sync<Q: RemoteQuery, S: ProjectStore>(
    config: &PipeSyncConfig,
    remote: Q,
    store: S,
) -> Result<SyncReport> {
    ensure_configured(config)?;

    let containers: Vec<String> = config
        .pipe_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    let orchestrator = SyncOrchestrator::from_config(config, remote, store);
    Ok(orchestrator.run(&containers).await.report())
}
