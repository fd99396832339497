//! Periodic sync
//!
//! Runs the orchestrator on a fixed interval until a shutdown signal fires.
//! A run that is already in flight finishes before shutdown is observed.

use super::orchestrator::{SyncOrchestrator, SyncReport};
use super::query::RemoteQuery;
use crate::store::ProjectStore;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Sync `containers` every `period` until `shutdown` resolves
///
/// The first run starts immediately. `on_report` sees every run's report.
/// Returns the number of completed runs.
pub async fn watch<Q, S, F, R>(
    orchestrator: &SyncOrchestrator<Q, S>,
    containers: &[String],
    period: Duration,
    shutdown: F,
    mut on_report: R,
) -> usize
where
    Q: RemoteQuery,
    S: ProjectStore,
    F: Future<Output = ()>,
    R: FnMut(&SyncReport),
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut runs = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(runs, "Shutdown requested, stopping watch");
                break;
            }
            _ = interval.tick() => {
                let report = orchestrator.run(containers).await.report();
                if !report.ok {
                    warn!(errors = report.errors.len(), "Sync run finished with container errors");
                }
                on_report(&report);
                runs += 1;
            }
        }
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldBindings;
    use crate::store::SqliteProjectStore;
    use crate::sync::query::tests::{all_cards, ScriptedRemote};

    #[tokio::test]
    async fn test_runs_until_shutdown() {
        let replies = (0..50).map(|_| Ok(all_cards(&["1"], None))).collect();
        let orchestrator = SyncOrchestrator::new(
            ScriptedRemote::new(replies),
            SqliteProjectStore::in_memory().unwrap(),
            FieldBindings::default(),
        );

        let mut seen = Vec::new();
        let runs = watch(
            &orchestrator,
            &["pipe".to_string()],
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_millis(35)),
            |report| seen.push(report.clone()),
        )
        .await;

        assert!(runs >= 1);
        assert_eq!(seen.len(), runs);
        assert!(seen.iter().all(|r| r.ok && r.upserts == 1));
        assert_eq!(orchestrator.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_immediate_shutdown() {
        let orchestrator = SyncOrchestrator::new(
            ScriptedRemote::new(Vec::new()),
            SqliteProjectStore::in_memory().unwrap(),
            FieldBindings::default(),
        );

        let runs = watch(
            &orchestrator,
            &[],
            Duration::from_secs(3600),
            async {},
            |_| {},
        )
        .await;

        assert!(runs <= 1);
    }
}
