//! Prometheus metrics for sync runs

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Counter: sync runs by outcome (success / partial / empty)
    pub static ref SYNC_RUNS: CounterVec = register_counter_vec!(
        "pipesync_sync_runs_total",
        "Total sync runs by outcome",
        &["outcome"]
    )
    .expect("Failed to create sync_runs metric");

    /// Histogram: container fetch duration (seconds)
    pub static ref FETCH_DURATION: HistogramVec = register_histogram_vec!(
        "pipesync_fetch_duration_seconds",
        "Duration of container card fetches",
        &["container"],
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to create fetch_duration metric");

    /// Counter: primary query shape abandoned for the fallback
    pub static ref QUERY_FALLBACKS: CounterVec = register_counter_vec!(
        "pipesync_query_fallbacks_total",
        "Card listings that fell back to the phase-nested shape",
        &["container"]
    )
    .expect("Failed to create query_fallbacks metric");

    /// Counter: failed containers by stage (fetch / timeout / store)
    pub static ref CONTAINER_FAILURES: CounterVec = register_counter_vec!(
        "pipesync_container_failures_total",
        "Containers that failed during a sync run",
        &["container", "stage"]
    )
    .expect("Failed to create container_failures metric");

    /// Counter: project rows written
    pub static ref RECORDS_UPSERTED: CounterVec = register_counter_vec!(
        "pipesync_records_upserted_total",
        "Project records upserted",
        &["container"]
    )
    .expect("Failed to create records_upserted metric");
}

pub fn record_sync_run(outcome: &str) {
    SYNC_RUNS.with_label_values(&[outcome]).inc();
}

pub fn record_fetch_duration(container: &str, duration_secs: f64) {
    FETCH_DURATION
        .with_label_values(&[container])
        .observe(duration_secs);
}

pub fn record_query_fallback(container: &str) {
    QUERY_FALLBACKS.with_label_values(&[container]).inc();
}

pub fn record_container_failure(container: &str, stage: &str) {
    CONTAINER_FAILURES
        .with_label_values(&[container, stage])
        .inc();
}

pub fn record_upserts(container: &str, count: usize) {
    RECORDS_UPSERTED
        .with_label_values(&[container])
        .inc_by(count as f64);
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> crate::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::PipeSyncError::Other(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::PipeSyncError::Other(format!("Metrics are not UTF-8: {}", e)))
}
