//! Error types for pipesync
//!
//! One error enum covers every failure mode of the pipeline. Container-level
//! failures are carried as values inside a sync run; only trigger-level errors
//! (configuration, store open) ever surface to the caller as `Err`.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipesync operations
pub type Result<T> = std::result::Result<T, PipeSyncError>;

/// Error type for pipesync operations
#[derive(Error, Debug)]
pub enum PipeSyncError {
    /// Sync requested without credentials or containers
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote tracker rejected or failed a query
    #[error("Remote error: {0}")]
    Remote(String),

    /// Store-level failures that are not raw SQLite errors
    #[error("Store error: {0}")]
    Store(String),

    /// A remote fetch exceeded its time budget
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Rate limited (retry-after duration in seconds)
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Anyhow errors (for more context); displays the whole context chain
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}

impl crate::integrations::retry::RetryableError for PipeSyncError {
    fn retry_decision(&self) -> crate::integrations::retry::RetryDecision {
        use crate::integrations::retry::RetryDecision;

        match self {
            PipeSyncError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    RetryDecision::Retry
                } else if let Some(status) = e.status() {
                    match status.as_u16() {
                        429 => RetryDecision::RetryAfter(Duration::from_secs(30)),
                        500..=599 => RetryDecision::Retry,
                        _ => RetryDecision::NoRetry,
                    }
                } else if e.is_decode() || e.is_builder() {
                    RetryDecision::NoRetry
                } else {
                    RetryDecision::Retry
                }
            }
            PipeSyncError::RateLimited(secs) => {
                RetryDecision::RetryAfter(Duration::from_secs(*secs))
            }
            PipeSyncError::Timeout(_) => RetryDecision::Retry,
            PipeSyncError::NotConfigured(_)
            | PipeSyncError::Config(_)
            | PipeSyncError::Remote(_)
            | PipeSyncError::Store(_)
            | PipeSyncError::Io(_)
            | PipeSyncError::Json(_)
            | PipeSyncError::Yaml(_)
            | PipeSyncError::Database(_)
            | PipeSyncError::Other(_)
            | PipeSyncError::Anyhow(_) => RetryDecision::NoRetry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::retry::{RetryDecision, RetryableError};
    use anyhow::Context;

    #[test]
    fn test_not_configured_message() {
        let err = PipeSyncError::NotConfigured("no pipe ids".to_string());
        assert_eq!(err.to_string(), "Not configured: no pipe ids");
    }

    #[test]
    fn test_retry_classification() {
        assert_eq!(
            PipeSyncError::RateLimited(5).retry_decision(),
            RetryDecision::RetryAfter(Duration::from_secs(5))
        );
        assert_eq!(
            PipeSyncError::Timeout(Duration::from_secs(30)).retry_decision(),
            RetryDecision::Retry
        );
        assert_eq!(
            PipeSyncError::Remote("field not found".to_string()).retry_decision(),
            RetryDecision::NoRetry
        );
        assert_eq!(
            PipeSyncError::Config("bad".to_string()).retry_decision(),
            RetryDecision::NoRetry
        );
    }

    #[test]
    fn test_timeout_message_keeps_sub_second_precision() {
        let err = PipeSyncError::Timeout(Duration::from_millis(50));
        assert_eq!(err.to_string(), "Timed out after 50ms");
    }

    #[test]
    fn test_context_keeps_the_cause() {
        let result: std::result::Result<(), PipeSyncError> =
            Err(PipeSyncError::Store("disk full".to_string()));
        let err: PipeSyncError = result
            .context("Failed to open project store")
            .unwrap_err()
            .into();

        assert!(matches!(err, PipeSyncError::Anyhow(_)));
        assert_eq!(
            err.to_string(),
            "Failed to open project store: Store error: disk full"
        );
    }
}
