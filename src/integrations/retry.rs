//! Retry with exponential backoff for remote tracker calls
//!
//! Only transport-level failures are retried here (connection refused, request
//! timeout, 5xx, 429). GraphQL error payloads come back as successful replies
//! and are handled by the query strategy, never by this loop.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff settings for one remote operation
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Ceiling applied to every delay, Retry-After included
    pub max_backoff: Duration,

    /// Growth factor between consecutive delays
    pub multiplier: f64,

    /// Spread delays by up to 25% so parallel containers do not retry in lockstep
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::transport()
    }
}

impl RetryConfig {
    /// Settings used for Pipefy GraphQL requests
    ///
    /// Kept short: the whole container fetch sits under its own timeout.
    pub fn transport() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// No retries at all (tests, one-shot inspection)
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::transport()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_backoff.as_secs_f64());

        let spread = if self.jitter {
            1.0 + jitter_fraction() * 0.25
        } else {
            1.0
        };

        Duration::from_secs_f64(capped * spread)
    }
}

/// Pseudo-random value in [0.0, 1.0) taken from the clock's sub-second nanos
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 1000) / 1000.0
}

/// How a failed attempt should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    /// Retry after the given delay (Retry-After header, rate limit)
    RetryAfter(Duration),
    NoRetry,
}

/// Errors that know whether repeating the call could help
pub trait RetryableError {
    fn retry_decision(&self) -> RetryDecision;
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
///
/// Returns the last error when every attempt failed.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let delay = match err.retry_decision() {
            RetryDecision::NoRetry => {
                debug!(operation = operation_name, attempt, error = %err, "Permanent failure");
                return Err(err);
            }
            _ if attempt >= config.max_retries => {
                warn!(
                    operation = operation_name,
                    attempts = attempt + 1,
                    error = %err,
                    "Giving up after retries"
                );
                return Err(err);
            }
            RetryDecision::RetryAfter(d) => d.min(config.max_backoff),
            RetryDecision::Retry => config.backoff_duration(attempt),
        };

        warn!(
            operation = operation_name,
            attempt = attempt + 1,
            max_attempts = config.max_retries + 1,
            backoff_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient failure"
        );

        sleep(delay).await;
        attempt += 1;
    }
}
