//! Pipefy GraphQL client
//!
//! Implements `RemoteQuery` over HTTPS with bearer auth. Every reply the
//! server produces becomes a `GraphQlReply`; only transport failures, 5xx
//! and 429 are errors, and those are retried with backoff first.

use super::retry::{with_retry, RetryConfig};
use crate::config::PipeSyncConfig;
use crate::sync::query::{GraphQlError, GraphQlReply, GraphQlRequest, RemoteQuery};
use crate::{PipeSyncError, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-request timeout for GraphQL queries (a page can hold 200 cards)
const GRAPHQL_TIMEOUT: Duration = Duration::from_secs(30);

/// Used when a 429 carries no parsable Retry-After header
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Pipefy API client
pub struct PipefyClient {
    client: Client,
    api_url: String,
    auth_token: Option<String>,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct RawReply {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

/// Build a reply from an HTTP status and raw body
///
/// A body that is not a GraphQL JSON envelope marks the reply unsuccessful,
/// whatever the status said.
pub fn reply_from_body(status: u16, body: &str) -> GraphQlReply {
    let transport_ok = (200..300).contains(&status);

    match serde_json::from_str::<RawReply>(body) {
        Ok(raw) => GraphQlReply {
            success: transport_ok,
            status,
            data: raw.data.filter(|d| !d.is_null()),
            errors: raw.errors.unwrap_or_default(),
        },
        Err(e) => {
            debug!(status, error = %e, "Response body is not a GraphQL envelope");
            GraphQlReply {
                success: false,
                status,
                data: None,
                errors: Vec::new(),
            }
        }
    }
}

fn retry_after_secs(headers: &header::HeaderMap) -> u64 {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

impl PipefyClient {
    /// Create a new client
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_url: impl Into<String>, auth_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(GRAPHQL_TIMEOUT)
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static(concat!("pipesync/", env!("CARGO_PKG_VERSION"))),
                );
                headers.insert(
                    header::ACCEPT,
                    header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            auth_token,
            retry: RetryConfig::transport(),
        })
    }

    /// Client for the endpoint and token of a loaded configuration
    pub fn from_config(config: &PipeSyncConfig) -> Result<Self> {
        Self::new(config.api_url.clone(), config.token.clone())
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_token.is_some()
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn send_once(&self, request: &GraphQlRequest) -> Result<GraphQlReply> {
        let mut http = self.client.post(&self.api_url).json(request);
        if let Some(ref token) = self.auth_token {
            http = http.bearer_auth(token);
        }

        let response = http.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PipeSyncError::RateLimited(retry_after_secs(response.headers())));
        }
        if status.is_server_error() {
            return Err(match response.error_for_status() {
                Err(e) => PipeSyncError::Http(e),
                Ok(_) => PipeSyncError::Remote(format!("Pipefy API error: HTTP {}", status)),
            });
        }

        let body = response.text().await?;
        let reply = reply_from_body(status.as_u16(), &body);
        if !reply.success {
            warn!(status = status.as_u16(), "Pipefy request unsuccessful");
        }
        Ok(reply)
    }
}

#[async_trait]
impl RemoteQuery for PipefyClient {
    async fn execute(&self, request: &GraphQlRequest) -> Result<GraphQlReply> {
        with_retry(&self.retry, "pipefy graphql", || self.send_once(request)).await
    }
}
