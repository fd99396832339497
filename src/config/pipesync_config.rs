//! pipesync configuration file handling
//!
//! Loads and manages the ~/.config/pipesync/config.yaml file.

use super::bindings::FieldBindings;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default Pipefy GraphQL endpoint
pub const DEFAULT_API_URL: &str = "https://api.pipefy.com/graphql";

/// Default environment variable holding the Pipefy token
pub const DEFAULT_TOKEN_ENV: &str = "PIPEFY_TOKEN";

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_store_path() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("pipesync");
    path.push("projects.db");
    path
}

fn default_max_concurrent_containers() -> usize {
    4
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    300
}

/// pipesync configuration
///
/// Everything the pipeline needs is carried here and passed explicitly to the
/// orchestrator; nothing is read from process-wide state after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeSyncConfig {
    /// Pipefy GraphQL endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable holding the API token (a leading `$` is ignored)
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Token resolved at runtime; never written to disk
    #[serde(skip)]
    pub token: Option<String>,

    /// Pipe (container) identifiers to sync, in order
    #[serde(default)]
    pub pipe_ids: Vec<String>,

    /// Canonical attribute bindings
    #[serde(default)]
    pub bindings: FieldBindings,

    /// SQLite database holding the projects table
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Cap on containers fetched at the same time
    #[serde(default = "default_max_concurrent_containers")]
    pub max_concurrent_containers: usize,

    /// Upper bound on one container fetch, fallback included
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Interval between runs in `watch` mode
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl PipeSyncConfig {
    /// Create a configuration with defaults and no pipes
    pub fn new() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            token: None,
            pipe_ids: Vec::new(),
            bindings: FieldBindings::default(),
            store_path: default_store_path(),
            max_concurrent_containers: default_max_concurrent_containers(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }

    /// Load configuration from the default path (~/.config/pipesync/config.yaml)
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        Self::load(&path)
    }

    /// Load configuration from a specific path
    ///
    /// The token and field binding environment overrides are resolved here.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::PipeSyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading pipesync configuration");

        let content = fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&content)?;
        config.resolve_env();

        tracing::debug!(
            pipes = config.pipe_ids.len(),
            bound_fields = config.bindings.bound_count(),
            has_token = config.token.is_some(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Resolve the token and binding overrides from the environment
    pub fn resolve_env(&mut self) {
        if self.token.is_none() {
            self.token = std::env::var(self.token_env.trim_start_matches('$'))
                .ok()
                .filter(|t| !t.trim().is_empty());
        }
        self.bindings.apply_env_overrides();
    }

    /// Save configuration to the default path
    pub fn save_default(&self) -> Result<()> {
        let path = Self::default_path();
        self.save(&path)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving pipesync configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/pipesync/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("pipesync");
        path.push("config.yaml");
        path
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_pipe(mut self, pipe_id: impl Into<String>) -> Self {
        self.pipe_ids.push(pipe_id.into());
        self
    }

    pub fn with_bindings(mut self, bindings: FieldBindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// True when a non-empty token is available
    pub fn has_credentials(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

impl Default for PipeSyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
