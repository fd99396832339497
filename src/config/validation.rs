//! Configuration validation
//!
//! Two layers:
//! - `ensure_configured` is the trigger gate: no credentials or no pipes means
//!   the run is rejected with `NotConfigured` before any request goes out.
//! - `validate_config` reports every structural problem at once (bad URL,
//!   duplicate pipes, zero concurrency) for `pipesync init` and friends.

use super::pipesync_config::PipeSyncConfig;
use crate::PipeSyncError;
use std::collections::HashSet;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Reject a sync trigger that has nothing to work with
pub fn ensure_configured(config: &PipeSyncConfig) -> crate::Result<()> {
    let mut missing = Vec::new();

    if !config.has_credentials() {
        missing.push(format!("set the {} environment variable", config.token_env));
    }
    if config.pipe_ids.iter().all(|id| id.trim().is_empty()) {
        missing.push("add at least one entry to pipe_ids".to_string());
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipeSyncError::NotConfigured(missing.join("; ")))
    }
}

/// Validate a pipesync configuration
pub fn validate_config(config: &PipeSyncConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if !config.api_url.starts_with("http://") && !config.api_url.starts_with("https://") {
        errors.push(ValidationError::new(
            "api_url",
            format!("Invalid API URL: {}", config.api_url),
        ));
    }

    if config.token_env.trim_start_matches('$').is_empty() {
        errors.push(ValidationError::new(
            "token_env",
            "Token environment variable name cannot be empty",
        ));
    }

    let mut seen = HashSet::new();
    for pipe_id in &config.pipe_ids {
        if pipe_id.trim().is_empty() {
            errors.push(ValidationError::new("pipe_ids", "Pipe id cannot be empty"));
        } else if !seen.insert(pipe_id.trim()) {
            errors.push(ValidationError::new(
                "pipe_ids",
                format!("Duplicate pipe id: {}", pipe_id),
            ));
        }
    }

    if config.max_concurrent_containers == 0 {
        errors.push(ValidationError::new(
            "max_concurrent_containers",
            "Must be at least 1",
        ));
    }

    if config.bindings.bound_count() == 0 {
        tracing::warn!("No field bindings configured; every project will import with defaults");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate configuration and return a Result
pub fn validate_config_result(config: &PipeSyncConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        PipeSyncError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = PipeSyncConfig::new().with_pipe("306447075");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duplicate_and_empty_pipes() {
        let config = PipeSyncConfig::new()
            .with_pipe("1")
            .with_pipe("1")
            .with_pipe(" ");

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.message.contains("Duplicate pipe id")));
        assert!(errors.iter().any(|e| e.message.contains("cannot be empty")));
    }

    #[test]
    fn test_invalid_url_and_concurrency() {
        let mut config = PipeSyncConfig::new().with_pipe("1");
        config.api_url = "api.pipefy.com".to_string();
        config.max_concurrent_containers = 0;

        let result = validate_config_result(&config);
        let message = result.unwrap_err().to_string();
        assert!(message.contains("api_url"));
        assert!(message.contains("max_concurrent_containers"));
    }

    #[test]
    fn test_ensure_configured_requires_token() {
        let config = PipeSyncConfig::new().with_pipe("1");
        let err = ensure_configured(&config).unwrap_err();
        assert!(matches!(err, PipeSyncError::NotConfigured(ref m) if m.contains("PIPEFY_TOKEN")));
    }

    #[test]
    fn test_ensure_configured_requires_pipes() {
        let config = PipeSyncConfig::new().with_token("t");
        let err = ensure_configured(&config).unwrap_err();
        assert!(matches!(err, PipeSyncError::NotConfigured(ref m) if m.contains("pipe_ids")));
    }

    #[test]
    fn test_ensure_configured_ok() {
        let config = PipeSyncConfig::new().with_token("t").with_pipe("1");
        assert!(ensure_configured(&config).is_ok());
    }
}
