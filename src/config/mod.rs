//! Configuration system
//!
//! Loads ~/.config/pipesync/config.yaml with support for:
//! - Pipefy endpoint and token environment variable
//! - The list of pipes to sync
//! - Canonical field bindings (with environment overrides)
//! - Store location, concurrency cap and timeouts

mod bindings;
mod pipesync_config;
pub mod validation;

pub use bindings::{
    FieldBindings, ESTIMATED_HOURS_FIELD_ENV, OWNER_EMAIL_FIELD_ENV, PRIORITY_FIELD_ENV,
    STARTED_AT_FIELD_ENV, STATUS_FIELD_ENV,
};
pub use pipesync_config::{PipeSyncConfig, DEFAULT_API_URL, DEFAULT_TOKEN_ENV};
pub use validation::{ensure_configured, validate_config, validate_config_result, ValidationError};
