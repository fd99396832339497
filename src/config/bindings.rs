//! Field binding configuration
//!
//! Maps each canonical project attribute to the stable Pipefy field identifier
//! (`internal_id`) that carries it. Labels are never used here: they are
//! user-editable upstream and would silently break the mapping on rename.

use serde::{Deserialize, Serialize};

/// Environment variable overriding the status binding
pub const STATUS_FIELD_ENV: &str = "PIPEFY_STATUS_FIELD";
/// Environment variable overriding the owner email binding
pub const OWNER_EMAIL_FIELD_ENV: &str = "PIPEFY_OWNER_EMAIL_FIELD";
/// Environment variable overriding the priority binding
pub const PRIORITY_FIELD_ENV: &str = "PIPEFY_PRIORITY_FIELD";
/// Environment variable overriding the estimated hours binding
pub const ESTIMATED_HOURS_FIELD_ENV: &str = "PIPEFY_ESTIMATED_HOURS_FIELD";
/// Environment variable overriding the start date binding
pub const STARTED_AT_FIELD_ENV: &str = "PIPEFY_STARTED_AT_FIELD";

/// Canonical attribute → stable field identifier bindings
///
/// Every binding is optional. An unset or empty binding resolves the attribute
/// to its default (`None`, or the `"imported"` sentinel for status).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

impl FieldBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, field_id: impl Into<String>) -> Self {
        self.status = Some(field_id.into());
        self
    }

    pub fn with_owner_email(mut self, field_id: impl Into<String>) -> Self {
        self.owner_email = Some(field_id.into());
        self
    }

    pub fn with_priority(mut self, field_id: impl Into<String>) -> Self {
        self.priority = Some(field_id.into());
        self
    }

    pub fn with_estimated_hours(mut self, field_id: impl Into<String>) -> Self {
        self.estimated_hours = Some(field_id.into());
        self
    }

    pub fn with_started_at(mut self, field_id: impl Into<String>) -> Self {
        self.started_at = Some(field_id.into());
        self
    }

    /// Replace bindings with any non-empty values found in the environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Replace bindings using an arbitrary key lookup (environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let slots: [(&str, &mut Option<String>); 5] = [
            (STATUS_FIELD_ENV, &mut self.status),
            (OWNER_EMAIL_FIELD_ENV, &mut self.owner_email),
            (PRIORITY_FIELD_ENV, &mut self.priority),
            (ESTIMATED_HOURS_FIELD_ENV, &mut self.estimated_hours),
            (STARTED_AT_FIELD_ENV, &mut self.started_at),
        ];

        for (key, slot) in slots {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                tracing::debug!(env = key, field_id = %value, "Field binding overridden from environment");
                *slot = Some(value.trim().to_string());
            }
        }
    }

    /// Number of attributes with a non-empty binding
    pub fn bound_count(&self) -> usize {
        [
            &self.status,
            &self.owner_email,
            &self.priority,
            &self.estimated_hours,
            &self.started_at,
        ]
        .iter()
        .filter(|b| b.as_deref().is_some_and(|id| !id.trim().is_empty()))
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_builder_and_count() {
        let bindings = FieldBindings::new()
            .with_status("status_interno")
            .with_owner_email("email_do_responsavel")
            .with_priority("");

        assert_eq!(bindings.status.as_deref(), Some("status_interno"));
        // The empty priority binding does not count as bound
        assert_eq!(bindings.bound_count(), 2);
    }

    #[test]
    fn test_overrides_replace_only_non_empty() {
        let env: HashMap<&str, &str> = [
            (STATUS_FIELD_ENV, "fase_atual"),
            (PRIORITY_FIELD_ENV, "   "),
        ]
        .into_iter()
        .collect();

        let mut bindings = FieldBindings::new().with_priority("prioridade");
        bindings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(bindings.status.as_deref(), Some("fase_atual"));
        assert_eq!(bindings.priority.as_deref(), Some("prioridade"));
        assert!(bindings.owner_email.is_none());
    }

    #[test]
    fn test_yaml_omits_unbound() {
        let bindings = FieldBindings::new().with_status("status_interno");
        let yaml = serde_yaml::to_string(&bindings).unwrap();
        assert!(yaml.contains("status: status_interno"));
        assert!(!yaml.contains("owner_email"));
    }
}
