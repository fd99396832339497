//! Field mapping
//!
//! Turns a card's `FieldMap` into the canonical project attributes using the
//! deployment's `FieldBindings`. Card content is free text maintained by end
//! users, so every coercion degrades to `None` instead of failing the batch.

use super::card::ExternalCard;
use super::extract::{extract_fields, FieldMap};
use crate::config::FieldBindings;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Status given to projects whose status is unbound or empty
pub const IMPORTED_STATUS: &str = "imported";

/// Date layouts tried after RFC 3339, in order
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"];

/// The reconciled shape of one synced project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProjectRecord {
    /// Natural key, 1:1 with the card id
    pub external_id: String,
    pub name: String,
    pub status: String,
    pub owner_email: Option<String>,
    pub priority: Option<String>,
    pub estimated_hours: Option<f64>,
    pub started_at: Option<NaiveDate>,
    /// Full field map, kept for attributes not promoted to columns
    pub meta: FieldMap,
}

/// Canonical attributes derived from a field map
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanonicalAttributes {
    pub status: String,
    pub owner_email: Option<String>,
    pub priority: Option<String>,
    pub estimated_hours: Option<f64>,
    pub started_at: Option<NaiveDate>,
}

/// Look up a bound attribute's trimmed, non-empty text
fn lookup<'a>(fields: &'a FieldMap, binding: Option<&str>) -> Option<&'a str> {
    let field_id = binding.map(str::trim).filter(|id| !id.is_empty())?;
    fields
        .value(field_id)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Coerce free text to hours
///
/// Everything except digits, `.` and `-` is stripped before parsing, so
/// `"~40h (est.)"` becomes `40`. Returns `None` when nothing numeric remains.
pub fn coerce_hours(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    match cleaned.parse::<f64>() {
        Ok(hours) if hours.is_finite() => Some(hours),
        _ => {
            tracing::debug!(raw = %raw, cleaned = %cleaned, "Unparsable estimated hours");
            None
        }
    }
}

/// Parse a start date leniently; `None` for anything that is not a calendar date
pub fn coerce_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }

    let parsed = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        });

    if parsed.is_none() {
        tracing::debug!(raw = %raw, "Unparsable start date");
    }
    parsed
}

/// Resolve the canonical attributes of one card's fields
pub fn map_attributes(fields: &FieldMap, bindings: &FieldBindings) -> CanonicalAttributes {
    let status = lookup(fields, bindings.status.as_deref())
        .unwrap_or(IMPORTED_STATUS)
        .to_string();

    CanonicalAttributes {
        status,
        owner_email: lookup(fields, bindings.owner_email.as_deref()).map(str::to_string),
        priority: lookup(fields, bindings.priority.as_deref()).map(str::to_string),
        estimated_hours: lookup(fields, bindings.estimated_hours.as_deref()).and_then(coerce_hours),
        started_at: lookup(fields, bindings.started_at.as_deref()).and_then(coerce_date),
    }
}

/// Extract and map a whole card into its canonical record
pub fn map_card(card: &ExternalCard, bindings: &FieldBindings) -> CanonicalProjectRecord {
    let meta = extract_fields(card);
    let attrs = map_attributes(&meta, bindings);

    CanonicalProjectRecord {
        external_id: card.id.clone(),
        name: card.title.clone(),
        status: attrs.status,
        owner_email: attrs.owner_email,
        priority: attrs.priority,
        estimated_hours: attrs.estimated_hours,
        started_at: attrs.started_at,
        meta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> FieldBindings {
        FieldBindings::new()
            .with_status("status_fid")
            .with_owner_email("owner_fid")
            .with_priority("priority_fid")
            .with_estimated_hours("hours_fid")
            .with_started_at("start_fid")
    }

    #[test]
    fn test_hours_coercion() {
        assert_eq!(coerce_hours("~40h (est.)"), Some(40.0));
        assert_eq!(coerce_hours("12.5"), Some(12.5));
        assert_eq!(coerce_hours("-3"), Some(-3.0));
        assert_eq!(coerce_hours("TBD"), None);
        assert_eq!(coerce_hours(""), None);
        assert_eq!(coerce_hours("10-20"), None);
        assert_eq!(coerce_hours("1.2.3"), None);
    }

    #[test]
    fn test_date_coercion() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15);
        assert_eq!(coerce_date("2024-03-15"), expected);
        assert_eq!(coerce_date("15/03/2024"), expected);
        assert_eq!(coerce_date("2024-03-15T10:30:00-03:00"), expected);
        assert_eq!(coerce_date("2024-03-15 08:00:00"), expected);
        assert_eq!(coerce_date("15/03/2024 08:00"), expected);
        assert_eq!(coerce_date("not scheduled"), None);
        assert_eq!(coerce_date("2024-02-30"), None);
        assert_eq!(coerce_date("   "), None);
    }

    #[test]
    fn test_full_mapping() {
        let card = ExternalCard::new("c-1", "ERP rollout")
            .with_field("Status", "status_fid", "Em andamento")
            .with_field("Dono", "owner_fid", " ana@example.com ")
            .with_field("Prioridade", "priority_fid", "Alta")
            .with_field("Horas", "hours_fid", "~40h (est.)")
            .with_field("Início", "start_fid", "2024-03-15")
            .with_field("Extra", "extra_fid", "kept in meta");

        let record = map_card(&card, &bindings());

        assert_eq!(record.external_id, "c-1");
        assert_eq!(record.name, "ERP rollout");
        assert_eq!(record.status, "Em andamento");
        assert_eq!(record.owner_email.as_deref(), Some("ana@example.com"));
        assert_eq!(record.priority.as_deref(), Some("Alta"));
        assert_eq!(record.estimated_hours, Some(40.0));
        assert_eq!(record.started_at, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(record.meta.value("extra_fid"), Some("kept in meta"));
    }

    #[test]
    fn test_unbound_and_missing_defaults() {
        let card = ExternalCard::new("c-2", "Empty card")
            .with_field("Horas", "hours_fid", "TBD")
            .with_field("Início", "start_fid", "not scheduled")
            .with_field("Status", "status_fid", "   ");

        // Status bound but blank, owner bound but absent, priority unbound
        let bindings = FieldBindings::new()
            .with_status("status_fid")
            .with_owner_email("owner_fid")
            .with_estimated_hours("hours_fid")
            .with_started_at("start_fid");

        let record = map_card(&card, &bindings);
        assert_eq!(record.status, IMPORTED_STATUS);
        assert_eq!(record.owner_email, None);
        assert_eq!(record.priority, None);
        assert_eq!(record.estimated_hours, None);
        assert_eq!(record.started_at, None);
    }

    #[test]
    fn test_no_bindings_at_all() {
        let card = ExternalCard::new("c-3", "Card").with_field("Status", "status_fid", "Done");
        let record = map_card(&card, &FieldBindings::default());
        assert_eq!(record.status, IMPORTED_STATUS);
        assert_eq!(record.meta.len(), 1);
    }

    #[test]
    fn test_label_rename_keeps_mapping() {
        let before = ExternalCard::new("c-4", "Card").with_field("Status", "status_fid", "Doing");
        let after =
            ExternalCard::new("c-4", "Card").with_field("Situação atual", "status_fid", "Doing");

        assert_eq!(map_card(&before, &bindings()), map_card(&after, &bindings()));
    }
}
