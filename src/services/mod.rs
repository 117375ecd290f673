//! Tenant-scoped business logic over the storage layer.
//!
//! Every operation takes the acting user's [`AuthContext`](crate::auth::AuthContext)
//! explicitly. The flow is always: capability check, input validation,
//! tenant check on the target rows, then persistence — and for task and
//! meeting mutations, one timeline record per call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DbError;

pub mod alerts;
pub mod meetings;
pub mod tasks;
pub mod timelines;
pub mod users;

/// A single field-level validation failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Service failure taxonomy. Validation carries structured field errors;
/// authorization failures are a fixed "Unauthorized"; missing targets in
/// the actor's own tenant are NotFound.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl ServiceError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ServiceError::Validation(vec![FieldError::new(field, message)])
    }
}

/// Accumulates field errors so callers see every problem at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Trim and length-check a required string, recording an error on failure.
    pub fn bounded_string(
        &mut self,
        value: &str,
        field: &str,
        min: usize,
        max: usize,
    ) -> Option<String> {
        let trimmed = value.trim();
        if trimmed.len() < min {
            self.push(field, format!("must be at least {min} characters"));
            return None;
        }
        if trimmed.len() > max {
            self.push(field, format!("must be at most {max} characters"));
            return None;
        }
        Some(trimmed.to_string())
    }

    /// Check a value against an enumerated set.
    pub fn enum_string(&mut self, value: &str, field: &str, allowed: &[&str]) {
        if !allowed.contains(&value) {
            self.push(field, format!("must be one of: {}", allowed.join(", ")));
        }
    }

    /// Check a `YYYY-MM-DD` date.
    pub fn yyyy_mm_dd(&mut self, value: &str, field: &str) {
        if chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
            self.push(field, "must be a date in YYYY-MM-DD form");
        }
    }

    /// Check an RFC3339 timestamp.
    pub fn rfc3339(&mut self, value: &str, field: &str) {
        if chrono::DateTime::parse_from_rfc3339(value).is_err() {
            self.push(field, "must be an RFC3339 timestamp");
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Ok when no errors were recorded, otherwise the full error list.
    pub fn finish(self) -> Result<(), ServiceError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(self.errors))
        }
    }
}

/// Capability gate shared by every operation: a denial maps to the fixed
/// Unauthorized failure.
pub(crate) fn require(
    ctx: &crate::auth::AuthContext,
    capability: crate::auth::Capability,
) -> Result<(), ServiceError> {
    match crate::auth::check(ctx, capability) {
        crate::auth::Decision::Allowed => Ok(()),
        crate::auth::Decision::Denied(_) => Err(ServiceError::Unauthorized),
    }
}

/// The acting user's display name for timeline messages.
pub(crate) fn actor_name(
    db: &crate::db::Db,
    ctx: &crate::auth::AuthContext,
) -> Result<String, ServiceError> {
    Ok(db
        .get_user(&ctx.user_id)?
        .map(|u| u.name)
        .unwrap_or_else(|| ctx.user_id.clone()))
}

/// De-duplicate a submitted ID set, preserving first-seen order.
pub(crate) fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_collects_all_errors() {
        let mut v = Validator::new();
        v.bounded_string("", "name", 1, 80);
        v.enum_string("urgent", "priority", &["low", "medium", "high"]);
        v.yyyy_mm_dd("tomorrow", "due_date");

        match v.finish() {
            Err(ServiceError::Validation(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["name", "priority", "due_date"]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_bounded_string_trims() {
        let mut v = Validator::new();
        let value = v.bounded_string("  Fix roof  ", "name", 1, 80);
        assert_eq!(value.as_deref(), Some("Fix roof"));
        assert!(v.finish().is_ok());
    }

    #[test]
    fn test_valid_date_passes() {
        let mut v = Validator::new();
        v.yyyy_mm_dd("2026-08-29", "due_date");
        assert!(v.finish().is_ok());
    }

    #[test]
    fn test_rfc3339_accepts_offsets_and_rejects_bare_dates() {
        let mut v = Validator::new();
        v.rfc3339("2026-08-29T09:30:00+02:00", "starts_at");
        assert!(v.is_ok());
        v.rfc3339("2026-08-29", "starts_at");
        assert!(!v.is_ok());
    }

    #[test]
    fn test_dedup_ids_keeps_order() {
        let ids = vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
        ];
        assert_eq!(dedup_ids(&ids), vec!["b", "a", "c"]);
    }
}
