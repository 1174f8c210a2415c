//! Destination record validation
//!
//! Two independent checks run before a record is sent downstream:
//! [`Validator::validate`] collects human-readable violations of the
//! required-field rules, and [`checkdots`] rejects records whose top-level
//! keys still carry flattened-key dots.

use serde_json::Value;
use tracing::info;

use crate::log::{LogSink, stage};
use crate::value::{Record, as_str, is_blank, is_truthy};

/// Default field holding the chief investigator
pub const DEFAULT_CI_FIELD: &str = "contributor_ci";
/// Default field holding the data manager
pub const DEFAULT_DATA_MANAGER_FIELD: &str = "contributor_data_manager";

/// Checks a destination record against required-field rules
#[derive(Debug, Clone)]
pub struct Validator {
    ci_field: Option<String>,
    data_manager_field: Option<String>,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            ci_field: Some(DEFAULT_CI_FIELD.to_string()),
            data_manager_field: Some(DEFAULT_DATA_MANAGER_FIELD.to_string()),
        }
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the field holding the chief investigator
    pub fn with_ci_field(mut self, field: impl Into<String>) -> Self {
        self.ci_field = Some(field.into());
        self
    }

    /// Set the field holding the data manager
    pub fn with_data_manager_field(mut self, field: impl Into<String>) -> Self {
        self.data_manager_field = Some(field.into());
        self
    }

    /// Skip the chief investigator check, for record types without one
    pub fn without_ci_check(mut self) -> Self {
        self.ci_field = None;
        self
    }

    /// Skip the data manager check
    pub fn without_data_manager_check(mut self) -> Self {
        self.data_manager_field = None;
        self
    }

    /// Validate a destination record
    ///
    /// Every check runs; the result is empty when the record is valid.
    pub fn validate(
        &self,
        owner: &str,
        required: &[String],
        dest: &Record,
        log: &dyn LogSink,
    ) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(field) = &self.ci_field {
            match dest.get(field).filter(|ci| !is_blank(ci)) {
                Some(ci) => compare_owner(field, ci, owner, log),
                None => {
                    log.emit(stage::VALIDATE, "", field, "missing", Value::Null);
                    errors.push(format!("Missing chief investigator ({field})"));
                }
            }
        }

        if let Some(field) = &self.data_manager_field
            && let Some(manager) = dest.get(field).filter(|dm| !is_blank(dm))
            && as_str(manager.get("email")).trim().is_empty()
        {
            log.emit(stage::VALIDATE, "", field, "no email", manager.clone());
        }

        for field in required {
            if !dest.get(field).is_some_and(is_truthy) {
                log.emit(stage::VALIDATE, "", field, "required", Value::Null);
                errors.push(format!("Missing value for {field}"));
            }
        }

        errors
    }
}

/// Informational comparison of the chief investigator with the record owner
fn compare_owner(field: &str, ci: &Value, owner: &str, log: &dyn LogSink) {
    let email = as_str(ci.get("email")).trim();
    let username = as_str(ci.get("username")).trim();
    let owner = owner.trim();
    let matches = !owner.is_empty()
        && (email.eq_ignore_ascii_case(owner) || username.eq_ignore_ascii_case(owner));
    info!(field, owner, matches, "Chief investigator compared with owner");
    let message = if matches { "owner is ci" } else { "owner is not ci" };
    log.emit(stage::VALIDATE, "", field, message, Value::String(owner.to_string()));
}

/// Validate with the default chief investigator and data manager fields
pub fn validate(owner: &str, required: &[String], dest: &Record, log: &dyn LogSink) -> Vec<String> {
    Validator::default().validate(owner, required, dest, log)
}

/// Top-level keys that still contain a dot
pub fn dotted_keys(dest: &Record) -> Vec<String> {
    dest.keys().filter(|k| k.contains('.')).cloned().collect()
}

/// Whether a destination record is free of flattened-key dots
pub fn checkdots(dest: &Record) -> bool {
    dest.keys().all(|k| !k.contains('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::AuditLog;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_required_fields() {
        let log = AuditLog::new();
        let dest = record(json!({
            "contributor_ci": {"text_full_name": "Jane Doe"},
            "title": "",
            "count": 0,
            "keywords": []
        }));
        let required = vec!["title".to_string(), "count".to_string(), "keywords".to_string()];
        let errors = validate("", &required, &dest, &log);
        assert_eq!(errors, vec!["Missing value for title", "Missing value for count"]);
    }

    #[test]
    fn test_missing_ci_is_an_error() {
        let log = AuditLog::new();
        let errors = validate("owner", &[], &record(json!({"contributor_ci": {}})), &log);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("contributor_ci"));

        let errors = Validator::new()
            .without_ci_check()
            .validate("owner", &[], &Record::new(), &log);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_checks_are_not_short_circuited() {
        let log = AuditLog::new();
        let errors = validate("", &["title".to_string()], &Record::new(), &log);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_owner_comparison_is_informational() {
        let log = AuditLog::new();
        let dest = record(json!({"contributor_ci": {"email": "Jane@doe.org"}}));
        assert!(validate("jane@doe.org", &[], &dest, &log).is_empty());
        assert_eq!(log.with_message("owner is ci").len(), 1);

        assert!(validate("sam", &[], &dest, &log).is_empty());
        assert_eq!(log.with_message("owner is not ci").len(), 1);
    }

    #[test]
    fn test_data_manager_without_email_is_logged_only() {
        let log = AuditLog::new();
        let dest = record(json!({
            "contributor_ci": {"email": "a@b.org"},
            "contributor_data_manager": {"text_full_name": "Sam"}
        }));
        assert!(validate("", &[], &dest, &log).is_empty());
        assert_eq!(log.with_message("no email").len(), 1);
    }

    #[test]
    fn test_custom_fields() {
        let log = AuditLog::new();
        let dest = record(json!({"lead": {"email": "a@b.org"}}));
        let errors = Validator::new()
            .with_ci_field("lead")
            .with_data_manager_field("steward")
            .validate("", &[], &dest, &log);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_checkdots() {
        assert!(checkdots(&record(json!({"a": {"b.c": 1}, "d": 2}))));
        let dotted = record(json!({"a.1.b": 1, "c": 2}));
        assert!(!checkdots(&dotted));
        assert_eq!(dotted_keys(&dotted), vec!["a.1.b"]);
    }
}
