//! Error types for crosswalk operations
//!
//! Field-level problems (missing, blank, unmapped, unmatched values) are never
//! errors: they are reported through the audit log. The variants here cover
//! configuration failures, which abort loading a crosswalk, and hard
//! per-record failures, which skip a single record.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while loading or running a crosswalk
#[derive(Error, Debug)]
pub enum CrosswalkError {
    /// A mandatory section of the mapping spec is absent
    #[error("Mapping spec is missing mandatory section '{0}'")]
    MissingSection(String),

    /// A field rule could not be interpreted
    #[error("Invalid rule for field '{field}': {message}")]
    InvalidRule { field: String, message: String },

    /// Failed to read a mapping spec or record file
    #[error("Failed to read {path}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a mapping spec or record
    #[error("Failed to parse: {0}")]
    Parse(String),

    /// Migration run configuration is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Handler name is not present in the registry
    #[error("No handler registered under the name '{0}'")]
    UnknownHandler(String),

    /// A destination key still carries a dot after crosswalking
    #[error("Record has un-crosswalked dotted fields: {}", .0.join(", "))]
    ResidualDots(Vec<String>),

    /// Destination record failed validation
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Record store failure
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for crosswalk operations
pub type CrosswalkResult<T> = Result<T, CrosswalkError>;

impl CrosswalkError {
    /// Create an invalid rule error
    pub fn invalid_rule(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the error is fatal to a whole run rather than a single record
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            CrosswalkError::MissingSection(_)
                | CrosswalkError::InvalidRule { .. }
                | CrosswalkError::ReadError { .. }
                | CrosswalkError::Parse(_)
                | CrosswalkError::Config(_)
        )
    }
}

impl From<serde_yaml::Error> for CrosswalkError {
    fn from(e: serde_yaml::Error) -> Self {
        CrosswalkError::Parse(e.to_string())
    }
}
