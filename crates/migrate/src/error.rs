//! CLI error types

use crosswalk_core::CrosswalkError;
use thiserror::Error;

/// Errors surfaced by `rbmigrate` commands
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to read file: {0}")]
    FileReadError(String),

    #[error("Failed to write report: {0}")]
    ReportError(String),

    #[error(transparent)]
    Crosswalk(#[from] CrosswalkError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
