//! CLI command for crosswalking a single record

use std::path::PathBuf;

use crosswalk_core::crosswalk::CrosswalkInterpreter;
use crosswalk_core::log::{AuditLog, LogEvent};
use crosswalk_core::spec::MappingSpec;
use crosswalk_core::validate::{dotted_keys, validate};
use crosswalk_core::value::{Record, as_str};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

/// Arguments for the `crosswalk` command
pub struct CrosswalkArgs {
    /// Mapping spec file
    pub spec: PathBuf,
    /// Raw source record (JSON)
    pub record: PathBuf,
    /// Output file, stdout if not set
    pub output: Option<PathBuf>,
    /// Verbose output
    pub verbose: bool,
}

/// Everything produced for one record
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CrosswalkOutput {
    unflattened: Record,
    dest: Record,
    errors: Vec<String>,
    residual_dots: Vec<String>,
    log: Vec<LogEvent>,
}

/// Handle the `crosswalk` command
pub async fn handle_crosswalk(args: &CrosswalkArgs) -> Result<(), CliError> {
    let spec = MappingSpec::load(&args.spec)?;

    let content = std::fs::read_to_string(&args.record)
        .map_err(|e| CliError::FileReadError(format!("{}: {}", args.record.display(), e)))?;
    let Value::Object(raw) = serde_json::from_str(&content)? else {
        return Err(CliError::InvalidArgument(format!(
            "{} is not a JSON object",
            args.record.display()
        )));
    };

    let log = AuditLog::new();
    let (unflattened, dest) = CrosswalkInterpreter::new(&spec).crosswalk(&raw, &log).await;
    let owner = as_str(raw.get(&spec.ownerfield));
    let errors = validate(owner, &spec.required, &dest, &log);
    let residual_dots = dotted_keys(&dest);

    if args.verbose {
        eprintln!("Audit messages:");
        for (message, count) in log.count_by_message() {
            eprintln!("  {:<24} {}", message, count);
        }
    }
    if errors.is_empty() && residual_dots.is_empty() {
        eprintln!("Record is valid");
    } else {
        for error in &errors {
            eprintln!("Invalid: {}", error);
        }
        if !residual_dots.is_empty() {
            eprintln!("Residual dotted fields: {}", residual_dots.join(", "));
        }
    }

    let output = CrosswalkOutput {
        unflattened,
        dest,
        errors,
        residual_dots,
        log: log.drain(),
    };
    let json = serde_json::to_string_pretty(&output)?;
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .map_err(|e| CliError::ReportError(format!("{}: {}", path.display(), e)))?,
        None => println!("{}", json),
    }
    Ok(())
}
