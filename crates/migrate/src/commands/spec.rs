//! CLI command for checking a mapping spec

use std::collections::BTreeMap;
use std::path::PathBuf;

use crosswalk_core::handlers::builtin_registry;
use crosswalk_core::spec::{FieldRule, MappingSpec};
use tracing::warn;

use crate::error::CliError;

/// Arguments for the `check-spec` command
pub struct CheckSpecArgs {
    /// Mapping spec file
    pub file: PathBuf,
    /// Verbose output
    pub verbose: bool,
}

/// Handle the `check-spec` command
///
/// Loading fails on missing sections and malformed rules. Handler names the
/// registry does not know are only reported, as the interpreter treats them
/// as a per-field problem.
pub fn handle_check_spec(args: &CheckSpecArgs) -> Result<(), CliError> {
    let spec = MappingSpec::load(&args.file)?;

    let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
    let mut unknown = Vec::new();
    for (source, rule) in &spec.fields {
        let kind = match rule {
            FieldRule::Copy(_) => "copy",
            FieldRule::ValueMap(_) => "valuemap",
            FieldRule::Record(record) => {
                if let Some(handler) = record.handler.as_deref()
                    && !builtin_registry().contains(handler)
                {
                    warn!(field = %source, handler, "Unknown handler");
                    unknown.push((source.as_str(), handler));
                }
                "record"
            }
        };
        *kinds.entry(kind).or_insert(0) += 1;
    }

    eprintln!("Mapping spec {}", args.file.display());
    eprintln!("  {} -> {}", spec.source_type, spec.dest_type);
    eprintln!("  Fields: {}", spec.fields.len());
    for (kind, count) in &kinds {
        eprintln!("    {:<10} {}", kind, count);
    }
    eprintln!("  Required: {}", spec.required.join(", "));
    eprintln!("  Post tasks: {}", spec.post_tasks.len());

    if args.verbose {
        for (source, rule) in &spec.fields {
            eprintln!("    {} -> {}", source, rule.destination(source));
        }
    }

    if !unknown.is_empty() {
        eprintln!();
        eprintln!("Unknown handlers:");
        for (source, handler) in &unknown {
            eprintln!("  {}: {}", source, handler);
        }
    }
    Ok(())
}
