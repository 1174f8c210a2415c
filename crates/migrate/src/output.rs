//! Report writing and terminal output

use std::path::Path;

use crosswalk_core::log::LogEvent;
use crosswalk_core::migrate::{MigrationReport, MigrationSummary, RecordOutcome};
use crosswalk_core::value::brief;

use crate::error::CliError;

/// Column headings of the audit trail CSV
pub const AUDIT_HEADER: [&str; 6] = ["oid", "stage", "ofield", "nfield", "status", "value"];

/// Write audit events as CSV, one row per event
pub fn write_audit_csv(path: &Path, events: &[LogEvent]) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| CliError::ReportError(format!("{}: {}", path.display(), e)))?;
    writer.write_record(AUDIT_HEADER)?;
    for event in events {
        writer.write_record([
            event.oid.as_deref().unwrap_or(""),
            event.stage.as_str(),
            event.source_field.as_str(),
            event.dest_field.as_str(),
            event.message.as_str(),
            brief(&event.value).as_str(),
        ])?;
    }
    writer
        .flush()
        .map_err(|e| CliError::ReportError(format!("{}: {}", path.display(), e)))
}

/// Write run summaries as pretty JSON
pub fn write_summary(path: &Path, summaries: &[MigrationSummary]) -> Result<(), CliError> {
    let content = serde_json::to_string_pretty(summaries)?;
    std::fs::write(path, content)
        .map_err(|e| CliError::ReportError(format!("{}: {}", path.display(), e)))
}

/// Print a run report to stderr
pub fn print_report(report: &MigrationReport, verbose: bool) {
    let summary = report.summary();
    eprintln!();
    eprintln!("Crosswalk {}", summary.crosswalk);
    eprintln!("{}", "=".repeat(10 + summary.crosswalk.len()));
    eprintln!("Run: {}", summary.run_id);
    if summary.dry_run {
        eprintln!("DRY RUN - nothing was written");
    }
    if let Some(error) = &summary.error {
        eprintln!("ABORTED: {}", error);
    }
    eprintln!(
        "Records: {} ({} migrated, {} invalid, {} skipped, {} failed)",
        summary.total, summary.migrated, summary.invalid, summary.skipped, summary.failed
    );
    eprintln!("Duration: {}ms", summary.duration_ms);

    for result in &report.results {
        match &result.outcome {
            RecordOutcome::Migrated(Some(new_oid)) if verbose => {
                eprintln!("  {} -> {}", result.oid, new_oid)
            }
            RecordOutcome::Migrated(_) => {}
            RecordOutcome::Invalid(errors) => eprintln!("  {} invalid: {}", result.oid, errors.join("; ")),
            RecordOutcome::Skipped(reason) => eprintln!("  {} skipped: {}", result.oid, reason),
            RecordOutcome::Failed(reason) => eprintln!("  {} FAILED: {}", result.oid, reason),
        }
    }

    if verbose {
        eprintln!();
        eprintln!("Audit messages:");
        for (message, count) in &summary.messages {
            eprintln!("  {:<24} {}", message, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_audit_csv_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.csv");
        let events = vec![
            LogEvent::new("crosswalk", "dc:title", "title", "copied", json!("Soil, water")).with_oid("r1"),
            LogEvent::new("crosswalk", "x", "", "unmatched", json!(3)),
        ];
        write_audit_csv(&path, &events).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "oid,stage,ofield,nfield,status,value");
        assert_eq!(lines[1], "r1,crosswalk,dc:title,title,copied,\"Soil, water\"");
        assert_eq!(lines[2], ",crosswalk,x,,unmatched,3");
    }
}
