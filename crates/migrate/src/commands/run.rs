//! CLI command for running a migration

use std::path::PathBuf;

use crosswalk_core::migrate::{MigrationConfig, run_config};
use tracing::info;

use crate::error::CliError;
use crate::output::{print_report, write_audit_csv, write_summary};

/// Arguments for the `run` command
pub struct RunArgs {
    /// Migration config file (TOML)
    pub config: PathBuf,
    /// Crosswalk and validate without writing
    pub dry_run: bool,
    /// Maximum records per crosswalk
    pub limit: Option<usize>,
    /// Report directory, overriding the config
    pub report_dir: Option<PathBuf>,
    /// Verbose output
    pub verbose: bool,
}

/// Handle the `run` command
///
/// Writes `<crosswalk>.csv` (audit trail) per crosswalk and `summary.json`
/// into the report directory.
pub async fn handle_run(args: &RunArgs) -> Result<(), CliError> {
    let mut config = MigrationConfig::load(&args.config)?;
    if args.dry_run {
        config = config.with_dry_run(true);
    }
    if args.limit.is_some() {
        config = config.with_limit(args.limit);
    }
    if let Some(dir) = &args.report_dir {
        config = config.with_report_dir(dir);
    }
    config.validate().map_err(CliError::InvalidArgument)?;

    if args.verbose {
        eprintln!("Migration config: {}", args.config.display());
        eprintln!("  Crosswalks: {}", config.crosswalks.join(", "));
        eprintln!("  Reports: {}", config.report_dir.display());
        if config.dry_run {
            eprintln!("DRY RUN MODE - no records will be written");
        }
    }

    let reports = run_config(&config).await?;

    std::fs::create_dir_all(&config.report_dir)
        .map_err(|e| CliError::ReportError(format!("{}: {}", config.report_dir.display(), e)))?;
    let mut summaries = Vec::with_capacity(reports.len());
    for report in &reports {
        let audit_path = config.report_dir.join(format!("{}.csv", report.crosswalk));
        write_audit_csv(&audit_path, &report.events)?;
        info!(crosswalk = %report.crosswalk, path = %audit_path.display(), "Wrote audit trail");
        print_report(report, args.verbose);
        summaries.push(report.summary());
    }
    let summary_path = config.report_dir.join("summary.json");
    write_summary(&summary_path, &summaries)?;
    eprintln!();
    eprintln!("Reports written to {}", config.report_dir.display());
    Ok(())
}
