//! rbmigrate - migrate legacy repository records through a crosswalk

mod commands;
mod error;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::crosswalk::{CrosswalkArgs, handle_crosswalk};
use commands::run::{RunArgs, handle_run};
use commands::spec::{CheckSpecArgs, handle_check_spec};

#[derive(Parser)]
#[command(name = "rbmigrate", version, about = "Migrate legacy repository records through a crosswalk")]
struct Cli {
    /// Verbose output (debug logging unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and check a mapping spec
    CheckSpec {
        /// Mapping spec file (JSON or YAML)
        file: PathBuf,
    },
    /// Crosswalk a single raw record
    Crosswalk {
        /// Mapping spec file
        #[arg(long)]
        spec: PathBuf,
        /// Raw source record (JSON)
        #[arg(long)]
        record: PathBuf,
        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a full migration
    Run {
        /// Migration config file (TOML)
        #[arg(short, long)]
        config: PathBuf,
        /// Crosswalk and validate without writing records
        #[arg(long)]
        dry_run: bool,
        /// Maximum records per crosswalk
        #[arg(long)]
        limit: Option<usize>,
        /// Report directory
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::CheckSpec { file } => handle_check_spec(&CheckSpecArgs {
            file,
            verbose: cli.verbose,
        })?,
        Commands::Crosswalk {
            spec,
            record,
            output,
        } => {
            handle_crosswalk(&CrosswalkArgs {
                spec,
                record,
                output,
                verbose: cli.verbose,
            })
            .await?
        }
        Commands::Run {
            config,
            dry_run,
            limit,
            report_dir,
        } => {
            handle_run(&RunArgs {
                config,
                dry_run,
                limit,
                report_dir,
                verbose: cli.verbose,
            })
            .await?
        }
    }
    Ok(())
}
