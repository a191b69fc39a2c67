mod commands;
mod render;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "actisync")]
#[command(about = "Sync Toggl time entries and Google Fit activity into Google Calendar")]
struct Cli {
    /// Use this config file instead of ~/.config/actisync/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile recent activity into the calendar
    Sync {
        /// Decide what would change without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Number of past days to sync (overrides days_to_sync)
        #[arg(long)]
        days: Option<i64>,

        /// Only run this source
        #[arg(long, value_enum)]
        only: Option<SourceKind>,

        /// Also write the error report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file location
    Path,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    Toggl,
    GoogleFit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = match cli.config {
        Some(path) => path,
        None => actisync_core::SyncConfig::config_path()?,
    };

    match cli.command {
        Commands::Sync {
            dry_run,
            days,
            only,
            report,
        } => {
            let options = commands::sync::SyncOptions {
                dry_run,
                days,
                only,
                report,
            };
            let success = commands::sync::run(&config_path, options).await?;
            if !success {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => commands::config::init(&config_path, force),
            ConfigAction::Path => commands::config::path(&config_path),
        },
    }
}

/// `RUST_LOG` wins; otherwise warnings only, or debug with `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("actisync_core={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
