//! OmniDrive CLI - Command-line interface for OmniDrive
//!
//! Provides commands for:
//! - Listing one storage backend
//! - Comparing two storage backends
//! - Copying missing files between backends
//! - Running and inspecting multi-step workflows
//! - Saving and resuming named sessions

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use omnidrive_core::config::{Config, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod output;

use commands::{
    compare::CompareCommand, completions::CompletionsCommand, config::ConfigCommand,
    list::ListCommand, session::SessionCommand, sync::SyncCommand, workflow::WorkflowCommand,
};
use context::AppContext;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "omnidrive",
    version,
    about = "Compare and synchronize files across storage backends"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the files of one backend
    List(ListCommand),
    /// Show which files exist on one backend, the other, or both
    Compare(CompareCommand),
    /// Copy files missing on the target from the source
    Sync(SyncCommand),
    /// Run and inspect workflows
    #[command(subcommand)]
    Workflow(WorkflowCommand),
    /// Save and resume named sessions
    #[command(subcommand)]
    Session(SessionCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config_path, config) = match &cli.config {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            (path.clone(), config)
        }
        None => {
            let path = Config::default_path();
            let config = Config::load_or_default(&path);
            (path, config)
        }
    };

    init_tracing(cli.verbose, cli.quiet, &config.logging);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = AppContext::new(config_path, config, format, cli.quiet);

    match cli.command {
        Commands::List(cmd) => cmd.execute(&ctx).await,
        Commands::Compare(cmd) => cmd.execute(&ctx).await,
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Workflow(cmd) => cmd.execute(&ctx).await,
        Commands::Session(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
        Commands::Completions(cmd) => cmd.execute(&ctx).await,
    }
}

/// Installs the global subscriber; logs go to stderr
///
/// `RUST_LOG` wins over `-v`/`-q`, which win over `logging.level`.
fn init_tracing(verbose: u8, quiet: bool, logging: &LoggingConfig) {
    let level = match (verbose, quiet) {
        (0, true) => "warn",
        (0, false) => logging.level.as_str(),
        (1, _) => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;
    use crate::commands::sync::Direction;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sync_flags() {
        let cli = Cli::try_parse_from([
            "omnidrive", "--json", "sync", "drive-a", "drive-b", "--dry-run", "--limit", "5",
            "--direction", "to-source",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Sync(cmd) => {
                assert_eq!(cmd.source, "drive-a");
                assert!(cmd.dry_run);
                assert_eq!(cmd.limit, Some(5));
                assert_eq!(cmd.direction, Direction::ToSource);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_list_flags() {
        let cli = Cli::try_parse_from([
            "omnidrive", "list", "drive-a", "--scope", "photos", "--limit", "20",
        ])
        .unwrap();
        match cli.command {
            Commands::List(cmd) => {
                assert_eq!(cmd.backend, "drive-a");
                assert_eq!(cmd.scope.as_deref(), Some("photos"));
                assert_eq!(cmd.limit, Some(20));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_run_id() {
        let result = Cli::try_parse_from(["omnidrive", "workflow", "status", "backup", "nope"]);
        assert!(result.is_err());
    }
}
