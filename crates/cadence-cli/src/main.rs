//! Cadence CLI - Command-line interface for Cadence
//!
//! Provides commands for:
//! - Running a sync cycle on demand
//! - Viewing per-collection sync status
//! - Inspecting the local snapshot
//! - Signing out and wiping local data
//! - Viewing and editing configuration

use std::path::PathBuf;

use anyhow::Result;
use cadence_core::config::Config;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, logout::LogoutCommand, show::ShowCommand, status::StatusCommand,
    sync::SyncCommand, CommandContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "cadence", version, about = "Offline-first sync for Cadence user data")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
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
    /// Push local changes and pull remote ones now
    Sync(SyncCommand),
    /// Show per-collection synchronization status
    Status(StatusCommand),
    /// Print records from the local snapshot
    Show(ShowCommand),
    /// Stop syncing and delete all local data
    Logout(LogoutCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let context = CommandContext {
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        },
        quiet: cli.quiet,
        config_path: cli.config.unwrap_or_else(Config::default_path),
    };

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(&context).await,
        Commands::Status(cmd) => cmd.execute(&context).await,
        Commands::Show(cmd) => cmd.execute(&context).await,
        Commands::Logout(cmd) => cmd.execute(&context).await,
        Commands::Config(cmd) => cmd.execute(&context).await,
    }
}
