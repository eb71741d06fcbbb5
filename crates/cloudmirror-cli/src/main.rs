//! cloudmirror CLI - One-way mirroring of local trees into Google Drive
//!
//! Provides commands for:
//! - Reconciling the configured mappings (`sync`)
//! - Validating the configuration file (`check`)

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cloudmirror_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{check::CheckCommand, sync::SyncCommand};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "cloudmirror",
    version,
    about = "Mirror local directories into Google Drive"
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

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Mirror every configured path into the remote folder
    Sync(SyncCommand),
    /// Validate the configuration file
    Check(CheckCommand),
}

/// Filter directive for a `-v` count, falling back to the configured level
fn log_directive(verbose: u8, configured: Option<&str>) -> String {
    match verbose {
        0 => configured.unwrap_or("info").to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn init_tracing(verbose: u8, config: Option<&Config>) {
    let directive = log_directive(verbose, config.map(|c| c.logging.level.as_str()));
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    // Logs go to stderr so stdout carries only command output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.is_some_and(|c| c.logging.format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let loaded = Config::load(&config_path);
    init_tracing(cli.verbose, loaded.as_ref().ok());

    let format = OutputFormat::from_json_flag(cli.json);

    match cli.command {
        Commands::Check(cmd) => cmd.execute(&config_path, loaded, format),
        Commands::Sync(cmd) => cmd.execute(&config_path, loaded?, format).await,
    }
}
