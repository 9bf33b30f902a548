//! depoline - migrate FGDC metadata records into a Zenodo catalog
//!
//! Transforms source XML into deposition payloads, screens them for
//! duplicates, uploads in checkpointed batches, then audits, verifies and
//! publishes the deposits.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use depoline_core::{HttpConfig, ProgressContext, SharedProgress, Verbosity};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "depoline")]
#[command(about = "Migrate FGDC metadata records into a Zenodo catalog")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./depoline.toml or ~/.config/depoline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the migration pipeline
    Run(cmd::run::RunArgs),
    /// Show checkpoint and record counts
    Status(cmd::status::StatusArgs),
    /// Review open duplicate candidates
    Review(cmd::review::ReviewArgs),
    /// Return failed records to a retryable status
    Retry(cmd::retry::RetryArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(ProgressContext::new());

    // TTY: warnings only unless --debug, the bars show activity.
    // Off-TTY: info, the log is the only progress indicator.
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let verbosity = match (cli.debug, is_tty) {
        (true, _) => Verbosity::Debug,
        (false, true) => Verbosity::Quiet,
        (false, false) => Verbosity::Normal,
    };
    if let Err(e) = depoline_core::init_logging(verbosity, multi) {
        eprintln!("failed to initialize logging: {e}");
    }
    if let Err(e) = depoline_core::install_signal_handlers() {
        log::warn!("signal handlers not installed: {e}");
    }

    match dispatch(cli, &progress) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn dispatch(cli: Cli, progress: &SharedProgress) -> Result<u8> {
    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    depoline_core::set_http_config(HttpConfig {
        request_timeout: std::time::Duration::from_secs(config.zenodo.request_timeout),
    });

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, progress),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Review(args) => cmd::review::run(args, &config),
        Command::Retry(args) => cmd::retry::run(args, &config),
        Command::Config => {
            cmd::show_config(&config);
            Ok(0)
        }
    }
}
