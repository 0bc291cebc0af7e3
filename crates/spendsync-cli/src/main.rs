//! spendsync - Resumable batch upload of expense records
//!
//! Partitions line items by owning cost center, uploads them in bounded
//! batches and keeps every request and response on disk so that failed
//! batches can be replayed later.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;
mod input;

use config::Config;
use spendsync_upload::UploadError;

#[derive(Parser)]
#[command(name = "spendsync")]
#[command(about = "Resumable batch upload of expense records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./spendsync.toml or ~/.config/spendsync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Upload records described by an upload.toml
    Upload(cmd::upload::UploadArgs),
    /// Show batches and fingerprint of a run directory
    Status(cmd::status::StatusArgs),
    /// Remove the artifacts of a run directory
    Clear(cmd::clear::ClearArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(spendsync_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, the progress bar shows activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    spendsync_core::init_logging(quiet, cli.debug, multi);

    match dispatch(cli, &progress) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", describe_error(&e));
            ExitCode::FAILURE
        }
    }
}

/// Storage and payload errors can stop a run midway; every other upload
/// error aborts before the first batch.
fn describe_error(e: &anyhow::Error) -> String {
    match e.downcast_ref::<UploadError>() {
        Some(UploadError::Storage(_) | UploadError::Payload(_)) => {
            format!("upload stopped: {e:#}")
        }
        Some(_) => format!("upload aborted, no batches were sent: {e}"),
        None => format!("{e:#}"),
    }
}

fn dispatch(cli: Cli, progress: &spendsync_core::SharedProgress) -> Result<ExitCode> {
    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Upload(args) => cmd::upload::run(args, &config, progress),
        Command::Status(args) => cmd::status::run(args).map(|()| ExitCode::SUCCESS),
        Command::Clear(args) => cmd::clear::run(args).map(|()| ExitCode::SUCCESS),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec![
                "Runs directory",
                &config.runs.base_dir.display().to_string(),
            ]);
            table.add_row(vec![
                "Proxy",
                config.http.proxy.as_deref().unwrap_or("none"),
            ]);
            table.add_row(vec![
                "Default user",
                config.target.user.as_deref().unwrap_or("not set"),
            ]);
            table.add_row(vec![
                "Default password",
                if config.target.password.is_some() {
                    "configured"
                } else {
                    "not set"
                },
            ]);

            eprintln!("\n{table}");
            Ok(ExitCode::SUCCESS)
        }
    }
}
