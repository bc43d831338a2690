//! Ledgerly license tool
//!
//! Activates, inspects and watches the license on this device using the
//! same controller the app embeds.
//!
//! Usage:
//!   ledgerly-license status
//!   ledgerly-license activate ABCD-1234-WXYZ
//!   ledgerly-license watch --verbose

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use ledgerly_cli::{describe, open_store, resolve_data_dir, FileConfig, Overrides};
use ledgerly_license::{HttpAuthority, LicenseController};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ledgerly-license")]
#[command(about = "Ledgerly license activation and status")]
struct Args {
    /// Directory holding the encrypted license store
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// License service base URL
    #[arg(long)]
    api_url: Option<String>,

    /// License service API key
    #[arg(long, env = "LEDGERLY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// JSON config file with `license` and `authority` sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the stored license and print the state
    Status,
    /// Activate a license code on this device
    Activate {
        /// License code (XXXX-XXXX-XXXX)
        code: String,
    },
    /// Revalidate the stored license against the service
    Refresh,
    /// Remove the license from this device
    Remove,
    /// Keep running and print every state change until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = FileConfig::load(args.config.as_deref())?.with_overrides(Overrides {
        api_url: args.api_url,
        api_key: args.api_key,
    });
    let data_dir = resolve_data_dir(args.data_dir)?;
    debug!("Using data directory {}", data_dir.display());

    let store = open_store(&data_dir)?;
    let authority =
        HttpAuthority::new(config.authority.clone()).context("Failed to build HTTP client")?;
    let controller = LicenseController::new(config.license, Arc::new(authority), Arc::new(store));

    let code = match args.command {
        Command::Status => {
            let snapshot = controller.initialize().await;
            print_json(&snapshot)?;
            exit_code(snapshot.is_valid)
        }
        Command::Activate { code } => {
            controller.initialize().await;
            let outcome = controller.activate(&code).await;
            if outcome.success {
                controller.confirm_activation().await;
            }
            print_json(&outcome)?;
            exit_code(outcome.success)
        }
        Command::Refresh => {
            controller.initialize().await;
            let record = controller.refresh_license().await;
            print_json(&record)?;
            exit_code(record.valid)
        }
        Command::Remove => {
            let outcome = controller.remove_license().await;
            print_json(&outcome)?;
            exit_code(outcome.success)
        }
        Command::Watch => {
            watch(&controller).await?;
            ExitCode::SUCCESS
        }
    };

    controller.shutdown();
    Ok(code)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

async fn watch(controller: &LicenseController) -> Result<()> {
    let mut updates = controller.subscribe();
    controller.initialize().await;
    updates.mark_changed();
    info!("Watching license state, press Ctrl-C to stop");

    let mut last = String::new();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = describe(&updates.borrow_and_update(), Utc::now());
                if line != last {
                    println!("{} {line}", Utc::now().format("%H:%M:%S"));
                    last = line;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Stopping");
                break;
            }
        }
    }
    Ok(())
}
