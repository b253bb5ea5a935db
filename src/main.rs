//! rsync-share - main entry point
//!
//! Parses arguments, imports keys, optionally creates a share and prints the
//! commands needed to mount it and rsync into it.

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rsync_share::cli::Cli;
use rsync_share::keys::ImportOutcome;
use rsync_share::settings::Settings;
use rsync_share::setup::{run_setup, SetupReport};

/// Initialize the logger. Logs go to stderr; stdout carries the instructions.
fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    debug!("CLI arguments parsed: {:?}", cli);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => {
            info!("Loading settings from {:?}", path);
            Settings::load_from_file(path)
                .with_context(|| format!("Failed to load settings from {:?}", path))?
        }
        None => Settings::detect(),
    }
    .with_overrides(&cli.overrides());

    settings.validate().context("Invalid settings")?;

    let report = run_setup(&cli.setup_request(), &settings).context("Setup failed")?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &SetupReport) {
    for key in &report.keys {
        match (key.outcome, report.dry_run) {
            (ImportOutcome::Imported, false) => {
                println!("Imported key successfully: {}", key.trimmed);
            }
            (ImportOutcome::Imported, true) => {
                println!("Would import key: {} ({})", key.trimmed, key.fingerprint);
            }
            (ImportOutcome::AlreadyPresent, _) => {
                println!("Key already authorized: {}", key.fingerprint);
            }
        }
    }

    if let Some(plan) = &report.planned_share {
        println!("{}", plan.summary());
    }

    if let Some(share) = &report.share {
        println!(
            "Created share \"{}\" and limited it to {}",
            share.name, share.requested_size
        );
        println!("Mount share with the following command: \n{}", share.mount_command);
    }

    println!("\nRsync from client with: {}", report.rsync_hint);
}
