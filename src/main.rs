//! flickr-backup: resumable backup of a Flickr photo library.
//!
//! Authorizes once over OAuth 1.0a and keeps the access token, lists every
//! album plus the photos in no album, and downloads originals into one
//! folder per album. Each completed copy is recorded in a ledger inside the
//! backup directory, so an interrupted run picks up where it stopped.

#![warn(clippy::all)]

mod auth;
mod backup;
mod catalog;
mod cli;
mod config;
mod download;
mod fs;
mod provider;
pub mod retry;
mod shutdown;
mod state;
#[cfg(test)]
mod test_support;
mod types;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use auth::prompt::{StdinPrompt, VerifierPrompt};
use backup::Orchestrator;
use cli::Command;
use download::file::MediaSource;
use provider::flickr::FlickrClient;
use state::ResumeLedger;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let code = match run(cli.effective_command()).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            1
        }
    };
    // Exit here rather than returning: a verification prompt abandoned on
    // timeout still blocks a thread on stdin, and dropping the runtime would
    // wait for it.
    std::process::exit(code);
}

async fn run(command: Command) -> anyhow::Result<i32> {
    match command {
        Command::Backup(args) => run_backup(args).await,
        Command::Status(args) => run_status(args).await,
        Command::Verify(args) => run_verify(args).await,
    }
}

async fn run_backup(args: cli::BackupArgs) -> anyhow::Result<i32> {
    let config = config::Config::from_cli(args)?;
    tracing::debug!(?config, "Resolved configuration");
    tracing::info!(workers = config.workers, "Starting flickr-backup");

    let cancel = shutdown::install_signal_handler()?;
    let api = FlickrClient::new(config::API_TIMEOUT)?;
    let media: Arc<dyn MediaSource> =
        Arc::new(download::file::media_client(config::MEDIA_CONNECT_TIMEOUT)?);
    let prompt: Arc<dyn VerifierPrompt> = Arc::new(StdinPrompt);

    let summary = Orchestrator::new(&api, media, prompt, config.consumer(), config.backup_options())
        .run(&cancel)
        .await?;

    if summary.interrupted {
        return Ok(shutdown::INTERRUPTED_EXIT_CODE);
    }
    if summary.failed > 0 {
        tracing::error!(
            "{} of {} tasks failed; they will be retried on the next run",
            summary.failed,
            summary.planned
        );
        return Ok(1);
    }
    Ok(0)
}

/// Run the status command.
async fn run_status(args: cli::LedgerArgs) -> anyhow::Result<i32> {
    let dir = config::expand_tilde(&args.dir);
    let path = ResumeLedger::path_in(&dir);

    if !path.exists() && !ResumeLedger::journal_path(&path).exists() {
        println!("No ledger found at {}", path.display());
        println!("Run a backup first to create it.");
        return Ok(0);
    }

    let ledger = ResumeLedger::load(&path).await?;
    let summary = ledger.summary().await;

    println!("Ledger: {}", path.display());
    println!();
    println!("Backed up:");
    println!("  Total:         {}", summary.total);
    println!("  Completed:     {}", summary.completed);
    println!("  With warnings: {}", summary.completed_with_warning);
    println!("  Albums:        {}", summary.albums);
    println!("  Unsorted:      {}", summary.unsorted);
    if let Some(last) = summary.last_completed_at {
        println!();
        println!("Last completed: {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(0)
}

/// Run the verify command.
async fn run_verify(args: cli::LedgerArgs) -> anyhow::Result<i32> {
    let dir = config::expand_tilde(&args.dir);
    let path = ResumeLedger::path_in(&dir);

    if !path.exists() && !ResumeLedger::journal_path(&path).exists() {
        println!("No ledger found at {}", path.display());
        println!("Run a backup first to create it.");
        return Ok(0);
    }

    let ledger = ResumeLedger::load(&path).await?;
    let entries = ledger.entries().await;
    println!("Verifying {} recorded files...", entries.len());
    println!();

    let mut verified = 0;
    let mut missing = 0;
    let mut no_sidecar = 0;

    for (key, entry) in &entries {
        let Some(relative) = &entry.path else {
            println!("NO PATH: {} - no local path recorded", key);
            missing += 1;
            continue;
        };
        let file = dir.join(relative);
        if !file.exists() {
            println!("MISSING: {} ({})", file.display(), key);
            missing += 1;
        } else if !download::paths::sidecar_path(&file).exists() {
            println!("NO SIDECAR: {} ({})", file.display(), key);
            no_sidecar += 1;
        } else {
            verified += 1;
        }
    }

    println!();
    println!("Results:");
    println!("  Verified:   {}", verified);
    println!("  Missing:    {}", missing);
    println!("  No sidecar: {}", no_sidecar);

    Ok(if missing > 0 || no_sidecar > 0 { 1 } else { 0 })
}
