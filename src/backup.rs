//! One backup run: credential, listing, planning, transfer, summary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs4::fs_std::FileExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::auth::credential::CredentialStore;
use crate::auth::error::AuthError;
use crate::auth::prompt::VerifierPrompt;
use crate::auth::{self, AuthOptions};
use crate::catalog::{CollectionEnumerator, EnumerationError};
use crate::download::file::{MediaSource, TransferWorker};
use crate::download::throttle::Throttle;
use crate::download::{self, format_duration, DownloadConfig};
use crate::download::plan::DownloadPlanner;
use crate::provider::{ConsumerKeys, ProviderApi, SessionContext};
use crate::retry::RetryConfig;
use crate::state::{LedgerError, ResumeLedger};

const LOCK_FILE_NAME: &str = ".backup.lock";

/// Pause applied to all workers after a rate-limit response without
/// `Retry-After`.
const DEFAULT_THROTTLE_PAUSE: Duration = Duration::from_secs(60);

/// Errors that stop a run. Everything else is counted per task.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Authorization failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Enumeration(#[from] EnumerationError),

    #[error("Resume ledger unusable: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Another backup is already running in this directory (lock: {})", path.display())]
    Locked { path: PathBuf },

    #[error("Cannot prepare {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    Spawn(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub directory: PathBuf,
    pub token_file: PathBuf,
    pub force_reauth: bool,
    pub workers: usize,
    pub retry_delay: Duration,
    pub idle_timeout: Duration,
    pub verifier_timeout: Duration,
    pub listing_retry: RetryConfig,
    pub no_progress_bar: bool,
}

/// Per-outcome counts for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Every task key considered this run, whatever its outcome.
    pub planned: usize,
    pub completed: usize,
    pub completed_with_warning: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Found in the ledger; no transfer attempted.
    pub resumed: usize,
    pub not_started: usize,
    pub interrupted: bool,
}

impl RunSummary {
    fn log(&self, elapsed: Duration) {
        tracing::info!("── Summary ──");
        tracing::info!(
            "  {} completed, {} with warnings, {} skipped, {} failed",
            self.completed,
            self.completed_with_warning,
            self.skipped,
            self.failed
        );
        tracing::info!("  {} already backed up, {} total", self.resumed, self.planned);
        if self.interrupted {
            tracing::info!("  Interrupted: {} not started", self.not_started);
        }
        tracing::info!("  elapsed: {}", format_duration(elapsed));
    }
}

/// Hold an exclusive advisory lock on the backup directory for the life of
/// the returned file.
pub(crate) async fn acquire_lock(dir: &Path) -> Result<std::fs::File, RunError> {
    let lock_path = dir.join(LOCK_FILE_NAME);
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::create(&lock_path).map_err(|e| RunError::Io {
            path: lock_path.clone(),
            source: e,
        })?;
        file.try_lock_exclusive()
            .map_err(|_| RunError::Locked { path: lock_path })?;
        Ok(file)
    })
    .await?
}

pub struct Orchestrator<'a> {
    api: &'a dyn ProviderApi,
    media: Arc<dyn MediaSource>,
    prompt: Arc<dyn VerifierPrompt>,
    consumer: ConsumerKeys,
    options: BackupOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        api: &'a dyn ProviderApi,
        media: Arc<dyn MediaSource>,
        prompt: Arc<dyn VerifierPrompt>,
        consumer: ConsumerKeys,
        options: BackupOptions,
    ) -> Self {
        Self {
            api,
            media,
            prompt,
            consumer,
            options,
        }
    }

    /// Run one backup pass. Per-task failures are counted in the summary;
    /// only authorization, listing and ledger problems return `Err`.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, RunError> {
        let started = Instant::now();
        let dir = self.options.directory.as_path();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| RunError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
        let _lock = acquire_lock(dir).await?;

        let ledger = ResumeLedger::load(&ResumeLedger::path_in(dir)).await?;
        ledger.compact().await?;
        tracing::info!(
            "Backing up to {} ({} tasks already recorded in {})",
            dir.display(),
            ledger.len().await,
            ledger.path().display()
        );

        let base = SessionContext::unauthenticated(self.consumer.clone());
        let store = CredentialStore::new(&self.options.token_file);
        let auth_opts = AuthOptions {
            force_reauth: self.options.force_reauth,
            verifier_timeout: self.options.verifier_timeout,
            validation_retry: self.options.listing_retry,
        };
        let credential =
            auth::resolve_credential(&store, self.api, &base, Arc::clone(&self.prompt), &auth_opts)
                .await?;
        let ctx = base.with_access(credential.access());

        let enumerator = CollectionEnumerator::new(self.api, &ctx, self.options.listing_retry);
        let catalog = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Interrupted while listing collections");
                return Ok(RunSummary {
                    interrupted: true,
                    ..RunSummary::default()
                });
            }
            listed = enumerator.enumerate() => listed?,
        };

        let plan = DownloadPlanner::new(self.api, &ctx, &ledger, dir, self.options.listing_retry)
            .plan(&catalog, cancel)
            .await;
        let mut summary = RunSummary {
            planned: plan.tasks.len() + plan.resumed.len() + plan.skipped.len() + plan.failed.len(),
            skipped: plan.skipped.len(),
            failed: plan.failed.len(),
            resumed: plan.resumed.len(),
            interrupted: plan.interrupted,
            ..RunSummary::default()
        };

        let worker = TransferWorker::new(
            Arc::clone(&self.media),
            Arc::new(Throttle::new(DEFAULT_THROTTLE_PAUSE)),
            self.options.retry_delay,
            self.options.idle_timeout,
            cancel.clone(),
        );
        let config = DownloadConfig {
            directory: dir.to_path_buf(),
            workers: self.options.workers,
            no_progress_bar: self.options.no_progress_bar,
        };
        let report = download::run_tasks(plan.tasks, &worker, &ledger, &config, cancel).await;

        summary.completed = report.completed;
        summary.completed_with_warning = report.completed_with_warning;
        summary.skipped += report.skipped;
        summary.failed += report.failed;
        summary.resumed += report.already_done;
        summary.not_started = report.not_started;
        summary.interrupted |= cancel.is_cancelled();
        if let Err(e) = ledger.compact().await {
            // every entry is already durable in the journal
            tracing::warn!("Could not compact ledger: {}", e);
        }
        summary.log(started.elapsed());
        Ok(summary)
    }
}
