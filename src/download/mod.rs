//! Download engine: plans tasks up front, then drains them through a
//! bounded pool where each task is transferred, finished with metadata and
//! recorded in the ledger before it counts as done.

pub mod error;
pub mod exif;
pub mod file;
pub mod metadata;
pub mod paths;
pub mod plan;
pub mod throttle;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use self::error::DownloadError;
use self::file::{TransferOutcome, TransferWorker};
use self::metadata::MetadataCommitter;
use self::plan::{DownloadTask, SkipReason};
use crate::state::{EntryStatus, ResumeLedger, TaskKey};

/// Subset of application config consumed by the download engine.
/// Decoupled from CLI parsing so the engine can be tested independently.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub(crate) directory: PathBuf,
    pub(crate) workers: usize,
    pub(crate) no_progress_bar: bool,
}

/// Terminal outcome of one dispatched task.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed,
    CompletedWithWarning,
    /// Recorded by an earlier task or run after planning.
    AlreadyDone,
    Skipped(SkipReason),
    Failed(DownloadError),
    /// Dispatched, but cancelled before its first attempt.
    NotStarted,
}

/// Counts from one pass over the task list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolReport {
    pub completed: usize,
    pub completed_with_warning: usize,
    pub already_done: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Never started because the run was interrupted.
    pub not_started: usize,
}

impl PoolReport {
    fn add(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => self.completed += 1,
            TaskOutcome::CompletedWithWarning => self.completed_with_warning += 1,
            TaskOutcome::AlreadyDone => self.already_done += 1,
            TaskOutcome::Skipped(_) => self.skipped += 1,
            TaskOutcome::Failed(_) => self.failed += 1,
            TaskOutcome::NotStarted => self.not_started += 1,
        }
    }
}

/// Create a progress bar with a consistent template.
///
/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar` or
/// stdout is not a TTY (e.g. piped output, cron jobs).
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    match ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        Ok(style) => pb.set_style(style.progress_chars("=> ")),
        Err(e) => tracing::debug!("Default progress style kept: {}", e),
    }
    pb
}

/// Run every task through the pool with at most `config.workers` in
/// flight. Once `cancel` fires no further task starts; tasks already
/// running finish their current attempt.
pub async fn run_tasks(
    tasks: Vec<DownloadTask>,
    worker: &TransferWorker,
    ledger: &ResumeLedger,
    config: &DownloadConfig,
    cancel: &CancellationToken,
) -> PoolReport {
    let total = tasks.len();
    let pb = create_progress_bar(config.no_progress_bar, total as u64);
    let committer = MetadataCommitter::new();

    let outcomes: Vec<(TaskKey, TaskOutcome)> = stream::iter(tasks)
        .take_while(|_| std::future::ready(!cancel.is_cancelled()))
        .map(|task| {
            let pb = &pb;
            let committer = &committer;
            async move {
                let outcome = run_one(&task, worker, committer, ledger, &config.directory).await;
                pb.suspend(|| log_outcome(&task, &outcome));
                pb.inc(1);
                (task.key, outcome)
            }
        })
        .buffer_unordered(config.workers.max(1))
        .collect()
        .await;
    pb.finish_and_clear();

    let mut report = PoolReport {
        not_started: total - outcomes.len(),
        ..PoolReport::default()
    };
    for (_, outcome) in &outcomes {
        report.add(outcome);
    }
    if report.not_started > 0 {
        tracing::info!("Interrupted: {} transfers not started", report.not_started);
    }
    report
}

async fn run_one(
    task: &DownloadTask,
    worker: &TransferWorker,
    committer: &MetadataCommitter,
    ledger: &ResumeLedger,
    backup_dir: &Path,
) -> TaskOutcome {
    if ledger.contains(&task.key).await {
        return TaskOutcome::AlreadyDone;
    }

    let committed = match worker.execute(task).await {
        TransferOutcome::Committed(path) => path,
        TransferOutcome::Skipped(reason) => return TaskOutcome::Skipped(reason),
        TransferOutcome::Failed(e) => return TaskOutcome::Failed(e),
        TransferOutcome::NotStarted => return TaskOutcome::NotStarted,
    };
    let status = match committer.commit(task, &committed).await {
        Ok(status) => status,
        Err(e) => return TaskOutcome::Failed(e),
    };

    let relative = paths::relative_to(backup_dir, &committed);
    match ledger.record(&task.key, status, Some(relative)).await {
        Ok(()) => match status {
            EntryStatus::Completed => TaskOutcome::Completed,
            EntryStatus::CompletedWithWarning => TaskOutcome::CompletedWithWarning,
        },
        Err(e) => TaskOutcome::Failed(e.into()),
    }
}

fn log_outcome(task: &DownloadTask, outcome: &TaskOutcome) {
    let path = task.destination.display();
    match outcome {
        TaskOutcome::Completed => tracing::info!("{}: completed {}", task.key, path),
        TaskOutcome::CompletedWithWarning => {
            tracing::warn!("{}: completed with warning {}", task.key, path)
        }
        TaskOutcome::AlreadyDone => tracing::debug!("{}: already recorded", task.key),
        TaskOutcome::Skipped(reason) => tracing::warn!("{}: skipped: {}", task.key, reason),
        TaskOutcome::Failed(e) => tracing::error!("{}: failed: {}", task.key, e),
        TaskOutcome::NotStarted => tracing::debug!("{}: not started", task.key),
    }
}

pub(crate) fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
