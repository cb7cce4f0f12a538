//! Byte transfer: fetch a source into a `.part` file beside the destination,
//! then rename it into place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

pub use super::error::FetchError;
use super::error::DownloadError;
use super::paths;
use super::plan::{DownloadTask, SkipReason};
use super::throttle::Throttle;
use crate::provider::flickr::{retry_after, CLIENT_USER_AGENT};

/// An open media response: declared length plus the body as a chunk stream.
pub struct MediaStream {
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, FetchError>>,
}

/// Where asset bytes come from.
#[async_trait::async_trait]
pub trait MediaSource: Send + Sync {
    async fn open(&self, url: &str) -> Result<MediaStream, FetchError>;
}

#[async_trait::async_trait]
impl MediaSource for Client {
    async fn open(&self, url: &str) -> Result<MediaStream, FetchError> {
        let response = self.get(url).send().await.map_err(FetchError::transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                retry_after_secs: retry_after(response.headers()),
            });
        }
        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(FetchError::transport))
            .boxed();
        Ok(MediaStream {
            content_length,
            body,
        })
    }
}

/// HTTP client for media downloads.
///
/// Only connecting is bounded here; a large video may legitimately take
/// far longer than any fixed total timeout, so stalls are caught per chunk
/// by the worker instead.
pub fn media_client(connect_timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
    Client::builder()
        .default_headers(default_headers)
        .connect_timeout(connect_timeout)
        .build()
}

/// Which of the two permitted attempts is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Second,
}

impl Attempt {
    pub fn number(self) -> u8 {
        match self {
            Attempt::First => 1,
            Attempt::Second => 2,
        }
    }

    /// The attempt after this one, if any remains.
    pub fn next(self) -> Option<Attempt> {
        match self {
            Attempt::First => Some(Attempt::Second),
            Attempt::Second => None,
        }
    }
}

#[derive(Debug)]
pub enum TransferOutcome {
    Committed(PathBuf),
    Skipped(SkipReason),
    Failed(DownloadError),
    /// Cancelled while waiting out a throttle pause, before any attempt.
    NotStarted,
}

pub struct TransferWorker {
    source: Arc<dyn MediaSource>,
    throttle: Arc<Throttle>,
    retry_delay: Duration,
    idle_timeout: Duration,
    cancel: CancellationToken,
}

impl TransferWorker {
    pub fn new(
        source: Arc<dyn MediaSource>,
        throttle: Arc<Throttle>,
        retry_delay: Duration,
        idle_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            throttle,
            retry_delay,
            idle_timeout,
            cancel,
        }
    }

    /// Transfer one task, retrying exactly once after a transient failure.
    ///
    /// Nothing appears at the destination unless every byte arrived; a
    /// failed attempt leaves no `.part` file behind.
    pub async fn execute(&self, task: &DownloadTask) -> TransferOutcome {
        let Some(url) = task.asset.source_url.as_deref() else {
            return TransferOutcome::Skipped(SkipReason::NoSourceUrl);
        };
        let part = paths::part_path(&task.destination);
        let mut attempt = Attempt::First;
        let mut last_error: Option<DownloadError> = None;

        loop {
            if self.throttle.is_paused() {
                tracing::debug!(key = %task.key, "waiting out provider throttle");
            }
            tokio::select! {
                biased;
                _ = self.throttle.wait() => {}
                _ = self.cancel.cancelled() => {
                    return match last_error {
                        Some(error) => {
                            TransferOutcome::Failed(DownloadError::Interrupted(Box::new(error)))
                        }
                        None => TransferOutcome::NotStarted,
                    };
                }
            }
            tracing::debug!(
                key = %task.key,
                attempt = attempt.number(),
                path = %task.destination.display(),
                "downloading",
            );

            let error = match self.fetch_to_part(url, &part).await {
                Ok(_) => {
                    return match commit_part(&part, &task.destination).await {
                        Ok(()) => TransferOutcome::Committed(task.destination.clone()),
                        Err(e) => {
                            remove_part(&part).await;
                            TransferOutcome::Failed(e)
                        }
                    };
                }
                Err(e) => e,
            };
            remove_part(&part).await;

            if error.is_rate_limited() {
                self.throttle.pause(error.retry_after_secs());
            }
            let next = match attempt.next() {
                Some(next) if error.is_transient() => next,
                _ => return TransferOutcome::Failed(error),
            };
            if self.cancel.is_cancelled() {
                return TransferOutcome::Failed(DownloadError::Interrupted(Box::new(error)));
            }

            tracing::warn!(
                "{}: attempt {} failed, retrying in {}s: {}",
                task.key,
                attempt.number(),
                self.retry_delay.as_secs(),
                error
            );
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return TransferOutcome::Failed(DownloadError::Interrupted(Box::new(error)));
                }
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
            last_error = Some(error);
            attempt = next;
        }
    }

    /// Stream `url` into `part`, flushed to stable storage, and return the
    /// byte count. The body must match any declared length.
    pub(crate) async fn fetch_to_part(&self, url: &str, part: &Path) -> Result<u64, DownloadError> {
        if let Some(parent) = part.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::fs(parent, e))?;
        }

        let stalled =
            || FetchError::Transport(format!("no data for {}s", self.idle_timeout.as_secs()));
        let stream = tokio::time::timeout(self.idle_timeout, self.source.open(url))
            .await
            .map_err(|_| stalled())??;
        let expected = stream.content_length;
        let mut body = stream.body;

        let mut file = fs::File::create(part)
            .await
            .map_err(|e| DownloadError::fs(part, e))?;
        let mut written: u64 = 0;
        while let Some(chunk) = tokio::time::timeout(self.idle_timeout, body.next())
            .await
            .map_err(|_| stalled())?
        {
            let chunk = chunk.map_err(|e| {
                tracing::debug!(
                    "Body error for {} (content_length={:?}, bytes_so_far={}): {}",
                    url,
                    expected,
                    written,
                    e
                );
                e
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::fs(part, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| DownloadError::fs(part, e))?;
        file.sync_all().await.map_err(|e| DownloadError::fs(part, e))?;
        drop(file);

        match expected {
            Some(expected) if expected != written => Err(DownloadError::SizeMismatch {
                expected,
                actual: written,
            }),
            _ => Ok(written),
        }
    }
}

/// Move a complete `.part` file over the destination.
///
/// A file already at the destination is not in the ledger (the task would
/// not have been dispatched otherwise), so it is replaced.
pub(crate) async fn commit_part(part: &Path, destination: &Path) -> Result<(), DownloadError> {
    if fs::try_exists(destination).await.unwrap_or(false) {
        tracing::warn!(
            "Replacing unrecorded file at {}",
            destination.display()
        );
    }
    fs::rename(part, destination)
        .await
        .map_err(|e| DownloadError::fs(destination, e))
}

async fn remove_part(part: &Path) {
    if let Err(e) = fs::remove_file(part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!("Could not remove {}: {}", part.display(), e);
        }
    }
}
