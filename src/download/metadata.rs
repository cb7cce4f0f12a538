//! Post-commit metadata: embedded EXIF for still images, a JSON sidecar for
//! every asset, and the file's modification time.

use std::fs::FileTimes;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use super::error::DownloadError;
use super::exif::{self, EmbedFields};
use super::paths;
use super::plan::DownloadTask;
use crate::provider::{Asset, MediaType};
use crate::state::EntryStatus;

/// Sidecar descriptor: the full fetched asset record plus where this copy
/// was filed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Sidecar<'a> {
    #[serde(flatten)]
    asset: &'a Asset,
    album_context: String,
    album_title: Option<&'a str>,
    committed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MetadataCommitter;

impl MetadataCommitter {
    pub fn new() -> Self {
        Self
    }

    /// Finish a committed file. Returns the status to record.
    ///
    /// An embedding failure downgrades the task to
    /// [`EntryStatus::CompletedWithWarning`]; only a sidecar that cannot be
    /// written fails it.
    pub async fn commit(
        &self,
        task: &DownloadTask,
        committed: &Path,
    ) -> Result<EntryStatus, DownloadError> {
        let mut status = EntryStatus::Completed;

        if task.asset.media_type == MediaType::Photo && exif::is_embeddable(committed) {
            let path = committed.to_path_buf();
            let fields = EmbedFields {
                title: task.asset.title.clone(),
                description: task.asset.description.clone(),
                tags: task.asset.tags.clone(),
                date_taken: task.asset.date_taken,
            };
            let embedded = tokio::task::spawn_blocking(move || exif::embed_metadata(&path, &fields))
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r.map_err(|e| e.to_string()));
            if let Err(reason) = embedded {
                tracing::warn!("{}: metadata not embedded: {}", task.key, reason);
                status = EntryStatus::CompletedWithWarning;
            }
        }

        let sidecar = Sidecar {
            asset: task.asset.as_ref(),
            album_context: task.key.context.to_string(),
            album_title: task.album_title.as_deref(),
            committed_at: Utc::now(),
        };
        let sidecar_path = paths::sidecar_path(committed);
        let json = serde_json::to_vec_pretty(&sidecar).map_err(|e| {
            DownloadError::fs(&sidecar_path, std::io::Error::other(e))
        })?;
        let target = sidecar_path.clone();
        tokio::task::spawn_blocking(move || crate::fs::write_atomic(&target, &json, false))
            .await
            .map_err(|e| DownloadError::fs(&sidecar_path, std::io::Error::other(e)))?
            .map_err(|e| DownloadError::fs(&sidecar_path, e))?;

        if let Some(ts) = capture_timestamp(&task.asset) {
            let path = committed.to_path_buf();
            let stamped = tokio::task::spawn_blocking(move || set_file_mtime(&path, ts)).await;
            match stamped {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!("Could not set mtime on {}: {}", committed.display(), e)
                }
                Err(e) => tracing::warn!("mtime task failed: {}", e),
            }
        }

        Ok(status)
    }
}

/// Capture time as a Unix timestamp: date taken (local wall clock), else the
/// upload time.
fn capture_timestamp(asset: &Asset) -> Option<i64> {
    asset
        .date_taken
        .and_then(|taken| taken.and_local_timezone(Local).earliest())
        .map(|dt| dt.timestamp())
        .or(asset.date_uploaded)
}

/// Set the modification and access times of a file to the given Unix
/// timestamp. Dates before 1970 are honoured where the platform allows and
/// otherwise clamp to the epoch.
fn set_file_mtime(path: &Path, timestamp: i64) -> std::io::Result<()> {
    let time = if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::from_secs(timestamp.unsigned_abs()))
            .unwrap_or(SystemTime::UNIX_EPOCH)
    };
    let times = FileTimes::new().set_modified(time).set_accessed(time);
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_times(times)?;
    Ok(())
}
