//! Durable record of completed download tasks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::error::LedgerError;
use super::types::{EntryStatus, LedgerEntry, LedgerSummary, TaskKey};
use crate::catalog::AlbumContext;

/// Ledger file name inside the backup directory.
pub const LEDGER_FILE_NAME: &str = ".backup_ledger.json";

const JOURNAL_SUFFIX: &str = ".journal";

/// One appended completion, as a line of the journal.
#[derive(Debug, Serialize, Deserialize)]
struct JournalLine {
    key: String,
    #[serde(flatten)]
    entry: LedgerEntry,
}

/// Set of completed task keys, persisted as one JSON object plus an
/// append-only journal beside it.
///
/// Every [`record`](Self::record) appends one line to the journal and
/// fsyncs it before returning, under a single lock, so concurrent workers
/// never interleave writes and a crash loses at most the tasks still in
/// flight. [`compact`](Self::compact) folds the journal back into the JSON
/// object.
pub struct ResumeLedger {
    path: PathBuf,
    journal: PathBuf,
    entries: Mutex<BTreeMap<String, LedgerEntry>>,
}

impl std::fmt::Debug for ResumeLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeLedger")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ResumeLedger {
    pub fn path_in(backup_dir: &Path) -> PathBuf {
        backup_dir.join(LEDGER_FILE_NAME)
    }

    pub fn journal_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(JOURNAL_SUFFIX);
        path.with_file_name(name)
    }

    /// Rebuild the ledger from disk: the JSON object, then any journal
    /// lines not yet compacted. A missing file is an empty ledger; a
    /// malformed one is [`LedgerError::Corrupt`].
    ///
    /// Loading never writes, so `status` can read a ledger while a backup
    /// is running.
    pub async fn load(path: &Path) -> Result<Self, LedgerError> {
        let mut entries = match read_optional(path).await? {
            Some(bytes) => parse(path, &bytes)?,
            None => BTreeMap::new(),
        };
        let journal = Self::journal_path(path);
        if let Some(bytes) = read_optional(&journal).await? {
            let replayed = replay(&journal, &bytes, &mut entries)?;
            tracing::debug!("Replayed {} journal entries from {}", replayed, journal.display());
        }
        tracing::debug!("Loaded {} ledger entries from {}", entries.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            journal,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn contains(&self, key: &TaskKey) -> bool {
        self.entries.lock().await.contains_key(&key.to_string())
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Durably record a terminal success. The entry is visible to
    /// [`contains`](Self::contains) only once it is on disk.
    ///
    /// Entries are never replaced: recording a key that is already present
    /// keeps the original entry.
    pub async fn record(
        &self,
        key: &TaskKey,
        status: EntryStatus,
        relative_path: Option<&Path>,
    ) -> Result<(), LedgerError> {
        let rendered = key.to_string();
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&rendered) {
            return Ok(());
        }

        let line = JournalLine {
            key: rendered,
            entry: LedgerEntry {
                status,
                completed_at: Utc::now(),
                path: relative_path.map(|p| p.to_string_lossy().into_owned()),
            },
        };
        let json = serde_json::to_vec(&line)?;
        let journal = self.journal.clone();
        tokio::task::spawn_blocking(move || crate::fs::append_durable(&journal, &json))
            .await?
            .map_err(|e| LedgerError::Io {
                path: self.journal.clone(),
                source: e,
            })?;

        tracing::debug!("Ledger: {} {}", line.key, status.as_str());
        entries.insert(line.key, line.entry);
        Ok(())
    }

    /// Rewrite the JSON object with every entry and drop the journal.
    ///
    /// Only call this while holding the backup-directory lock.
    pub async fn compact(&self) -> Result<(), LedgerError> {
        let entries = self.entries.lock().await;
        let json = serde_json::to_vec_pretty(&*entries)?;
        let path = self.path.clone();
        let journal = self.journal.clone();
        tokio::task::spawn_blocking(move || {
            crate::fs::write_atomic(&path, &json, false)?;
            match std::fs::remove_file(&journal) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => crate::fs::sync_parent_dir(&journal),
            }
        })
        .await?
        .map_err(|e| LedgerError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        tracing::debug!("Compacted {} ledger entries into {}", entries.len(), self.path.display());
        Ok(())
    }

    /// Snapshot of all entries with parsed keys, in key order.
    pub async fn entries(&self) -> Vec<(TaskKey, LedgerEntry)> {
        self.entries
            .lock()
            .await
            .iter()
            .filter_map(|(k, v)| TaskKey::parse(k).map(|key| (key, v.clone())))
            .collect()
    }

    pub async fn summary(&self) -> LedgerSummary {
        let entries = self.entries().await;
        let mut summary = LedgerSummary {
            total: entries.len(),
            ..LedgerSummary::default()
        };
        let mut albums = std::collections::HashSet::new();
        for (key, entry) in &entries {
            match entry.status {
                EntryStatus::Completed => summary.completed += 1,
                EntryStatus::CompletedWithWarning => summary.completed_with_warning += 1,
            }
            match &key.context {
                AlbumContext::Album(id) => {
                    albums.insert(id.clone());
                }
                AlbumContext::Unsorted => summary.unsorted += 1,
            }
            summary.last_completed_at = summary.last_completed_at.max(Some(entry.completed_at));
        }
        summary.albums = albums.len();
        summary
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, LedgerError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LedgerError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Merge journal lines into `entries`, keeping the first entry per key.
///
/// A final line without its newline was never acknowledged and is dropped;
/// any other bad line is corruption.
fn replay(
    journal: &Path,
    bytes: &[u8],
    entries: &mut BTreeMap<String, LedgerEntry>,
) -> Result<usize, LedgerError> {
    let complete = bytes.ends_with(b"\n");
    let lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
    let last = lines.len().saturating_sub(1);
    let mut replayed = 0;
    for (i, line) in lines.into_iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let parsed: JournalLine = match serde_json::from_slice(line) {
            Ok(parsed) => parsed,
            Err(_) if i == last && !complete => {
                tracing::warn!("Ignoring torn final line in {}", journal.display());
                break;
            }
            Err(e) => {
                return Err(LedgerError::Corrupt {
                    path: journal.to_path_buf(),
                    source: e,
                })
            }
        };
        if TaskKey::parse(&parsed.key).is_none() {
            return Err(LedgerError::MalformedKey {
                path: journal.to_path_buf(),
                key: parsed.key,
            });
        }
        entries.entry(parsed.key).or_insert(parsed.entry);
        replayed += 1;
    }
    Ok(replayed)
}

fn parse(path: &Path, bytes: &[u8]) -> Result<BTreeMap<String, LedgerEntry>, LedgerError> {
    let entries: BTreeMap<String, LedgerEntry> =
        serde_json::from_slice(bytes).map_err(|e| LedgerError::Corrupt {
            path: path.to_path_buf(),
            source: e,
        })?;
    if let Some(bad) = entries.keys().find(|k| TaskKey::parse(k).is_none()) {
        return Err(LedgerError::MalformedKey {
            path: path.to_path_buf(),
            key: bad.clone(),
        });
    }
    Ok(entries)
}
