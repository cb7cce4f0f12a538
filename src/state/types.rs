//! Types for the resume ledger.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{AlbumContext, UNSORTED};

/// Identity of a download task: one asset under one album context.
///
/// Rendered as `<assetId>:<albumContext>` in the ledger file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub asset_id: String,
    pub context: AlbumContext,
}

impl TaskKey {
    pub fn new(asset_id: impl Into<String>, context: AlbumContext) -> Self {
        Self {
            asset_id: asset_id.into(),
            context,
        }
    }

    /// Parse the ledger rendering back into a key.
    pub fn parse(key: &str) -> Option<Self> {
        let (asset_id, context) = key.split_once(':')?;
        if asset_id.is_empty() || context.is_empty() {
            return None;
        }
        let context = if context == UNSORTED {
            AlbumContext::Unsorted
        } else {
            AlbumContext::Album(context.to_string())
        };
        Some(Self::new(asset_id, context))
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.asset_id, self.context)
    }
}

/// Terminal success status recorded for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Completed,
    /// Media committed, but embedding metadata into it failed.
    CompletedWithWarning,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompletedWithWarning => "completed_with_warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub status: EntryStatus,
    pub completed_at: DateTime<Utc>,
    /// Committed file, relative to the backup directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Counts over the whole ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub total: usize,
    pub completed: usize,
    pub completed_with_warning: usize,
    pub unsorted: usize,
    pub albums: usize,
    pub last_completed_at: Option<DateTime<Utc>>,
}
