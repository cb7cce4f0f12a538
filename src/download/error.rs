use std::path::PathBuf;

use thiserror::Error;

use crate::state::LedgerError;

/// Failure opening or reading a media stream.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {status}")]
    Status {
        status: u16,
        retry_after_secs: Option<u64>,
    },

    /// Connection reset, timeout, or a body that stopped mid-stream.
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    pub(crate) fn transport(e: impl std::fmt::Display) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Per-task download errors, classified for the single retry.
///
/// Transient: server errors, throttling, transport failures and short
/// bodies. Everything else fails the task on the first attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("size mismatch: expected {expected} bytes, received {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("asset detail unavailable: {0}")]
    Detail(String),

    #[error("could not record completion: {0}")]
    Ledger(#[from] LedgerError),

    #[error("interrupted before retry: {0}")]
    Interrupted(Box<DownloadError>),
}

impl DownloadError {
    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Whether a second attempt could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DownloadError::Fetch(FetchError::Status { status, .. }) => {
                *status == 429 || *status >= 500
            }
            DownloadError::Fetch(FetchError::Transport(_)) => true,
            DownloadError::SizeMismatch { .. } => true,
            DownloadError::Filesystem { .. }
            | DownloadError::Detail(_)
            | DownloadError::Ledger(_)
            | DownloadError::Interrupted(_) => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            DownloadError::Fetch(FetchError::Status { status: 429, .. })
        )
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            DownloadError::Fetch(FetchError::Status {
                retry_after_secs, ..
            }) => *retry_after_secs,
            _ => None,
        }
    }
}
