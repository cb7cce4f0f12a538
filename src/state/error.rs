//! Error types for the resume ledger.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// The ledger file exists but is not a valid ledger. Never treated as
    /// empty: the operator decides whether to discard it.
    #[error("Ledger {path} is corrupt: {source}. Move it aside to start over")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A key in an otherwise well-formed ledger is not `<assetId>:<albumContext>`.
    #[error("Ledger {path} has malformed key {key:?}")]
    MalformedKey { path: PathBuf, key: String },

    #[error("Failed to read or write ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize ledger: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),
}
