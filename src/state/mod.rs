//! Resume state for a backup directory.
//!
//! The ledger is the only source of truth for "already done": a task whose
//! key is recorded is never transferred again from the same backup
//! directory. It enables:
//! - Idempotent re-runs (no network work for recorded tasks)
//! - Crash safety (each completion is flushed before it counts)
//! - `status` and `verify` reporting

pub mod error;
pub mod ledger;
pub mod types;

pub use error::LedgerError;
pub use ledger::ResumeLedger;
pub use types::{EntryStatus, TaskKey};
