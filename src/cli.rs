use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "flickr-backup",
    version,
    about = "Back up a Flickr photo library with its album structure and metadata",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments for `backup` when no subcommand is given
    #[command(flatten)]
    pub backup: BackupArgs,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

impl Cli {
    /// The subcommand to run; `backup` when none was given.
    pub fn effective_command(self) -> Command {
        self.command.unwrap_or(Command::Backup(self.backup))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download everything not yet backed up (default)
    Backup(BackupArgs),
    /// Summarise the resume ledger of a backup directory
    Status(LedgerArgs),
    /// Check that every recorded file and sidecar still exists
    Verify(LedgerArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BackupArgs {
    /// Flickr API key
    #[arg(short = 'k', long, env = "FLICKR_API_KEY")]
    pub key: Option<String>,

    /// Flickr API secret.
    /// Prefer the FLICKR_API_SECRET environment variable; arguments are
    /// visible in process listings.
    #[arg(short = 's', long, env = "FLICKR_API_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Backup directory
    #[arg(short = 'd', long, default_value = "./flickr_backup")]
    pub dir: String,

    /// Where the access token is stored
    #[arg(short = 't', long, default_value = "~/.flickr_backup_tokens.json")]
    pub token_file: String,

    /// Ignore the stored access token and authorize again
    #[arg(long)]
    pub reauth: bool,

    /// Parallel transfers
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Seconds to wait before the single transfer retry
    #[arg(long, default_value_t = 2)]
    pub retry_delay: u64,

    /// Backoff retries for a failing listing or detail call
    #[arg(long, default_value_t = 4)]
    pub max_listing_retries: u32,

    /// Seconds to wait for the verification code during authorization
    #[arg(long, default_value_t = 600)]
    pub auth_timeout: u64,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    /// Backup directory
    #[arg(short = 'd', long, default_value = "./flickr_backup")]
    pub dir: String,
}
