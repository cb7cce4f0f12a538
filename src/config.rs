use std::path::PathBuf;
use std::time::Duration;

use crate::backup::BackupOptions;
use crate::provider::ConsumerKeys;
use crate::retry::RetryConfig;

/// Timeout for provider REST calls.
pub const API_TIMEOUT: Duration = Duration::from_secs(30);
/// Connect timeout for media downloads.
pub const MEDIA_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// A media body that delivers nothing for this long is treated as reset.
const TRANSFER_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Resolved configuration for a backup run.
pub struct Config {
    pub api_key: String,
    pub api_secret: String,
    pub directory: PathBuf,
    pub token_file: PathBuf,

    pub retry_delay_secs: u64,
    pub auth_timeout_secs: u64,
    pub workers: usize,
    pub max_listing_retries: u32,

    pub force_reauth: bool,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("directory", &self.directory)
            .field("token_file", &self.token_file)
            .field("workers", &self.workers)
            .field("force_reauth", &self.force_reauth)
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn required(value: Option<String>, what: &str, hint: &str) -> anyhow::Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => anyhow::bail!("Missing {what}: pass {hint}"),
    }
}

impl Config {
    pub fn from_cli(cli: crate::cli::BackupArgs) -> anyhow::Result<Self> {
        let api_key = required(cli.key, "API key", "--key or set FLICKR_API_KEY")?;
        let api_secret = required(cli.secret, "API secret", "--secret or set FLICKR_API_SECRET")?;
        if cli.workers == 0 {
            anyhow::bail!("--workers must be at least 1");
        }
        if cli.auth_timeout == 0 {
            anyhow::bail!("--auth-timeout must be at least 1 second");
        }

        Ok(Self {
            api_key,
            api_secret,
            directory: expand_tilde(&cli.dir),
            token_file: expand_tilde(&cli.token_file),
            retry_delay_secs: cli.retry_delay,
            auth_timeout_secs: cli.auth_timeout,
            workers: cli.workers,
            max_listing_retries: cli.max_listing_retries,
            force_reauth: cli.reauth,
            no_progress_bar: cli.no_progress_bar,
        })
    }

    pub fn consumer(&self) -> ConsumerKeys {
        ConsumerKeys {
            key: self.api_key.clone(),
            secret: self.api_secret.clone(),
        }
    }

    pub fn backup_options(&self) -> BackupOptions {
        BackupOptions {
            directory: self.directory.clone(),
            token_file: self.token_file.clone(),
            force_reauth: self.force_reauth,
            workers: self.workers,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            idle_timeout: TRANSFER_IDLE_TIMEOUT,
            verifier_timeout: Duration::from_secs(self.auth_timeout_secs),
            listing_retry: RetryConfig {
                max_retries: self.max_listing_retries,
                ..RetryConfig::default()
            },
            no_progress_bar: self.no_progress_bar,
        }
    }
}
