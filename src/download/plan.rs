//! Expansion of the catalog into concrete download tasks.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::error::DownloadError;
use super::paths::{self, FolderNamer, UNSORTED_FOLDER};
use crate::catalog::{AlbumContext, Catalog};
use crate::provider::{ApiError, Asset, ProviderApi, SessionContext};
use crate::retry::{self, RetryConfig};
use crate::state::{ResumeLedger, TaskKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No original-quality source is available for the asset.
    NoSourceUrl,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoSourceUrl => f.write_str("no original-quality source URL"),
        }
    }
}

/// One asset copy to transfer into one album folder.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub key: TaskKey,
    /// Album title for the sidecar; `None` for the unsorted collection.
    pub album_title: Option<String>,
    pub destination: PathBuf,
    pub asset: Arc<Asset>,
}

/// Result of a planning pass.
#[derive(Debug, Default)]
pub struct Plan {
    pub tasks: Vec<DownloadTask>,
    /// Already in the ledger; no network work was done for these.
    pub resumed: Vec<TaskKey>,
    pub skipped: Vec<(TaskKey, SkipReason)>,
    pub failed: Vec<(TaskKey, DownloadError)>,
    /// Planning stopped early on operator interrupt.
    pub interrupted: bool,
}

struct Collection<'c> {
    context: AlbumContext,
    title: Option<&'c str>,
    folder: String,
    asset_ids: &'c [String],
}

pub struct DownloadPlanner<'a> {
    api: &'a dyn ProviderApi,
    ctx: &'a SessionContext,
    ledger: &'a ResumeLedger,
    backup_dir: &'a Path,
    retry: RetryConfig,
    /// Detail per asset id for this run; an asset in several albums is
    /// fetched once.
    cache: HashMap<String, Result<Arc<Asset>, String>>,
}

impl<'a> DownloadPlanner<'a> {
    pub fn new(
        api: &'a dyn ProviderApi,
        ctx: &'a SessionContext,
        ledger: &'a ResumeLedger,
        backup_dir: &'a Path,
        retry: RetryConfig,
    ) -> Self {
        Self {
            api,
            ctx,
            ledger,
            backup_dir,
            retry,
            cache: HashMap::new(),
        }
    }

    /// Plan every (album, asset) pair plus the unsorted collection.
    ///
    /// Within one collection a repeated asset id yields a single task; the
    /// same asset in two collections yields two.
    pub async fn plan(&mut self, catalog: &Catalog, cancel: &CancellationToken) -> Plan {
        let mut namer = FolderNamer::new();
        let mut collections: Vec<Collection<'_>> = catalog
            .albums
            .iter()
            .map(|album| Collection {
                context: AlbumContext::Album(album.album_id.clone()),
                title: Some(album.title.as_str()),
                folder: namer.folder_for(album),
                asset_ids: &album.asset_ids,
            })
            .collect();
        collections.push(Collection {
            context: AlbumContext::Unsorted,
            title: None,
            folder: UNSORTED_FOLDER.to_string(),
            asset_ids: &catalog.unsorted,
        });

        let mut plan = Plan::default();
        for collection in &collections {
            let mut seen = HashSet::new();
            for asset_id in collection.asset_ids {
                if cancel.is_cancelled() {
                    tracing::info!("Interrupted while planning");
                    plan.interrupted = true;
                    return plan;
                }
                if !seen.insert(asset_id.as_str()) {
                    tracing::debug!(
                        "Asset {} listed twice in {}, planning once",
                        asset_id,
                        collection.context
                    );
                    continue;
                }
                self.plan_one(collection, asset_id, &mut plan).await;
            }
        }

        tracing::info!(
            "Planned {} transfers ({} already done, {} skipped, {} failed)",
            plan.tasks.len(),
            plan.resumed.len(),
            plan.skipped.len(),
            plan.failed.len()
        );
        plan
    }

    async fn plan_one(&mut self, collection: &Collection<'_>, asset_id: &str, plan: &mut Plan) {
        let key = TaskKey::new(asset_id, collection.context.clone());
        if self.ledger.contains(&key).await {
            plan.resumed.push(key);
            return;
        }

        let asset = match self.detail(asset_id).await {
            Ok(asset) => asset,
            Err(reason) => {
                tracing::warn!("{}: failed: asset detail unavailable: {}", key, reason);
                plan.failed.push((key, DownloadError::Detail(reason)));
                return;
            }
        };
        if asset.source_url.is_none() {
            tracing::warn!("{}: skipped: {}", key, SkipReason::NoSourceUrl);
            plan.skipped.push((key, SkipReason::NoSourceUrl));
            return;
        }

        let ext = paths::extension_for(&asset);
        let destination =
            paths::destination_path(self.backup_dir, &collection.folder, asset_id, &ext);
        plan.tasks.push(DownloadTask {
            key,
            album_title: collection.title.map(str::to_string),
            destination,
            asset,
        });
    }

    async fn detail(&mut self, asset_id: &str) -> Result<Arc<Asset>, String> {
        if let Some(cached) = self.cache.get(asset_id) {
            return cached.clone();
        }
        let fetched = retry::retry_with_backoff(
            &self.retry,
            &format!("detail {asset_id}"),
            ApiError::retry_action,
            || self.api.asset_detail(self.ctx, asset_id),
        )
        .await
        .map(Arc::new)
        .map_err(|e| e.to_string());
        self.cache.insert(asset_id.to_string(), fetched.clone());
        fetched
    }
}
