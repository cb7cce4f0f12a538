//! Remote collection listing: albums with their ordered members, and the
//! synthetic "unsorted" collection of assets that belong to no album.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::future::Future;

use futures_util::stream::{self, Stream, TryStreamExt};
use thiserror::Error;

use crate::provider::{AlbumSummary, ApiError, Page, ProviderApi, SessionContext, PER_PAGE};
use crate::retry::{self, RetryConfig};

/// Ledger and summary label of the synthetic collection.
pub const UNSORTED: &str = "unsorted";

/// The collection a copy of an asset is downloaded under. Part of a task's
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlbumContext {
    Album(String),
    Unsorted,
}

impl fmt::Display for AlbumContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlbumContext::Album(id) => f.write_str(id),
            AlbumContext::Unsorted => f.write_str(UNSORTED),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub album_id: String,
    pub title: String,
    pub asset_ids: Vec<String>,
}

/// Snapshot of everything to back up this run.
#[derive(Debug, Default)]
pub struct Catalog {
    pub albums: Vec<Album>,
    /// Assets in no album, in the provider's global listing order.
    pub unsorted: Vec<String>,
}

#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("Listing {what} did not complete: {source}")]
    Failed {
        what: String,
        #[source]
        source: ApiError,
    },
}

struct AlbumCursor {
    next_page: u32,
    pending: VecDeque<AlbumSummary>,
    listing_done: bool,
    failed: bool,
}

pub struct CollectionEnumerator<'a> {
    api: &'a dyn ProviderApi,
    ctx: &'a SessionContext,
    retry: RetryConfig,
    per_page: u32,
}

impl<'a> CollectionEnumerator<'a> {
    pub fn new(api: &'a dyn ProviderApi, ctx: &'a SessionContext, retry: RetryConfig) -> Self {
        Self {
            api,
            ctx,
            retry,
            per_page: PER_PAGE,
        }
    }

    #[cfg(test)]
    pub fn with_page_size(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// One page, retried with backoff on throttle and server errors.
    async fn page<T, F, Fut>(&self, what: &str, fetch: F) -> Result<Page<T>, EnumerationError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Page<T>, ApiError>>,
    {
        retry::retry_with_backoff(
            &self.retry,
            what,
            ApiError::retry_action,
            fetch,
        )
        .await
        .map_err(|source| EnumerationError::Failed {
            what: what.to_string(),
            source,
        })
    }

    async fn all_ids<F, Fut>(&self, what: &str, fetch: F) -> Result<Vec<String>, EnumerationError>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<Page<String>, ApiError>>,
    {
        let mut ids = Vec::new();
        let mut page_no = 1;
        loop {
            let page = self.page(what, || fetch(page_no)).await?;
            let last = page.is_last(self.per_page);
            tracing::debug!(
                "{}: page {}/{} ({} items)",
                what,
                page.page,
                page.pages,
                page.items.len()
            );
            ids.extend(page.items);
            if last {
                return Ok(ids);
            }
            page_no += 1;
        }
    }

    /// Albums with their members, fetched page by page as the stream is
    /// polled. Ends after the first error.
    pub fn albums(&self) -> impl Stream<Item = Result<Album, EnumerationError>> + '_ {
        let cursor = AlbumCursor {
            next_page: 1,
            pending: VecDeque::new(),
            listing_done: false,
            failed: false,
        };

        stream::unfold(cursor, move |mut cur| async move {
            if cur.failed {
                return None;
            }
            while cur.pending.is_empty() && !cur.listing_done {
                let page_no = cur.next_page;
                let fetched = self
                    .page("album list", || {
                        self.api.albums_page(self.ctx, page_no, self.per_page)
                    })
                    .await;
                match fetched {
                    Ok(page) => {
                        cur.listing_done = page.is_last(self.per_page);
                        cur.next_page += 1;
                        cur.pending.extend(page.items);
                    }
                    Err(e) => {
                        cur.failed = true;
                        return Some((Err(e), cur));
                    }
                }
            }

            let summary = cur.pending.pop_front()?;
            let what = format!("album {}", summary.album_id);
            let members = self
                .all_ids(&what, |page_no| {
                    self.api
                        .album_assets_page(self.ctx, &summary.album_id, page_no, self.per_page)
                })
                .await;
            match members {
                Ok(asset_ids) => Some((
                    Ok(Album {
                        album_id: summary.album_id,
                        title: summary.title,
                        asset_ids,
                    }),
                    cur,
                )),
                Err(e) => {
                    cur.failed = true;
                    Some((Err(e), cur))
                }
            }
        })
    }

    /// Every asset id in the account, in provider order.
    pub async fn library(&self) -> Result<Vec<String>, EnumerationError> {
        self.all_ids("library", |page_no| {
            self.api.library_page(self.ctx, page_no, self.per_page)
        })
        .await
    }

    /// Drain the album stream, then derive the unsorted collection.
    pub async fn enumerate(&self) -> Result<Catalog, EnumerationError> {
        let albums: Vec<Album> = self
            .albums()
            .inspect_ok(|a| {
                tracing::info!("Album \"{}\": {} assets", a.title, a.asset_ids.len());
            })
            .try_collect()
            .await?;
        let library = self.library().await?;
        let unsorted = unsorted_assets(&library, &albums);
        tracing::info!(
            "Found {} albums, {} assets in library, {} in no album",
            albums.len(),
            library.len(),
            unsorted.len()
        );
        Ok(Catalog { albums, unsorted })
    }
}

/// `library` minus every album member, keeping library order and dropping
/// repeats.
pub fn unsorted_assets(library: &[String], albums: &[Album]) -> Vec<String> {
    let in_albums: HashSet<&str> = albums
        .iter()
        .flat_map(|a| a.asset_ids.iter().map(String::as_str))
        .collect();
    let mut seen = HashSet::new();
    library
        .iter()
        .filter(|id| !in_albums.contains(id.as_str()))
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}
