//! In-memory fakes for the provider, media and prompt seams.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use crate::auth::prompt::VerifierPrompt;
use crate::download::file::{FetchError, MediaSource, MediaStream};
use crate::provider::{
    AccessGrant, AccessToken, AlbumSummary, ApiError, Asset, ConsumerKeys, MediaType, Page,
    ProviderApi, SessionContext, TemporaryToken,
};

pub(crate) const ACCEPTED_VERIFIER: &str = "123-456-789";

pub(crate) fn consumer(key: &str) -> ConsumerKeys {
    ConsumerKeys {
        key: key.into(),
        secret: "consumer-secret".into(),
    }
}

pub(crate) fn photo(id: &str) -> Asset {
    Asset {
        asset_id: id.into(),
        media_type: MediaType::Photo,
        title: format!("Title {id}"),
        description: String::new(),
        tags: vec![],
        date_taken: None,
        date_uploaded: None,
        original_format: Some("jpg".into()),
        source_url: Some(format!("https://media.example/{id}.jpg")),
    }
}

fn page_of<T: Clone>(items: &[T], page: u32, per_page: u32) -> Page<T> {
    let per_page = per_page.max(1) as usize;
    let pages = items.len().div_ceil(per_page).max(1) as u32;
    let start = (page.saturating_sub(1) as usize * per_page).min(items.len());
    let end = (start + per_page).min(items.len());
    Page {
        items: items[start..end].to_vec(),
        page,
        pages,
    }
}

fn transient(method: &str) -> ApiError {
    ApiError::HttpStatus {
        status: 503,
        method: method.into(),
        retry_after_secs: None,
    }
}

/// Scriptable provider: a fixed library, albums and per-asset detail, plus
/// counters for the calls the engine makes.
pub(crate) struct FakeProvider {
    pub account_id: String,
    pub albums: Vec<(AlbumSummary, Vec<String>)>,
    pub library: Vec<String>,
    pub assets: HashMap<String, Asset>,
    pub reject_temporary: bool,
    pub fail_new_token_validation: bool,
    pub failing_details: HashSet<String>,
    pub valid_tokens: Mutex<HashSet<String>>,
    pub issued: AtomicU32,
    pub login_calls: AtomicU32,
    pub transient_login_failures: AtomicU32,
    pub transient_listing_failures: AtomicU32,
    /// Album-list pages answered with 429 and `Retry-After: 20`.
    pub throttled_listing_failures: AtomicU32,
    pub listing_calls: AtomicU32,
    pub detail_calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            account_id: "12345@N00".into(),
            albums: vec![],
            library: vec![],
            assets: HashMap::new(),
            reject_temporary: false,
            fail_new_token_validation: false,
            failing_details: HashSet::new(),
            valid_tokens: Mutex::new(HashSet::new()),
            issued: AtomicU32::new(0),
            login_calls: AtomicU32::new(0),
            transient_login_failures: AtomicU32::new(0),
            transient_listing_failures: AtomicU32::new(0),
            throttled_listing_failures: AtomicU32::new(0),
            listing_calls: AtomicU32::new(0),
            detail_calls: Mutex::new(vec![]),
        }
    }

    pub fn with_valid_token(self, token: &str) -> Self {
        self.valid_tokens.lock().unwrap().insert(token.to_string());
        self
    }

    /// Add an asset to the library (in insertion order) with its detail.
    pub fn with_asset(mut self, asset: Asset) -> Self {
        if !self.library.contains(&asset.asset_id) {
            self.library.push(asset.asset_id.clone());
        }
        self.assets.insert(asset.asset_id.clone(), asset);
        self
    }

    pub fn with_album(mut self, album_id: &str, title: &str, asset_ids: &[&str]) -> Self {
        self.albums.push((
            AlbumSummary {
                album_id: album_id.into(),
                title: title.into(),
            },
            asset_ids.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    pub fn is_valid_token(&self, token: &str) -> bool {
        self.valid_tokens.lock().unwrap().contains(token)
    }

    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }

    fn take_transient(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl ProviderApi for FakeProvider {
    async fn request_temporary_token(
        &self,
        ctx: &SessionContext,
    ) -> Result<TemporaryToken, ApiError> {
        assert!(ctx.access.is_none());
        if self.reject_temporary {
            return Err(ApiError::HttpStatus {
                status: 401,
                method: "request_token".into(),
                retry_after_secs: None,
            });
        }
        Ok(TemporaryToken {
            token: "temp-token".into(),
            secret: "temp-secret".into(),
        })
    }

    fn authorization_url(&self, temporary: &TemporaryToken) -> String {
        format!("https://auth.example/authorize?oauth_token={}", temporary.token)
    }

    async fn exchange_verifier(
        &self,
        _ctx: &SessionContext,
        temporary: &TemporaryToken,
        verifier: &str,
    ) -> Result<AccessGrant, ApiError> {
        if temporary.token != "temp-token" || verifier != ACCEPTED_VERIFIER {
            return Err(ApiError::OAuth("provider reported token_rejected".into()));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("access-{n}");
        if !self.fail_new_token_validation {
            self.valid_tokens.lock().unwrap().insert(token.clone());
        }
        Ok(AccessGrant {
            access: AccessToken {
                token,
                secret: format!("access-secret-{n}"),
            },
            account_id: self.account_id.clone(),
        })
    }

    async fn test_login(&self, ctx: &SessionContext) -> Result<String, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_transient(&self.transient_login_failures) {
            return Err(ApiError::Provider {
                method: "flickr.test.login".into(),
                code: 105,
                message: "Service currently unavailable".into(),
            });
        }
        match &ctx.access {
            Some(a) if self.is_valid_token(&a.token) => Ok(self.account_id.clone()),
            _ => Err(ApiError::Provider {
                method: "flickr.test.login".into(),
                code: 98,
                message: "Invalid auth token".into(),
            }),
        }
    }

    async fn albums_page(
        &self,
        ctx: &SessionContext,
        page: u32,
        per_page: u32,
    ) -> Result<Page<AlbumSummary>, ApiError> {
        assert!(ctx.access.is_some());
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_transient(&self.transient_listing_failures) {
            return Err(transient("flickr.photosets.getList"));
        }
        if Self::take_transient(&self.throttled_listing_failures) {
            return Err(ApiError::HttpStatus {
                status: 429,
                method: "flickr.photosets.getList".into(),
                retry_after_secs: Some(20),
            });
        }
        let summaries: Vec<AlbumSummary> = self.albums.iter().map(|(s, _)| s.clone()).collect();
        Ok(page_of(&summaries, page, per_page))
    }

    async fn album_assets_page(
        &self,
        _ctx: &SessionContext,
        album_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<String>, ApiError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_transient(&self.transient_listing_failures) {
            return Err(transient("flickr.photosets.getPhotos"));
        }
        let ids = self
            .albums
            .iter()
            .find(|(s, _)| s.album_id == album_id)
            .map(|(_, ids)| ids.clone())
            .ok_or_else(|| ApiError::Provider {
                method: "flickr.photosets.getPhotos".into(),
                code: 1,
                message: "Photoset not found".into(),
            })?;
        Ok(page_of(&ids, page, per_page))
    }

    async fn library_page(
        &self,
        _ctx: &SessionContext,
        page: u32,
        per_page: u32,
    ) -> Result<Page<String>, ApiError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_transient(&self.transient_listing_failures) {
            return Err(transient("flickr.people.getPhotos"));
        }
        Ok(page_of(&self.library, page, per_page))
    }

    async fn asset_detail(&self, _ctx: &SessionContext, asset_id: &str) -> Result<Asset, ApiError> {
        self.detail_calls.lock().unwrap().push(asset_id.to_string());
        if self.failing_details.contains(asset_id) {
            return Err(ApiError::Provider {
                method: "flickr.photos.getInfo".into(),
                code: 1,
                message: "Photo not found".into(),
            });
        }
        self.assets
            .get(asset_id)
            .cloned()
            .ok_or_else(|| ApiError::Provider {
                method: "flickr.photos.getInfo".into(),
                code: 1,
                message: "Photo not found".into(),
            })
    }
}

/// Scripted outcome of one media fetch.
#[derive(Clone)]
pub(crate) enum FakeFetch {
    Body(Vec<u8>),
    /// Declared length differs from the bytes actually delivered.
    Short { declared: u64, body: Vec<u8> },
    Status(u16),
    /// Stream that errors after delivering `partial`.
    Reset { partial: Vec<u8> },
}

/// Media source serving scripted responses per URL, in order; once a URL's
/// script is exhausted the last entry repeats.
#[derive(Default)]
pub(crate) struct FakeMedia {
    scripts: Mutex<HashMap<String, Vec<FakeFetch>>>,
    pub fetches: Mutex<Vec<String>>,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(self, url: &str, script: Vec<FakeFetch>) -> Self {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn fetches_of(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait::async_trait]
impl MediaSource for FakeMedia {
    async fn open(&self, url: &str) -> Result<MediaStream, FetchError> {
        self.fetches.lock().unwrap().push(url.to_string());
        let next = {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(url.to_string()).or_default();
            match script.len() {
                0 => FakeFetch::Body(format!("bytes of {url}").into_bytes()),
                1 => script[0].clone(),
                _ => script.remove(0),
            }
        };

        let chunks = |body: Vec<u8>| -> Vec<Result<Bytes, FetchError>> {
            body.chunks(7).map(|c| Ok(Bytes::copy_from_slice(c))).collect()
        };
        match next {
            FakeFetch::Body(body) => Ok(MediaStream {
                content_length: Some(body.len() as u64),
                body: Box::pin(futures_util::stream::iter(chunks(body))),
            }),
            FakeFetch::Short { declared, body } => Ok(MediaStream {
                content_length: Some(declared),
                body: Box::pin(futures_util::stream::iter(chunks(body))),
            }),
            FakeFetch::Status(status) => Err(FetchError::Status {
                status,
                retry_after_secs: None,
            }),
            FakeFetch::Reset { partial } => {
                let mut items = chunks(partial);
                items.push(Err(FetchError::Transport(
                    "connection reset by peer".into(),
                )));
                Ok(MediaStream {
                    content_length: None,
                    body: Box::pin(futures_util::stream::iter(items)),
                })
            }
        }
    }
}

enum PromptScript {
    Answer(String),
    Slow(String, Duration),
    Fail,
}

/// Verification-code source standing in for the user.
pub(crate) struct FakePrompt {
    script: PromptScript,
    calls: Arc<AtomicU32>,
}

impl FakePrompt {
    pub fn answer(code: &str) -> Self {
        Self {
            script: PromptScript::Answer(code.into()),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn slow(code: &str, delay: Duration) -> Self {
        Self {
            script: PromptScript::Slow(code.into(), delay),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            script: PromptScript::Fail,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

impl VerifierPrompt for FakePrompt {
    fn ask(&self, _authorization_url: &str) -> io::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            PromptScript::Answer(code) => Ok(code.clone()),
            PromptScript::Slow(code, delay) => {
                std::thread::sleep(*delay);
                Ok(code.clone())
            }
            PromptScript::Fail => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stdin is not a terminal",
            )),
        }
    }
}
