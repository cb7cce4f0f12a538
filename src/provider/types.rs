use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Kind of media an asset holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
}

impl MediaType {
    pub fn from_provider(media: &str) -> Self {
        if media.eq_ignore_ascii_case("video") {
            Self::Video
        } else {
            Self::Photo
        }
    }
}

/// Per-asset detail, mapped from the provider's payload on receipt.
///
/// `source_url` is `None` when no eligible quality tier exists for the
/// asset; such assets are skipped rather than downloaded at lower quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub asset_id: String,
    pub media_type: MediaType,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub date_taken: Option<NaiveDateTime>,
    pub date_uploaded: Option<i64>,
    pub original_format: Option<String>,
    pub source_url: Option<String>,
}

/// Album as listed by the provider, before its members are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumSummary {
    pub album_id: String,
    pub title: String,
}

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub pages: u32,
}

impl<T> Page<T> {
    /// Whether this page ends the listing for the requested page size.
    pub fn is_last(&self, per_page: u32) -> bool {
        self.items.len() < per_page as usize || self.page >= self.pages
    }
}
