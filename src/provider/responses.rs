//! Serde shapes for Flickr REST payloads and their mapping into the typed
//! records in [`super::types`]. Nothing outside this module sees raw JSON.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};

use super::types::{AlbumSummary, Asset, MediaType, Page};

/// Size labels that count as the original-quality source, by media type.
const PHOTO_ORIGINAL_LABEL: &str = "Original";
const VIDEO_ORIGINAL_LABELS: &[&str] = &["Video Original", "Original"];

const DATE_TAKEN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Flickr reports page counters as numbers in some methods and strings in
/// others.
fn flexible_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u64),
        Str(String),
    }

    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => u32::try_from(n).map_err(serde::de::Error::custom),
        NumOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn default_one() -> u32 {
    1
}

/// `stat`/`code`/`message` header present on every response.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub stat: String,
    #[serde(default)]
    pub code: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `{"_content": "..."}` wrapper used for most text fields.
#[derive(Debug, Default, Deserialize)]
pub struct Content {
    #[serde(rename = "_content", default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub user: LoginUser,
}

#[derive(Debug, Deserialize)]
pub struct LoginUser {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct PhotosetsListResponse {
    pub photosets: PhotosetsList,
}

#[derive(Debug, Deserialize)]
pub struct PhotosetsList {
    #[serde(deserialize_with = "flexible_u32", default = "default_one")]
    pub page: u32,
    #[serde(deserialize_with = "flexible_u32", default = "default_one")]
    pub pages: u32,
    #[serde(default)]
    pub photoset: Vec<PhotosetEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PhotosetEntry {
    pub id: String,
    #[serde(default)]
    pub title: Content,
}

#[derive(Debug, Deserialize)]
pub struct PhotosetPhotosResponse {
    pub photoset: PhotoListing,
}

#[derive(Debug, Deserialize)]
pub struct PeoplePhotosResponse {
    pub photos: PhotoListing,
}

/// Shared page body of `photosets.getPhotos` and `people.getPhotos`.
#[derive(Debug, Deserialize)]
pub struct PhotoListing {
    #[serde(deserialize_with = "flexible_u32", default = "default_one")]
    pub page: u32,
    #[serde(deserialize_with = "flexible_u32", default = "default_one")]
    pub pages: u32,
    #[serde(default)]
    pub photo: Vec<PhotoRef>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct PhotoInfoResponse {
    pub photo: PhotoInfo,
}

#[derive(Debug, Deserialize)]
pub struct PhotoInfo {
    pub id: String,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub originalformat: Option<String>,
    #[serde(default)]
    pub dateuploaded: Option<String>,
    #[serde(default)]
    pub title: Content,
    #[serde(default)]
    pub description: Content,
    #[serde(default)]
    pub dates: Option<PhotoDates>,
    #[serde(default)]
    pub tags: Option<PhotoTags>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoDates {
    #[serde(default)]
    pub taken: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoTags {
    #[serde(default)]
    pub tag: Vec<PhotoTag>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoTag {
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(rename = "_content", default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SizesResponse {
    pub sizes: Sizes,
}

#[derive(Debug, Deserialize)]
pub struct Sizes {
    #[serde(default)]
    pub size: Vec<SizeEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SizeEntry {
    pub label: String,
    pub source: String,
}

impl PhotosetsList {
    pub fn into_page(self) -> Page<AlbumSummary> {
        Page {
            items: self
                .photoset
                .into_iter()
                .map(|p| AlbumSummary {
                    album_id: p.id,
                    title: p.title.content,
                })
                .collect(),
            page: self.page,
            pages: self.pages,
        }
    }
}

impl PhotoListing {
    pub fn into_page(self) -> Page<String> {
        Page {
            items: self.photo.into_iter().map(|p| p.id).collect(),
            page: self.page,
            pages: self.pages,
        }
    }
}

impl Sizes {
    /// Original-quality source for the media type, if the account exposes one.
    pub fn original_source(&self, media_type: MediaType) -> Option<String> {
        let labels: &[&str] = match media_type {
            MediaType::Photo => &[PHOTO_ORIGINAL_LABEL],
            MediaType::Video => VIDEO_ORIGINAL_LABELS,
        };
        labels.iter().find_map(|label| {
            self.size
                .iter()
                .find(|s| s.label == *label && !s.source.is_empty())
                .map(|s| s.source.clone())
        })
    }
}

impl PhotoInfo {
    /// Map to an [`Asset`], resolving the source URL from `sizes`.
    pub fn into_asset(self, sizes: &Sizes) -> Asset {
        let media_type = MediaType::from_provider(self.media.as_deref().unwrap_or("photo"));
        let date_taken = self
            .dates
            .and_then(|d| d.taken)
            .and_then(|t| NaiveDateTime::parse_from_str(&t, DATE_TAKEN_FORMAT).ok());
        let date_uploaded = self.dateuploaded.and_then(|d| d.parse().ok());
        let tags = self
            .tags
            .map(|t| {
                t.tag
                    .into_iter()
                    .map(|tag| tag.raw.filter(|r| !r.is_empty()).unwrap_or(tag.content))
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Asset {
            source_url: sizes.original_source(media_type),
            asset_id: self.id,
            media_type,
            title: self.title.content,
            description: self.description.content,
            tags,
            date_taken,
            date_uploaded,
            original_format: self.originalformat.filter(|f| !f.is_empty()),
        }
    }
}
