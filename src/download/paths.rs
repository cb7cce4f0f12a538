use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::catalog::Album;
use crate::provider::{Asset, MediaType};

/// Folder holding assets that belong to no album.
pub const UNSORTED_FOLDER: &str = "Unsorted";

const PART_SUFFIX: &str = ".part";
const SIDECAR_SUFFIX: &str = ".json";

/// Album title reduced to characters safe on every common filesystem:
/// ASCII and Unicode alphanumerics, space, `-` and `_`.
pub fn sanitize_folder_name(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Remove characters that are invalid in file names: `/`, `\`, `:`, `*`,
/// `?`, `"`, `<`, `>`, `|`.
pub fn clean_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

/// Assigns each album a folder name unique within the run.
///
/// Comparison is case-insensitive so names stay distinct on case-folding
/// filesystems. The unsorted folder is reserved up front.
pub struct FolderNamer {
    used: HashSet<String>,
}

impl Default for FolderNamer {
    fn default() -> Self {
        Self::new()
    }
}

impl FolderNamer {
    pub fn new() -> Self {
        let mut used = HashSet::new();
        used.insert(UNSORTED_FOLDER.to_lowercase());
        Self { used }
    }

    pub fn folder_for(&mut self, album: &Album) -> String {
        let base = sanitize_folder_name(&album.title);
        let id = clean_filename(&album.album_id);
        let mut candidate = if base.is_empty() { id.clone() } else { base.clone() };
        if self.used.contains(&candidate.to_lowercase()) {
            candidate = if base.is_empty() {
                format!("album_{id}")
            } else {
                format!("{base}_{id}")
            };
            tracing::debug!(
                "Album \"{}\" folder name taken, using \"{}\"",
                album.title,
                candidate
            );
        }
        self.used.insert(candidate.to_lowercase());
        candidate
    }
}

/// Still-image formats the provider may declare as an original format.
const IMAGE_FORMATS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "tif", "tiff", "heic", "bmp"];

/// Lowercase file extension for the asset's original.
///
/// Uses the provider's declared original format, then the source URL's
/// extension, then a media-type default. A video's declared format
/// describes its poster frame, so image formats are ignored for videos.
pub fn extension_for(asset: &Asset) -> String {
    let valid = |ext: &str| {
        !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
    };
    let fits_media = |ext: &str| {
        asset.media_type == MediaType::Photo
            || !IMAGE_FORMATS.contains(&ext.to_ascii_lowercase().as_str())
    };

    if let Some(format) = asset
        .original_format
        .as_deref()
        .filter(|f| valid(f) && fits_media(f))
    {
        return format.to_ascii_lowercase();
    }
    if let Some(ext) = asset
        .source_url
        .as_deref()
        .and_then(url_extension)
        .filter(|e| valid(e) && fits_media(e))
    {
        return ext.to_ascii_lowercase();
    }
    match asset.media_type {
        MediaType::Photo => "jpg".into(),
        MediaType::Video => "mp4".into(),
    }
}

fn url_extension(source: &str) -> Option<String> {
    let parsed = url::Url::parse(source).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    Some(ext.to_string())
}

/// `<backup>/<folder>/<assetId>.<ext>`
pub fn destination_path(backup_dir: &Path, folder: &str, asset_id: &str, ext: &str) -> PathBuf {
    backup_dir
        .join(folder)
        .join(format!("{}.{}", clean_filename(asset_id), ext))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// In-progress download, next to the destination so the final rename
/// never crosses filesystems.
pub fn part_path(destination: &Path) -> PathBuf {
    with_suffix(destination, PART_SUFFIX)
}

/// `<destination filename>.json`
pub fn sidecar_path(destination: &Path) -> PathBuf {
    with_suffix(destination, SIDECAR_SUFFIX)
}

/// `path` relative to `base` when it lies beneath it.
pub fn relative_to<'p>(base: &Path, path: &'p Path) -> &'p Path {
    path.strip_prefix(base).unwrap_or(path)
}
