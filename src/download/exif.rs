//! Embedded descriptive metadata for still images.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("{} is not a readable {format} image", path.display())]
    Unrecognized { path: PathBuf, format: String },

    #[error("metadata write failed on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fields written into the image.
#[derive(Debug, Clone, Default)]
pub struct EmbedFields {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub date_taken: Option<NaiveDateTime>,
}

fn format_of(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    matches!(ext.as_str(), "jpg" | "jpeg" | "png" | "webp" | "tif" | "tiff").then_some(ext)
}

/// Whether the file's format carries an embeddable metadata block.
pub fn is_embeddable(path: &Path) -> bool {
    format_of(path).is_some()
}

/// Check the container signature against the extension, so a damaged or
/// mislabelled file is rejected before anything is rewritten.
fn check_signature(path: &Path, format: &str) -> Result<(), EmbedError> {
    let mut head = [0u8; 12];
    let read = std::fs::File::open(path)
        .and_then(|mut f| f.read(&mut head))
        .map_err(|e| EmbedError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
    let head = &head[..read];
    let ok = match format {
        "jpg" | "jpeg" => head.starts_with(&[0xFF, 0xD8, 0xFF]),
        "png" => head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
        "webp" => head.len() == 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP",
        "tif" | "tiff" => head.starts_with(b"II*\0") || head.starts_with(b"MM\0*"),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(EmbedError::Unrecognized {
            path: path.to_path_buf(),
            format: format.to_string(),
        })
    }
}

/// Read the `DateTimeOriginal` EXIF tag from an image file.
///
/// Returns `Ok(None)` if the file has no EXIF data or the tag is missing,
/// and `Err` only on I/O failure.
pub fn get_photo_exif(path: &Path) -> std::io::Result<Option<String>> {
    let file = std::fs::File::open(path)?;
    let mut bufreader = std::io::BufReader::new(&file);
    let exif_reader = exif::Reader::new();

    match exif_reader.read_from_container(&mut bufreader) {
        Ok(exif_data) => Ok(exif_data
            .get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)
            .map(|field| field.display_value().to_string())),
        Err(e) => {
            tracing::debug!("No EXIF data in {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// EXIF `UserComment`: an 8-byte character-code header, then the text.
/// Non-ASCII text uses the undefined code with UTF-8 bytes.
fn user_comment(description: &str, tags: &[String]) -> Vec<u8> {
    let mut text = description.trim().to_string();
    if !tags.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str("Keywords: ");
        text.push_str(&tags.join(", "));
    }
    let mut out: Vec<u8> = if text.is_ascii() {
        b"ASCII\0\0\0".to_vec()
    } else {
        vec![0u8; 8]
    };
    out.extend_from_slice(text.as_bytes());
    out
}

/// Hidden sibling the rewrite happens on; keeps the extension so the
/// container type is still recognised.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staged = match name.rsplit_once('.') {
        Some((stem, ext)) => format!(".{stem}.embedding.{ext}"),
        None => format!(".{name}.embedding"),
    };
    path.with_file_name(staged)
}

/// Embed title, description, keywords and capture date into the image at
/// `path`.
///
/// The rewrite happens on a copy that replaces the original only once
/// complete, so a failure leaves the committed bytes untouched. An existing
/// `DateTimeOriginal` is kept.
pub fn embed_metadata(path: &Path, fields: &EmbedFields) -> Result<(), EmbedError> {
    use little_exif::exif_tag::ExifTag;
    use little_exif::metadata::Metadata;

    let format = format_of(path).ok_or_else(|| EmbedError::Unrecognized {
        path: path.to_path_buf(),
        format: "embeddable".into(),
    })?;
    check_signature(path, &format)?;
    let io_err = |source: std::io::Error| EmbedError::Io {
        path: path.to_path_buf(),
        source,
    };

    let existing_date = get_photo_exif(path).map_err(io_err)?;
    let staging = staging_path(path);
    std::fs::copy(path, &staging).map_err(io_err)?;

    let written = (|| -> std::io::Result<()> {
        let mut metadata = Metadata::new_from_path(&staging).unwrap_or_else(|e| {
            tracing::debug!("Starting fresh metadata for {}: {}", path.display(), e);
            Metadata::new()
        });
        if !fields.title.is_empty() {
            metadata.set_tag(ExifTag::ImageDescription(fields.title.clone()));
        }
        if !fields.description.trim().is_empty() || !fields.tags.is_empty() {
            metadata.set_tag(ExifTag::UserComment(user_comment(
                &fields.description,
                &fields.tags,
            )));
        }
        if existing_date.is_none() {
            if let Some(taken) = fields.date_taken {
                metadata.set_tag(ExifTag::DateTimeOriginal(
                    taken.format(EXIF_DATE_FORMAT).to_string(),
                ));
            }
        }
        metadata.write_to_file(&staging)?;
        std::fs::File::open(&staging)?.sync_all()?;
        std::fs::rename(&staging, path)
    })();

    if let Err(e) = written {
        let _ = std::fs::remove_file(&staging);
        return Err(io_err(e));
    }
    tracing::debug!("Embedded metadata in {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Smallest baseline JPEG: one 8x8 grey block, single-code Huffman
    /// tables, no metadata segments.
    fn tiny_jpeg() -> Vec<u8> {
        let mut one_code_table = vec![0x01];
        one_code_table.extend_from_slice(&[0u8; 15]);
        one_code_table.push(0x00);

        let mut out = vec![0xFF, 0xD8];
        out.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
        out.extend_from_slice(&[0x01; 64]);
        out.extend_from_slice(&[
            0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00,
        ]);
        out.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x14, 0x00]);
        out.extend_from_slice(&one_code_table);
        out.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x14, 0x10]);
        out.extend_from_slice(&one_code_table);
        out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
        // DC diff 0, then end-of-block, padded with ones
        out.push(0x3F);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    fn read_exif(path: &Path) -> exif::Exif {
        let file = std::fs::File::open(path).unwrap();
        exif::Reader::new()
            .read_from_container(&mut std::io::BufReader::new(file))
            .unwrap()
    }

    fn fields(date: (i32, u32, u32)) -> EmbedFields {
        EmbedFields {
            title: "Sunset".into(),
            description: "Last evening in Lisbon".into(),
            tags: vec!["beach".into(), "evening".into()],
            date_taken: NaiveDate::from_ymd_opt(date.0, date.1, date.2)
                .and_then(|d| d.and_hms_opt(1, 2, 3)),
        }
    }

    #[test]
    fn test_embed_writes_title_comment_and_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A1.jpg");
        std::fs::write(&path, tiny_jpeg()).unwrap();

        embed_metadata(&path, &fields((2020, 1, 1))).unwrap();

        let exif = read_exif(&path);
        let title = exif
            .get_field(exif::Tag::ImageDescription, exif::In::PRIMARY)
            .unwrap();
        match &title.value {
            exif::Value::Ascii(parts) => assert_eq!(parts[0], b"Sunset"),
            other => panic!("unexpected value {other:?}"),
        }
        let comment = exif
            .get_field(exif::Tag::UserComment, exif::In::PRIMARY)
            .unwrap();
        match &comment.value {
            exif::Value::Undefined(bytes, _) => {
                assert_eq!(&bytes[..8], b"ASCII\0\0\0");
                assert_eq!(
                    &bytes[8..],
                    b"Last evening in Lisbon\nKeywords: beach, evening"
                );
            }
            other => panic!("unexpected value {other:?}"),
        }
        assert_eq!(
            get_photo_exif(&path).unwrap().as_deref(),
            Some("2020-01-01 01:02:03")
        );
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_existing_capture_date_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A1.jpg");
        std::fs::write(&path, tiny_jpeg()).unwrap();
        embed_metadata(&path, &fields((2020, 1, 1))).unwrap();

        embed_metadata(&path, &fields((2023, 7, 9))).unwrap();
        assert_eq!(
            get_photo_exif(&path).unwrap().as_deref(),
            Some("2020-01-01 01:02:03")
        );
    }

    #[test]
    fn test_embeddable_formats() {
        assert!(is_embeddable(Path::new("a/1.jpg")));
        assert!(is_embeddable(Path::new("a/1.JPEG")));
        assert!(is_embeddable(Path::new("a/1.png")));
        assert!(is_embeddable(Path::new("a/1.tiff")));
        assert!(!is_embeddable(Path::new("a/1.mp4")));
        assert!(!is_embeddable(Path::new("a/1.gif")));
        assert!(!is_embeddable(Path::new("a/noext")));
    }

    #[test]
    fn test_user_comment_ascii() {
        let c = user_comment("At the beach", &["sea".into(), "sun".into()]);
        assert_eq!(&c[..8], b"ASCII\0\0\0");
        assert_eq!(&c[8..], b"At the beach\nKeywords: sea, sun");
    }

    #[test]
    fn test_user_comment_non_ascii_uses_undefined_code() {
        let c = user_comment("Café", &[]);
        assert_eq!(&c[..8], &[0u8; 8]);
        assert_eq!(std::str::from_utf8(&c[8..]).unwrap(), "Café");
    }

    #[test]
    fn test_user_comment_tags_only() {
        let c = user_comment("  ", &["x".into()]);
        assert_eq!(&c[8..], b"Keywords: x");
    }

    #[test]
    fn test_staging_path_hidden_sibling() {
        assert_eq!(
            staging_path(Path::new("/b/Vacation/A1.jpg")),
            PathBuf::from("/b/Vacation/.A1.embedding.jpg")
        );
    }

    #[test]
    fn test_corrupt_jpeg_rejected_and_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A1.jpg");
        std::fs::write(&path, b"this is not an image").unwrap();

        let err = embed_metadata(
            &path,
            &EmbedFields {
                title: "t".into(),
                ..EmbedFields::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, EmbedError::Unrecognized { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), b"this is not an image");
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_get_photo_exif_none_for_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.jpg");
        std::fs::write(&path, b"plain").unwrap();
        assert_eq!(get_photo_exif(&path).unwrap(), None);
    }
}
