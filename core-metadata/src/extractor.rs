//! Audio Tag Extraction
//!
//! [`LoftyMetadataProvider`] implements the
//! [`MetadataProvider`](bridge_traits::MetadataProvider) contract with the
//! `lofty` crate. It supports ID3v2, Vorbis Comments, MP4 tags and FLAC.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::MetadataProvider;
//! use core_metadata::LoftyMetadataProvider;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = LoftyMetadataProvider::new();
//! let metadata = provider.extract(Path::new("song.flac")).await?;
//!
//! println!("Title: {}", metadata.title.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::metadata::{Artwork, ExtractedMetadata, MetadataProvider};
use bytes::Bytes;
use lofty::config::ParseOptions;
use lofty::file::{AudioFile, FileType, TaggedFileExt};
use lofty::picture::{MimeType, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, Tag};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::error::{MetadataError, Result};

/// `lofty`-backed metadata provider.
#[derive(Debug, Clone)]
pub struct LoftyMetadataProvider {
    include_artwork: bool,
}

impl LoftyMetadataProvider {
    pub fn new() -> Self {
        Self {
            include_artwork: true,
        }
    }

    /// Skips embedded pictures. Useful when thumbnails are disabled.
    pub fn without_artwork() -> Self {
        Self {
            include_artwork: false,
        }
    }

    /// Extract tags from `path` on the blocking pool.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn extract_from_file(&self, path: &Path) -> Result<ExtractedMetadata> {
        let owned = path.to_path_buf();
        let include_artwork = self.include_artwork;

        let metadata = core_async::task::spawn_blocking(move || read_tags(owned, include_artwork))
            .await
            .map_err(|e| MetadataError::ExtractionFailed(format!("extraction task failed: {e}")))??;

        debug!(
            has_title = metadata.title.is_some(),
            has_artwork = metadata.artwork.is_some(),
            "Extracted metadata"
        );
        Ok(metadata)
    }
}

impl Default for LoftyMetadataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataProvider for LoftyMetadataProvider {
    async fn extract(&self, path: &Path) -> BridgeResult<ExtractedMetadata> {
        Ok(self.extract_from_file(path).await?)
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type.starts_with("audio/") || mime_type == "video/mp4"
    }
}

fn read_tags(path: PathBuf, include_artwork: bool) -> Result<ExtractedMetadata> {
    if let Err(e) = std::fs::metadata(&path) {
        return Err(match e.kind() {
            std::io::ErrorKind::NotFound => {
                MetadataError::FileNotFound(path.display().to_string())
            }
            _ => MetadataError::Io(e),
        });
    }

    let tagged_file = Probe::open(&path)
        .map_err(|e| MetadataError::ExtractionFailed(e.to_string()))?
        .options(ParseOptions::new())
        .guess_file_type()?
        .read()
        .map_err(|e| MetadataError::UnsupportedFormat(e.to_string()))?;

    let duration = tagged_file.properties().duration();
    let mut metadata = ExtractedMetadata {
        duration: (!duration.is_zero()).then_some(duration),
        ..Default::default()
    };

    debug!(
        mime_type = file_type_to_mime_type(tagged_file.file_type()),
        "Probed audio file"
    );

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        metadata.title = tag.title().map(|s| normalize_text(&s)).filter(|s| !s.is_empty());
        metadata.artist = tag.artist().map(|s| normalize_text(&s)).filter(|s| !s.is_empty());
        metadata.album = tag.album().map(|s| normalize_text(&s)).filter(|s| !s.is_empty());
        if include_artwork {
            metadata.artwork = extract_cover(tag);
        }
    }

    Ok(metadata)
}

/// Collapse runs of whitespace and drop control characters.
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

/// Front cover if present, otherwise the first picture with a known image type.
fn extract_cover(tag: &Tag) -> Option<Artwork> {
    let usable = |pic: &&lofty::picture::Picture| {
        !pic.data().is_empty() && pic.mime_type().and_then(mime_type_to_str).is_some()
    };

    let picture = tag
        .pictures()
        .iter()
        .filter(usable)
        .find(|pic| pic.pic_type() == PictureType::CoverFront)
        .or_else(|| tag.pictures().iter().find(usable))?;

    let mime_type = picture.mime_type().and_then(mime_type_to_str)?;
    Some(Artwork::new(Bytes::copy_from_slice(picture.data()), mime_type))
}

fn mime_type_to_str(mime_type: &MimeType) -> Option<&'static str> {
    match mime_type {
        MimeType::Png => Some("image/png"),
        MimeType::Jpeg => Some("image/jpeg"),
        MimeType::Tiff => Some("image/tiff"),
        MimeType::Bmp => Some("image/bmp"),
        MimeType::Gif => Some("image/gif"),
        _ => None,
    }
}

fn file_type_to_mime_type(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Aac => "audio/aac",
        FileType::Aiff => "audio/aiff",
        FileType::Ape => "audio/ape",
        FileType::Flac => "audio/flac",
        FileType::Mpeg => "audio/mpeg",
        FileType::Mp4 => "audio/mp4",
        FileType::Mpc => "audio/musepack",
        FileType::Opus => "audio/opus",
        FileType::Vorbis => "audio/vorbis",
        FileType::Speex => "audio/speex",
        FileType::Wav => "audio/wav",
        FileType::WavPack => "audio/wavpack",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello   World  "), "Hello World");
        assert_eq!(normalize_text("Title\nWith\tWhitespace"), "Title With Whitespace");
        assert_eq!(normalize_text("Clean Text"), "Clean Text");
    }

    #[test]
    fn test_mime_type_to_str() {
        assert_eq!(mime_type_to_str(&MimeType::Png), Some("image/png"));
        assert_eq!(mime_type_to_str(&MimeType::Jpeg), Some("image/jpeg"));
        assert_eq!(mime_type_to_str(&MimeType::Unknown("image/webp".into())), None);
    }

    #[test]
    fn test_file_type_mapping() {
        assert_eq!(file_type_to_mime_type(FileType::Flac), "audio/flac");
        assert_eq!(file_type_to_mime_type(FileType::Mpeg), "audio/mpeg");
    }

    #[test]
    fn provider_supports_audio_only() {
        let provider = LoftyMetadataProvider::new();
        assert!(provider.supports("audio/flac"));
        assert!(!provider.supports("text/plain"));
    }
}
