//! Metadata extraction contract.
//!
//! Data sources run a [`MetadataProvider`] while discovering an item. The
//! step is best-effort: a provider error never prevents an item from being
//! discovered, it only leaves the descriptive fields empty.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Embedded cover art or thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub data: Bytes,
    pub mime_type: String,
}

impl Artwork {
    pub fn new(data: Bytes, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }
}

/// Descriptive fields a provider could recover. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<Duration>,
    pub artwork: Option<Artwork>,
}

impl ExtractedMetadata {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Extract descriptive metadata from a local file.
    async fn extract(&self, path: &Path) -> Result<ExtractedMetadata>;

    /// Whether this provider understands the given MIME type.
    fn supports(&self, mime_type: &str) -> bool {
        let _ = mime_type;
        true
    }
}
