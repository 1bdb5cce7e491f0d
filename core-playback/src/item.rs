//! # Play Items
//!
//! A [`PlayItem`] is one playable resource produced by a data source. Its
//! identity is the pair `(locator, owner)`; everything else (descriptive
//! metadata, cache state) is mutated in place while the item is shared
//! behind an `Arc`.
//!
//! The cache state only moves along
//! `NotCached -> Caching -> {Memory | Disk | Failed}`. The transitions are
//! guarded here so a strategy cannot skip or repeat a step.

use bridge_traits::metadata::ExtractedMetadata;
use bytes::Bytes;
use core_runtime::events::EventHandlers;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStrategy;
use crate::events::CacheEvent;

/// Identifies the data source instance that produced an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A process-unique id of the form `prefix#n`.
    pub fn unique(prefix: &str) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(format!("{prefix}#{}", NEXT.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache state of a [`PlayItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheState {
    NotCached,
    Caching,
    /// Playable bytes are held in memory; stream access is meaningful.
    Memory,
    /// Playable bytes are on disk; path access is meaningful.
    Disk,
    Failed,
}

impl CacheState {
    /// Whether a channel can be created from an item in this state.
    pub fn is_cached(&self) -> bool {
        matches!(self, CacheState::Memory | CacheState::Disk)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CacheState::Memory | CacheState::Disk | CacheState::Failed)
    }
}

/// Thumbnail or embedded cover art.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub data: Bytes,
    pub mime_type: String,
    pub extension: String,
}

/// Descriptive fields of an item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemInfo {
    pub mime_type: Option<String>,
    pub extension: Option<String>,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<Thumbnail>,
}

/// One playable resource.
pub struct PlayItem {
    locator: String,
    owner: OwnerId,
    info: RwLock<ItemInfo>,
    state: Mutex<CacheState>,
    strategy: Arc<dyn CacheStrategy>,
    events: EventHandlers<CacheEvent>,
}

impl PlayItem {
    /// Creates a `NotCached` item whose title is the basename of `locator`.
    pub fn new(
        locator: impl Into<String>,
        owner: OwnerId,
        strategy: Arc<dyn CacheStrategy>,
    ) -> Self {
        let locator = locator.into();
        let info = ItemInfo {
            title: basename(&locator).to_string(),
            ..Default::default()
        };

        Self {
            locator,
            owner,
            info: RwLock::new(info),
            state: Mutex::new(CacheState::NotCached),
            strategy,
            events: EventHandlers::new(),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn info(&self) -> ItemInfo {
        self.info.read().clone()
    }

    pub fn title(&self) -> String {
        self.info.read().title.clone()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.info.read().duration
    }

    pub fn update_info(&self, update: impl FnOnce(&mut ItemInfo)) {
        update(&mut self.info.write());
    }

    /// Merges provider output into the item. Empty fields never overwrite
    /// known values; the title keeps its basename default when absent.
    pub fn apply_metadata(&self, metadata: ExtractedMetadata) {
        let mut info = self.info.write();
        if let Some(title) = metadata.title {
            info.title = title;
        }
        if metadata.artist.is_some() {
            info.artist = metadata.artist;
        }
        if metadata.album.is_some() {
            info.album = metadata.album;
        }
        if metadata.duration.is_some() {
            info.duration = metadata.duration;
        }
        if let Some(artwork) = metadata.artwork {
            let extension = artwork
                .mime_type
                .rsplit('/')
                .next()
                .unwrap_or("bin")
                .replace("jpeg", "jpg");
            info.thumbnail = Some(Thumbnail {
                data: artwork.data,
                mime_type: artwork.mime_type,
                extension,
            });
        }
    }

    pub fn cache_state(&self) -> CacheState {
        *self.state.lock()
    }

    pub fn strategy(&self) -> &Arc<dyn CacheStrategy> {
        &self.strategy
    }

    /// Observers of `CacheStateChanged` and `CacheProgressChanged`.
    pub fn events(&self) -> &EventHandlers<CacheEvent> {
        &self.events
    }

    /// In-memory bytes, only while the item is in the `Memory` state.
    pub async fn cached_stream(&self) -> Option<Bytes> {
        if self.cache_state() != CacheState::Memory {
            return None;
        }
        self.strategy.cached_stream(self).await
    }

    /// Cached file path, only while the item is in the `Disk` state.
    pub async fn cached_path(&self) -> Option<PathBuf> {
        if self.cache_state() != CacheState::Disk {
            return None;
        }
        self.strategy.cached_path(self).await
    }

    /// `NotCached -> Caching`. Returns the current state when the item is
    /// anywhere else.
    pub(crate) fn begin_caching(&self) -> Result<(), CacheState> {
        let mut state = self.state.lock();
        match *state {
            CacheState::NotCached => {
                *state = CacheState::Caching;
                Ok(())
            }
            current => Err(current),
        }
    }

    /// `Caching -> outcome`. Ignored unless the item is caching.
    pub(crate) fn finish_caching(&self, outcome: CacheState) -> bool {
        let mut state = self.state.lock();
        if *state == CacheState::Caching && outcome.is_terminal() {
            *state = outcome;
            true
        } else {
            false
        }
    }

    /// Fire-and-forget progress notification, clamped to `[0, 1]`.
    pub fn report_progress(&self, fraction: f32) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.events.emit_and_forget(CacheEvent::ProgressChanged {
            locator: self.locator.clone(),
            fraction,
        });
    }
}

impl fmt::Debug for PlayItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayItem")
            .field("locator", &self.locator)
            .field("owner", &self.owner)
            .field("state", &self.cache_state())
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

/// Last path segment of a path or URL, without query or fragment.
pub fn basename(locator: &str) -> &str {
    let without_query = locator
        .split(['?', '#'])
        .next()
        .unwrap_or(locator)
        .trim_end_matches(['/', '\\']);

    match without_query.rsplit(['/', '\\']).next() {
        Some(name) if !name.is_empty() => name,
        _ => locator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InPlaceStrategy;
    use crate::testing::MemoryFileSystem;
    use bridge_traits::metadata::Artwork;

    fn item(locator: &str) -> PlayItem {
        let fs = Arc::new(MemoryFileSystem::new());
        PlayItem::new(locator, OwnerId::new("test#1"), Arc::new(InPlaceStrategy::new(fs)))
    }

    #[test]
    fn basename_of_paths_and_urls() {
        assert_eq!(basename("/music/album/track.flac"), "track.flac");
        assert_eq!(basename("C:\\music\\track.mp3"), "track.mp3");
        assert_eq!(basename("https://host/a/b/song.ogg?token=1"), "song.ogg");
        assert_eq!(basename("/music/album/"), "album");
        assert_eq!(basename("track.flac"), "track.flac");
    }

    #[test]
    fn title_defaults_to_basename() {
        assert_eq!(item("/music/track.flac").title(), "track.flac");
    }

    #[test]
    fn metadata_without_title_keeps_default() {
        let item = item("/music/track.flac");
        item.apply_metadata(ExtractedMetadata {
            artist: Some("Artist".into()),
            duration: Some(Duration::from_secs(61)),
            artwork: Some(Artwork::new(Bytes::from_static(b"\xff\xd8"), "image/jpeg")),
            ..Default::default()
        });

        let info = item.info();
        assert_eq!(info.title, "track.flac");
        assert_eq!(info.artist.as_deref(), Some("Artist"));
        assert_eq!(info.thumbnail.unwrap().extension, "jpg");
    }

    #[test]
    fn caching_transitions_are_guarded() {
        let item = item("/music/track.flac");

        assert!(item.begin_caching().is_ok());
        assert_eq!(item.begin_caching(), Err(CacheState::Caching));
        assert!(!item.finish_caching(CacheState::NotCached));
        assert!(item.finish_caching(CacheState::Disk));
        assert!(!item.finish_caching(CacheState::Failed));
        assert_eq!(item.cache_state(), CacheState::Disk);
    }

    #[tokio::test]
    async fn cached_accessors_depend_on_state() {
        let item = item("/music/track.flac");
        assert!(item.cached_path().await.is_none());
        assert!(item.cached_stream().await.is_none());
    }
}
