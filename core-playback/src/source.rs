//! Data source contracts.
//!
//! A data source produces [`PlayItem`]s for locators it understands and owns
//! the [`CacheRegistry`] they are kept in. Concrete sources live in their own
//! crates (`provider-local`).

use async_trait::async_trait;
use bytes::Bytes;
use core_async::io::BoxedReader;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::CacheRegistry;
use crate::error::Result;
use crate::item::{OwnerId, PlayItem};

#[async_trait]
pub trait DataSource: Send + Sync {
    fn owner_id(&self) -> &OwnerId;

    fn registry(&self) -> &CacheRegistry;

    /// Registered item for `locator`, discovering it if needed.
    async fn discover_item(&self, locator: &str) -> Result<Arc<PlayItem>>;

    /// Caches an item produced by this source.
    async fn cache_item(&self, item: &Arc<PlayItem>) -> Result<Arc<PlayItem>>;

    /// Removes an item from the registry. Absent items are not an error.
    async fn remove_item(&self, item: &PlayItem) -> Result<bool>;

    async fn open_stream(&self, locator: &str) -> Result<BoxedReader>;

    async fn read_range(&self, locator: &str, offset: u64, length: usize) -> Result<Bytes>;
}

/// Optional facet of sources organised as a directory tree.
#[async_trait]
pub trait BrowsableSource: DataSource {
    /// Immediate subdirectories of `path`.
    async fn directories(&self, path: &str) -> Result<Vec<PathBuf>>;

    /// Files directly under `path` whose extension matches one of
    /// `extensions` (case-insensitive). An empty filter lists every file.
    async fn files(&self, path: &str, extensions: &[&str]) -> Result<Vec<PathBuf>>;
}
