use async_trait::async_trait;
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::strategy::{copy_with_progress, CacheStrategy, StrategyResult};
use crate::item::{CacheState, PlayItem};

/// Copies the resource into the cache directory and plays the copy.
///
/// Copies are named after the SHA-256 of the locator, so re-caching the same
/// locator after a removal reuses the same path.
pub struct DiskCopyStrategy {
    fs: Arc<dyn FileSystemAccess>,
    cache_dir: PathBuf,
    copy: Mutex<Option<PathBuf>>,
}

impl DiskCopyStrategy {
    pub fn new(fs: Arc<dyn FileSystemAccess>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            cache_dir: cache_dir.into(),
            copy: Mutex::new(None),
        }
    }

    /// Path the copy of `locator` is written to.
    pub fn artifact_path(&self, locator: &str, extension: Option<&str>) -> PathBuf {
        let digest = Sha256::digest(locator.as_bytes());
        let mut name = format!("{digest:x}");
        if let Some(extension) = extension.filter(|ext| !ext.is_empty()) {
            name.push('.');
            name.push_str(extension);
        }
        self.cache_dir.join(name)
    }
}

#[async_trait]
impl CacheStrategy for DiskCopyStrategy {
    fn name(&self) -> &'static str {
        "disk-copy"
    }

    #[instrument(skip(self, item))]
    async fn materialize(&self, item: &PlayItem, locator: &str) -> StrategyResult<CacheState> {
        let source = Path::new(locator);
        let extension = item.info().extension.or_else(|| {
            source
                .extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        });
        let target = self.artifact_path(locator, extension.as_deref());

        self.fs.create_dir_all(&self.cache_dir).await?;
        let size = copy_with_progress(self.fs.as_ref(), source, &target, item).await?;

        debug!(target = %target.display(), size, "Copied item into cache directory");
        *self.copy.lock() = Some(target);
        Ok(CacheState::Disk)
    }

    async fn cached_stream(&self, _item: &PlayItem) -> Option<Bytes> {
        None
    }

    async fn cached_path(&self, _item: &PlayItem) -> Option<PathBuf> {
        self.copy.lock().clone()
    }

    async fn evict(&self, _item: &PlayItem) -> StrategyResult<()> {
        let Some(path) = self.copy.lock().take() else {
            return Ok(());
        };
        match self.fs.delete_file(&path).await {
            Err(error) if !error.is_not_found() => Err(error.into()),
            _ => Ok(()),
        }
    }
}
