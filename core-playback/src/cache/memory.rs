use async_trait::async_trait;
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::strategy::{read_with_progress, CacheStrategy, StrategyResult};
use crate::item::{CacheState, PlayItem};

/// Loads the whole resource into a shared buffer.
///
/// Resources above `limit_bytes` fail with
/// [`StrategyError::TooLarge`](crate::error::StrategyError::TooLarge).
pub struct MemoryStrategy {
    fs: Arc<dyn FileSystemAccess>,
    limit_bytes: u64,
    buffer: Mutex<Option<Bytes>>,
}

impl MemoryStrategy {
    pub fn new(fs: Arc<dyn FileSystemAccess>, limit_bytes: u64) -> Self {
        Self {
            fs,
            limit_bytes,
            buffer: Mutex::new(None),
        }
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.lock().as_ref().map_or(0, Bytes::len)
    }
}

#[async_trait]
impl CacheStrategy for MemoryStrategy {
    fn name(&self) -> &'static str {
        "memory"
    }

    #[instrument(skip(self, item))]
    async fn materialize(&self, item: &PlayItem, locator: &str) -> StrategyResult<CacheState> {
        let bytes =
            read_with_progress(self.fs.as_ref(), Path::new(locator), item, Some(self.limit_bytes))
                .await?;
        debug!(bytes = bytes.len(), "Buffered item in memory");
        *self.buffer.lock() = Some(bytes);
        Ok(CacheState::Memory)
    }

    async fn cached_stream(&self, _item: &PlayItem) -> Option<Bytes> {
        self.buffer.lock().clone()
    }

    async fn cached_path(&self, _item: &PlayItem) -> Option<PathBuf> {
        None
    }

    async fn evict(&self, _item: &PlayItem) -> StrategyResult<()> {
        self.buffer.lock().take();
        Ok(())
    }
}
