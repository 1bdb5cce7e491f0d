//! The [`CacheStrategy`] contract and the in-place strategy.

use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use core_async::io::{AsyncReadExt, AsyncWriteExt};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::{PlaybackError, Result, StrategyError};
use crate::events::CacheEvent;
use crate::item::{CacheState, PlayItem};

pub type StrategyResult<T> = std::result::Result<T, StrategyError>;

const READ_CHUNK_BYTES: usize = 256 * 1024;

/// Pluggable policy that materializes the playable bytes of one item.
///
/// Implementations provide [`materialize`](CacheStrategy::materialize);
/// the provided [`cache`](CacheStrategy::cache) wraps it with the state
/// machine so that it runs at most once per item:
///
/// ```text
/// NotCached --cache()--> Caching --> Memory | Disk | Failed
/// ```
#[async_trait]
pub trait CacheStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produces the artifact and returns `Memory` or `Disk`.
    async fn materialize(&self, item: &PlayItem, locator: &str) -> StrategyResult<CacheState>;

    /// In-memory bytes of a `Memory` item.
    async fn cached_stream(&self, item: &PlayItem) -> Option<Bytes>;

    /// File path of a `Disk` item.
    async fn cached_path(&self, item: &PlayItem) -> Option<PathBuf>;

    /// Releases whatever [`materialize`](CacheStrategy::materialize) produced.
    async fn evict(&self, item: &PlayItem) -> StrategyResult<()> {
        let _ = item;
        Ok(())
    }

    /// Drives `item` through the cache state machine.
    ///
    /// Idempotent: an item that is not `NotCached` is returned in its
    /// current state without invoking the strategy. A failed
    /// materialization leaves the item `Failed`.
    async fn cache(&self, item: &PlayItem, locator: &str) -> Result<CacheState> {
        if let Err(current) = item.begin_caching() {
            debug!(locator, state = ?current, "Item already past NotCached");
            return Ok(current);
        }
        notify_state(item, CacheState::Caching).await;

        let outcome = match self.materialize(item, locator).await {
            Ok(state) if state.is_cached() => Ok(state),
            Ok(state) => Err(StrategyError::UnexpectedState(state)),
            Err(error) => Err(error),
        };

        match outcome {
            Ok(state) => {
                item.finish_caching(state);
                notify_state(item, state).await;
                Ok(state)
            }
            Err(source) => {
                warn!(locator, strategy = self.name(), error = %source, "Caching failed");
                item.finish_caching(CacheState::Failed);
                notify_state(item, CacheState::Failed).await;
                Err(PlaybackError::StrategyFailure {
                    locator: locator.to_string(),
                    source,
                })
            }
        }
    }
}

async fn notify_state(item: &PlayItem, state: CacheState) {
    item.events()
        .emit(CacheEvent::StateChanged {
            locator: item.locator().to_string(),
            state,
        })
        .await;
}

/// Reads a whole file in chunks, reporting progress on `item`.
///
/// Fails with [`StrategyError::TooLarge`] as soon as more than `limit` bytes
/// are seen, whatever the file system reported upfront.
pub(crate) async fn read_with_progress(
    fs: &dyn FileSystemAccess,
    path: &Path,
    item: &PlayItem,
    limit: Option<u64>,
) -> StrategyResult<Bytes> {
    let expected = fs.metadata(path).await?.size;
    if let Some(limit) = limit {
        if expected > limit {
            return Err(StrategyError::TooLarge {
                size: expected,
                limit,
            });
        }
    }

    let mut reader = fs.open_read_stream(path).await?;
    let mut buffer = Vec::with_capacity(expected as usize);
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];

    loop {
        let read = reader.read(&mut chunk).await.map_err(BridgeError::from)?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);

        if let Some(limit) = limit {
            if buffer.len() as u64 > limit {
                return Err(StrategyError::TooLarge {
                    size: buffer.len() as u64,
                    limit,
                });
            }
        }
        if expected > 0 {
            item.report_progress(buffer.len() as f32 / expected as f32);
        }
    }

    item.report_progress(1.0);
    Ok(Bytes::from(buffer))
}

/// Streams `source` into `target` chunk by chunk, reporting progress on
/// `item`. Returns the number of bytes copied.
///
/// At most one chunk is held in memory. A partial target is deleted when
/// the copy fails.
pub(crate) async fn copy_with_progress(
    fs: &dyn FileSystemAccess,
    source: &Path,
    target: &Path,
    item: &PlayItem,
) -> StrategyResult<u64> {
    let expected = fs.metadata(source).await?.size;
    let mut reader = fs.open_read_stream(source).await?;
    let mut writer = fs.open_write_stream(target).await?;
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    let mut copied = 0u64;

    let outcome: std::io::Result<()> = async {
        loop {
            let read = reader.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            writer.write_all(&chunk[..read]).await?;
            copied += read as u64;
            if expected > 0 {
                item.report_progress(copied as f32 / expected as f32);
            }
        }
        writer.shutdown().await
    }
    .await;

    if let Err(error) = outcome {
        if let Err(cleanup) = fs.delete_file(target).await {
            warn!(target = %target.display(), error = %cleanup, "Could not delete partial copy");
        }
        return Err(BridgeError::from(error).into());
    }

    item.report_progress(1.0);
    Ok(copied)
}

// ============================================================================
// In-place
// ============================================================================

/// Plays local files where they are. Caching only checks the file exists.
pub struct InPlaceStrategy {
    fs: Arc<dyn FileSystemAccess>,
    path: Mutex<Option<PathBuf>>,
}

impl InPlaceStrategy {
    pub fn new(fs: Arc<dyn FileSystemAccess>) -> Self {
        Self {
            fs,
            path: Mutex::new(None),
        }
    }
}

#[async_trait]
impl CacheStrategy for InPlaceStrategy {
    fn name(&self) -> &'static str {
        "in-place"
    }

    #[instrument(skip(self, _item))]
    async fn materialize(&self, _item: &PlayItem, locator: &str) -> StrategyResult<CacheState> {
        let path = PathBuf::from(locator);
        if !self.fs.exists(&path).await? {
            return Err(BridgeError::NotFound(locator.to_string()).into());
        }
        *self.path.lock() = Some(path);
        Ok(CacheState::Disk)
    }

    async fn cached_stream(&self, _item: &PlayItem) -> Option<Bytes> {
        None
    }

    async fn cached_path(&self, _item: &PlayItem) -> Option<PathBuf> {
        self.path.lock().clone()
    }
}
