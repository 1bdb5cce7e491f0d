#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::report::{ErrorReport, ErrorSink};
use core_playback::backend::bootstrap::{self, BootstrapOptions};
use core_playback::testing::{FakeEngine, MemoryFileSystem};
use core_playback::{
    strategy_for, BackendEvent, CacheRegistry, EngineBackend, ItemResolver, OwnerId, PlayItem,
    PlaybackError, Result,
};
use core_runtime::config::{CacheMode, CoreConfig};
use core_runtime::events::EventHandlers;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TRACK: &str = "/music/track.flac";
pub const MOVIE: &str = "/videos/movie.mkv";

/// Error sink that keeps every report.
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingSink {
    pub fn operations(&self) -> Vec<String> {
        self.reports
            .lock()
            .iter()
            .map(|report| report.operation.clone())
            .collect()
    }

    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().clone()
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, report: &ErrorReport) {
        self.reports.lock().push(report.clone());
    }
}

pub struct Fixture {
    pub fs: Arc<MemoryFileSystem>,
    pub sink: Arc<RecordingSink>,
    pub config: CoreConfig,
}

impl Fixture {
    pub fn new(mode: CacheMode) -> Self {
        Self::with_timeout(mode, Duration::from_secs(5))
    }

    pub fn with_timeout(mode: CacheMode, engine_ready_timeout: Duration) -> Self {
        let fs = Arc::new(
            MemoryFileSystem::new()
                .with_file(TRACK, vec![0x66u8; 4096])
                .with_file(MOVIE, vec![0x1au8; 8192]),
        );
        let sink = Arc::new(RecordingSink::default());
        let config = CoreConfig::builder()
            .cache_dir("/cache")
            .cache_mode(mode)
            .engine_ready_timeout(engine_ready_timeout)
            .file_system(fs.clone())
            .error_sink(sink.clone())
            .build()
            .expect("valid test config");

        Self { fs, sink, config }
    }

    pub fn registry(&self, owner: &OwnerId) -> CacheRegistry {
        CacheRegistry::new(owner.clone(), self.sink.clone())
    }

    pub fn resolver(&self, owner: &OwnerId) -> FsResolver {
        FsResolver {
            owner: owner.clone(),
            config: self.config.clone(),
            fs: self.fs.clone(),
            discoveries: AtomicUsize::new(0),
        }
    }

    /// Discovers and caches `locator` through a fresh registry.
    pub async fn cached_item(&self, locator: &str) -> Arc<PlayItem> {
        let owner = OwnerId::unique("fixture");
        let registry = self.registry(&owner);
        let resolver = self.resolver(&owner);
        let item = registry.discover(locator, &resolver).await.unwrap();
        registry.cache(&item, &resolver).await.unwrap()
    }

    pub fn backend(&self, engine: FakeEngine) -> Arc<EngineBackend<FakeEngine>> {
        init_engine();
        Arc::new(EngineBackend::new(engine, &self.config).unwrap())
    }
}

/// Resolves locators against the in-memory file system and counts
/// discoveries.
pub struct FsResolver {
    pub owner: OwnerId,
    pub config: CoreConfig,
    pub fs: Arc<MemoryFileSystem>,
    pub discoveries: AtomicUsize,
}

impl FsResolver {
    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemResolver for FsResolver {
    async fn resolves(&self, locator: &str) -> bool {
        self.fs.contains(locator)
    }

    async fn resolve_item(&self, locator: &str) -> Result<PlayItem> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up on the same locator.
        core_async::task::yield_now().await;
        if !self.fs.contains(locator) {
            return Err(PlaybackError::SourceNotFound(locator.to_string()));
        }
        Ok(PlayItem::new(locator, self.owner.clone(), strategy_for(&self.config)))
    }
}

pub fn init_engine() {
    bootstrap::initialize(BootstrapOptions::default());
}

/// Records every event delivered to `handlers`.
pub fn record<E>(handlers: &EventHandlers<E>) -> Arc<Mutex<Vec<E>>>
where
    E: Clone + Send + 'static,
{
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    handlers.subscribe_fn(move |event| sink.lock().push(event));
    log
}

pub fn state_events(log: &Mutex<Vec<BackendEvent>>) -> Vec<BackendEvent> {
    log.lock()
        .iter()
        .filter(|event| matches!(event, BackendEvent::ChannelStateChanged { .. }))
        .cloned()
        .collect()
}
