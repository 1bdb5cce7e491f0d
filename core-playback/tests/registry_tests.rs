//! Discovery, caching and removal through a [`CacheRegistry`].

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::{Fixture, FsResolver, TRACK};
use core_async::io::AsyncReadExt;
use core_playback::cache::strategy::StrategyResult;
use core_playback::{
    CacheEvent, CacheState, CacheStrategy, DiskCopyStrategy, InPlaceStrategy, ItemResolver,
    MemoryStrategy, OwnerId, PlayItem, PlaybackError, Result, StrategyError,
};
use core_runtime::config::CacheMode;
use futures::future::join_all;
use mockall::mock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Delegates to another strategy and counts materializations.
struct CountingStrategy {
    inner: Arc<dyn CacheStrategy>,
    calls: AtomicUsize,
}

impl CountingStrategy {
    fn wrap(inner: Arc<dyn CacheStrategy>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStrategy for CountingStrategy {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn materialize(&self, item: &PlayItem, locator: &str) -> StrategyResult<CacheState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.materialize(item, locator).await
    }

    async fn cached_stream(&self, item: &PlayItem) -> Option<Bytes> {
        self.inner.cached_stream(item).await
    }

    async fn cached_path(&self, item: &PlayItem) -> Option<PathBuf> {
        self.inner.cached_path(item).await
    }

    async fn evict(&self, item: &PlayItem) -> StrategyResult<()> {
        self.inner.evict(item).await
    }
}

mock! {
    Resolver {}

    #[async_trait]
    impl ItemResolver for Resolver {
        async fn resolves(&self, locator: &str) -> bool;
        async fn resolve_item(&self, locator: &str) -> Result<PlayItem>;
    }
}

fn owner() -> OwnerId {
    OwnerId::unique("local")
}

#[tokio::test]
async fn concurrent_discovery_resolves_once() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let owner = owner();
    let registry = fixture.registry(&owner);
    let resolver = fixture.resolver(&owner);

    let items = join_all((0..8).map(|_| registry.discover(TRACK, &resolver))).await;

    assert_eq!(resolver.discoveries(), 1);
    let items: Vec<_> = items.into_iter().map(|item| item.unwrap()).collect();
    assert!(items.iter().all(|item| Arc::ptr_eq(item, &items[0])));
    assert_eq!(registry.len(), 1);
    assert_eq!(items[0].title(), "track.flac");
    assert_eq!(items[0].cache_state(), CacheState::NotCached);
}

#[tokio::test]
async fn caching_in_place_runs_the_strategy_once() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let owner = owner();
    let registry = fixture.registry(&owner);
    let resolver = fixture.resolver(&owner);

    let strategy = CountingStrategy::wrap(Arc::new(InPlaceStrategy::new(fixture.fs.clone())));
    let item = Arc::new(PlayItem::new(TRACK, owner.clone(), strategy.clone()));
    assert_eq!(item.cache_state(), CacheState::NotCached);

    let cached = registry.cache(&item, &resolver).await.unwrap();
    assert!(Arc::ptr_eq(&cached, &item));
    assert_eq!(cached.cache_state(), CacheState::Disk);
    assert_eq!(cached.cached_path().await, Some(PathBuf::from(TRACK)));
    assert_eq!(cached.cached_stream().await, None);

    let again = registry.cache(&item, &resolver).await.unwrap();
    assert_eq!(again.cache_state(), CacheState::Disk);
    assert_eq!(strategy.calls(), 1);
    assert!(Arc::ptr_eq(&registry.lookup(TRACK).unwrap(), &item));
}

#[tokio::test]
async fn concurrent_caching_materializes_once() {
    let fixture = Fixture::new(CacheMode::Memory);
    let owner = owner();
    let registry = fixture.registry(&owner);
    let resolver = fixture.resolver(&owner);

    let strategy = CountingStrategy::wrap(Arc::new(MemoryStrategy::new(fixture.fs.clone(), 1 << 20)));
    let item = Arc::new(PlayItem::new(TRACK, owner.clone(), strategy.clone()));

    let results = join_all((0..4).map(|_| registry.cache(&item, &resolver))).await;

    assert!(results.iter().all(|result| result.is_ok()));
    assert_eq!(strategy.calls(), 1);
    assert_eq!(item.cache_state(), CacheState::Memory);
}

#[tokio::test]
async fn cache_events_follow_the_state_machine() {
    let fixture = Fixture::new(CacheMode::DiskCopy);
    let owner = owner();
    let registry = fixture.registry(&owner);
    let resolver = fixture.resolver(&owner);

    let item = registry.discover(TRACK, &resolver).await.unwrap();
    let log = common::record(item.events());

    registry.cache(&item, &resolver).await.unwrap();

    let states: Vec<CacheState> = log
        .lock()
        .iter()
        .filter_map(|event| match event {
            CacheEvent::StateChanged { state, .. } => Some(*state),
            CacheEvent::ProgressChanged { .. } => None,
        })
        .collect();
    assert_eq!(states, vec![CacheState::Caching, CacheState::Disk]);
    assert!(log.lock().iter().all(|event| event.locator() == TRACK));
}

#[tokio::test]
async fn memory_cache_serves_the_bytes() {
    let fixture = Fixture::new(CacheMode::Memory);
    let item = fixture.cached_item(TRACK).await;

    assert_eq!(item.cache_state(), CacheState::Memory);
    assert_eq!(item.cached_path().await, None);

    let bytes = item.cached_stream().await.unwrap();
    assert_eq!(bytes.len(), 4096);
    assert!(bytes.iter().all(|byte| *byte == 0x66));
}

#[tokio::test]
async fn memory_limit_fails_the_item() {
    let fixture = Fixture::new(CacheMode::Memory);
    let owner = owner();
    let registry = fixture.registry(&owner);
    let resolver = fixture.resolver(&owner);

    let strategy = Arc::new(MemoryStrategy::new(fixture.fs.clone(), 1024));
    let item = Arc::new(PlayItem::new(TRACK, owner.clone(), strategy));

    let error = registry.cache(&item, &resolver).await.unwrap_err();
    assert!(matches!(
        error,
        PlaybackError::StrategyFailure {
            source: StrategyError::TooLarge { size: 4096, limit: 1024 },
            ..
        }
    ));
    assert_eq!(item.cache_state(), CacheState::Failed);

    // A failed item is not retried.
    let again = registry.cache(&item, &resolver).await.unwrap();
    assert_eq!(again.cache_state(), CacheState::Failed);
    assert_eq!(fixture.sink.operations(), vec!["cache".to_string()]);
}

#[tokio::test]
async fn foreign_items_are_rejected_and_reported() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let owner = owner();
    let registry = fixture.registry(&owner);
    let resolver = fixture.resolver(&owner);

    let stranger = OwnerId::unique("remote");
    let foreign = Arc::new(PlayItem::new(
        TRACK,
        stranger.clone(),
        Arc::new(InPlaceStrategy::new(fixture.fs.clone())),
    ));

    let error = registry.cache(&foreign, &resolver).await.unwrap_err();
    assert!(matches!(
        &error,
        PlaybackError::OwnershipMismatch { expected, actual } if expected == &owner && actual == &stranger
    ));
    assert_eq!(foreign.cache_state(), CacheState::NotCached);
    assert!(registry.is_empty());

    let error = registry.remove_item(&foreign).await.unwrap_err();
    assert!(error.is_caller_error());

    let reports = fixture.sink.reports();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|report| report.context == vec![TRACK.to_string()]));
}

#[tokio::test]
async fn vanished_source_is_not_cached() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let owner = owner();
    let registry = fixture.registry(&owner);

    let mut resolver = MockResolver::new();
    resolver.expect_resolves().returning(|_| false);
    resolver.expect_resolve_item().never();

    let item = Arc::new(PlayItem::new(
        TRACK,
        owner.clone(),
        Arc::new(InPlaceStrategy::new(fixture.fs.clone())),
    ));
    let error = registry.cache(&item, &resolver).await.unwrap_err();

    assert!(matches!(error, PlaybackError::SourceNotFound(ref locator) if locator == TRACK));
    assert_eq!(item.cache_state(), CacheState::NotCached);
}

#[tokio::test]
async fn discovery_failure_registers_nothing() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let owner = owner();
    let registry = fixture.registry(&owner);

    let mut resolver = MockResolver::new();
    resolver
        .expect_resolve_item()
        .times(1)
        .returning(|locator| Err(PlaybackError::SourceNotFound(locator.to_string())));

    let error = registry.discover("/music/missing.ogg", &resolver).await.unwrap_err();

    assert!(matches!(error, PlaybackError::SourceNotFound(_)));
    assert!(registry.lookup("/music/missing.ogg").is_none());
    assert_eq!(fixture.sink.operations(), vec!["discover".to_string()]);
}

#[tokio::test]
async fn removal_evicts_the_disk_copy() {
    let fixture = Fixture::new(CacheMode::DiskCopy);
    let owner = owner();
    let registry = fixture.registry(&owner);
    let resolver = fixture.resolver(&owner);

    let item = registry.discover(TRACK, &resolver).await.unwrap();
    registry.cache(&item, &resolver).await.unwrap();

    let copy = item.cached_path().await.unwrap();
    let expected = DiskCopyStrategy::new(fixture.fs.clone(), "/cache").artifact_path(TRACK, Some("flac"));
    assert_eq!(copy, expected);
    assert!(fixture.fs.contains(&copy));

    let mut reader = fixture
        .config
        .file_system
        .open_read_stream(&copy)
        .await
        .unwrap();
    let mut data = Vec::new();
    reader.read_to_end(&mut data).await.unwrap();
    assert_eq!(data.len(), 4096);

    assert!(registry.remove(TRACK).await);
    assert!(!fixture.fs.contains(&copy));
    assert!(fixture.fs.contains(TRACK));
    assert!(registry.lookup(TRACK).is_none());

    assert!(!registry.remove(TRACK).await);
    assert!(fixture.sink.reports().is_empty());
}

#[tokio::test]
async fn disk_copy_streams_large_files_in_chunks() {
    const ALBUM: &str = "/music/album.wav";
    let fixture = Fixture::new(CacheMode::DiskCopy);
    let payload: Vec<u8> = (0..640 * 1024).map(|i| (i % 251) as u8).collect();
    fixture.fs.insert(ALBUM, payload.clone());
    let owner = owner();
    let registry = fixture.registry(&owner);
    let resolver = fixture.resolver(&owner);

    let item = registry.discover(ALBUM, &resolver).await.unwrap();
    let log = common::record(item.events());
    registry.cache(&item, &resolver).await.unwrap();

    let copy = item.cached_path().await.unwrap();
    let copied = fixture.config.file_system.read_file(&copy).await.unwrap();
    assert_eq!(copied.as_ref(), payload.as_slice());

    let progress = || -> Vec<f32> {
        log.lock()
            .iter()
            .filter_map(|event| match event {
                CacheEvent::ProgressChanged { fraction, .. } => Some(*fraction),
                CacheEvent::StateChanged { .. } => None,
            })
            .collect()
    };
    for _ in 0..1000 {
        if progress().len() >= 4 {
            break;
        }
        tokio::task::yield_now().await;
    }
    let mut fractions = progress();
    fractions.sort_by(|a, b| a.total_cmp(b));
    assert_eq!(fractions.len(), 4);
    assert!(fractions[0] > 0.0 && fractions[0] < 0.5);
    assert_eq!(fractions[3], 1.0);
}

#[tokio::test]
async fn rediscovery_after_removal_starts_fresh() {
    let fixture = Fixture::new(CacheMode::Memory);
    let owner = owner();
    let registry = fixture.registry(&owner);
    let resolver: FsResolver = fixture.resolver(&owner);

    let first = registry.discover(TRACK, &resolver).await.unwrap();
    registry.cache(&first, &resolver).await.unwrap();
    assert!(registry.remove_item(&first).await.unwrap());

    let second = registry.discover(TRACK, &resolver).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.cache_state(), CacheState::NotCached);
    assert_eq!(resolver.discoveries(), 2);
}

#[tokio::test]
async fn stale_handle_does_not_replace_the_registered_item() {
    let fixture = Fixture::new(CacheMode::Memory);
    let owner = owner();
    let registry = fixture.registry(&owner);
    let resolver = fixture.resolver(&owner);

    let stale = registry.discover(TRACK, &resolver).await.unwrap();
    assert!(registry.remove(TRACK).await);
    let current = registry.discover(TRACK, &resolver).await.unwrap();

    let cached = registry.cache(&stale, &resolver).await.unwrap();

    assert!(Arc::ptr_eq(&cached, &current));
    assert!(Arc::ptr_eq(&registry.lookup(TRACK).unwrap(), &current));
    assert_eq!(current.cache_state(), CacheState::Memory);
    assert_eq!(stale.cache_state(), CacheState::NotCached);
    assert_eq!(registry.len(), 1);
    assert!(fixture.sink.reports().is_empty());
}
