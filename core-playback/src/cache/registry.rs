//! Per-source registry of discovered items.
//!
//! A [`CacheRegistry`] belongs to exactly one data source. It deduplicates
//! concurrent requests for the same locator: discovery and caching of a
//! locator run inside a per-locator exclusive section, so N concurrent
//! `discover` calls produce one discovery and N references to one item.

use async_trait::async_trait;
use bridge_traits::report::ErrorSink;
use core_async::sync::KeyedMutex;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{PlaybackError, Result};
use crate::item::{OwnerId, PlayItem};
use crate::report::ErrorReporter;

/// The data-source side of the registry: how locators become items.
#[async_trait]
pub trait ItemResolver: Send + Sync {
    /// Whether `locator` still points at a readable resource.
    async fn resolves(&self, locator: &str) -> bool;

    /// Builds a fresh `NotCached` item for `locator`.
    async fn resolve_item(&self, locator: &str) -> Result<PlayItem>;
}

pub struct CacheRegistry {
    owner: OwnerId,
    items: RwLock<HashMap<String, Arc<PlayItem>>>,
    locks: KeyedMutex<String>,
    reporter: ErrorReporter,
}

impl CacheRegistry {
    pub fn new(owner: OwnerId, error_sink: Arc<dyn ErrorSink>) -> Self {
        let reporter = ErrorReporter::new(owner.as_str(), error_sink);
        Self {
            owner,
            items: RwLock::new(HashMap::new()),
            locks: KeyedMutex::new(),
            reporter,
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Prior result for `locator`. Never reads the source and never caches.
    pub fn lookup(&self, locator: &str) -> Option<Arc<PlayItem>> {
        self.items.read().get(locator).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn locators(&self) -> Vec<String> {
        let mut locators: Vec<_> = self.items.read().keys().cloned().collect();
        locators.sort();
        locators
    }

    /// Returns the registered item for `locator`, discovering it first if
    /// needed.
    #[instrument(skip(self, resolver), fields(owner = %self.owner))]
    pub async fn discover(&self, locator: &str, resolver: &dyn ItemResolver) -> Result<Arc<PlayItem>> {
        let result = self.discover_inner(locator, resolver).await;
        self.reporter.check("discover", &[locator.to_string()], result)
    }

    async fn discover_inner(&self, locator: &str, resolver: &dyn ItemResolver) -> Result<Arc<PlayItem>> {
        let _section = self.locks.lock(locator.to_string()).await;

        if let Some(existing) = self.lookup(locator) {
            debug!("Returning registered item");
            return Ok(existing);
        }

        let item = resolver.resolve_item(locator).await?;
        self.ensure_owned(&item)?;

        let item = Arc::new(item);
        self.items.write().insert(locator.to_string(), Arc::clone(&item));
        info!(title = %item.title(), "Discovered item");
        Ok(item)
    }

    /// Drives `item` through its cache strategy.
    ///
    /// Items that are not `NotCached` are returned as they are. If another
    /// item is registered for the locator, that item is cached and returned
    /// instead. A strategy failure leaves the item `Failed` and surfaces as
    /// [`StrategyFailure`](PlaybackError::StrategyFailure).
    #[instrument(skip(self, item, resolver), fields(owner = %self.owner, locator = item.locator()))]
    pub async fn cache(&self, item: &Arc<PlayItem>, resolver: &dyn ItemResolver) -> Result<Arc<PlayItem>> {
        let result = self.cache_inner(item, resolver).await;
        self.reporter
            .check("cache", &[item.locator().to_string()], result)
    }

    async fn cache_inner(&self, item: &Arc<PlayItem>, resolver: &dyn ItemResolver) -> Result<Arc<PlayItem>> {
        self.ensure_owned(item)?;
        let locator = item.locator();
        let _section = self.locks.lock(locator.to_string()).await;

        if !resolver.resolves(locator).await {
            return Err(PlaybackError::SourceNotFound(locator.to_string()));
        }

        // A handle kept across a removal and rediscovery must not replace
        // the item registered since.
        let item = match self.lookup(locator) {
            Some(registered) if !Arc::ptr_eq(&registered, item) => {
                debug!("Item superseded, caching the registered entry");
                registered
            }
            _ => Arc::clone(item),
        };

        let state = item.cache_state();
        if state != crate::item::CacheState::NotCached {
            debug!(?state, "Item already cached or caching");
            return Ok(item);
        }

        let state = item.strategy().cache(&item, locator).await?;
        self.items
            .write()
            .insert(locator.to_string(), Arc::clone(&item));
        info!(?state, strategy = item.strategy().name(), "Cached item");
        Ok(item)
    }

    /// Removes the entry for `locator`, evicting its cache artifact.
    ///
    /// Returns whether an entry was present. An absent entry is not an
    /// error; an eviction failure is reported but the entry stays removed.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn remove(&self, locator: &str) -> bool {
        let _section = self.locks.lock(locator.to_string()).await;

        let Some(item) = self.items.write().remove(locator) else {
            return false;
        };

        if let Err(source) = item.strategy().evict(&item).await {
            let error = PlaybackError::StrategyFailure {
                locator: locator.to_string(),
                source,
            };
            self.reporter
                .report("remove", &error, &[locator.to_string()]);
        }
        info!("Removed item");
        true
    }

    /// Like [`remove`](Self::remove), rejecting items of another owner.
    pub async fn remove_item(&self, item: &PlayItem) -> Result<bool> {
        let owned = self.ensure_owned(item);
        self.reporter
            .check("remove", &[item.locator().to_string()], owned)?;
        Ok(self.remove(item.locator()).await)
    }

    fn ensure_owned(&self, item: &PlayItem) -> Result<()> {
        if item.owner() != &self.owner {
            return Err(PlaybackError::OwnershipMismatch {
                expected: self.owner.clone(),
                actual: item.owner().clone(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("owner", &self.owner)
            .field("items", &self.len())
            .finish()
    }
}
