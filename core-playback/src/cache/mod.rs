//! # Item Caching
//!
//! - [`CacheStrategy`] materializes the playable bytes of one item.
//! - [`InPlaceStrategy`], [`MemoryStrategy`] and [`DiskCopyStrategy`] are the
//!   shipped strategies, selected through [`CacheMode`].
//! - [`CacheRegistry`] deduplicates discovery and caching per locator.

mod disk;
mod memory;
pub mod registry;
pub mod strategy;

use core_runtime::config::{CacheMode, CoreConfig};
use std::sync::Arc;

pub use disk::DiskCopyStrategy;
pub use memory::MemoryStrategy;
pub use registry::{CacheRegistry, ItemResolver};
pub use strategy::{CacheStrategy, InPlaceStrategy, StrategyResult};

/// A fresh strategy instance for one item, following `config.cache_mode`.
pub fn strategy_for(config: &CoreConfig) -> Arc<dyn CacheStrategy> {
    let fs = Arc::clone(&config.file_system);
    match config.cache_mode {
        CacheMode::InPlace => Arc::new(InPlaceStrategy::new(fs)),
        CacheMode::Memory => Arc::new(MemoryStrategy::new(fs, config.memory_cache_limit_bytes)),
        CacheMode::DiskCopy => Arc::new(DiskCopyStrategy::new(fs, config.cache_dir.clone())),
    }
}
