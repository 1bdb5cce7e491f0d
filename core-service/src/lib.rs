//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridges (file system, engines, metadata
//! extraction, error sinks) into the playback core and exposes one
//! [`MediaManager`] to host applications. Desktop apps typically enable the
//! `desktop-shims` feature (which depends on `bridge-desktop`); the
//! `local-source` and `tag-metadata` features pull in the local directory
//! source and the tag-based metadata provider.
//!
//! ```ignore
//! use core_service::{desktop_config, MediaManager};
//!
//! let config = desktop_config("/tmp/mediadeck").build()?;
//! let manager = MediaManager::new(config);
//! let owner = manager.mount_local("/home/me/Music").await?;
//! let item = manager.prepare(&owner, "albums/track.flac").await?;
//! ```

pub mod error;
pub mod manager;

pub use error::{CoreError, Result};
pub use manager::MediaManager;

#[cfg(any(
    all(feature = "desktop-shims", not(target_arch = "wasm32")),
    feature = "tag-metadata"
))]
use std::sync::Arc;

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
use core_runtime::config::{CoreConfig, CoreConfigBuilder};

/// Configuration builder backed by the Tokio file system, with the cache
/// rooted at `cache_dir`.
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub fn desktop_config(cache_dir: impl Into<std::path::PathBuf>) -> CoreConfigBuilder {
    let cache_dir = cache_dir.into();
    let file_system = bridge_desktop::TokioFileSystem::with_cache_directory(cache_dir.clone());
    CoreConfig::builder()
        .cache_dir(cache_dir)
        .file_system(Arc::new(file_system))
}

/// Metadata provider reading embedded tags and cover art.
#[cfg(feature = "tag-metadata")]
pub fn tag_metadata_provider() -> Arc<dyn bridge_traits::metadata::MetadataProvider> {
    Arc::new(core_metadata::LoftyMetadataProvider::new())
}
