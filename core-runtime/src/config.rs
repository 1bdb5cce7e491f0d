//! # Core Configuration Module
//!
//! Provides configuration management for the Media Deck core.
//!
//! ## Overview
//!
//! A builder assembles a [`CoreConfig`] holding the bridge adapters and
//! tuning values the core needs. `build()` validates everything up front so
//! a misconfigured host fails at startup, not during the first playback.
//!
//! ## Required Dependencies
//!
//! - `FileSystemAccess` - raw byte access for data sources and cache
//!   strategies (desktop default: `TokioFileSystem`)
//!
//! ## Optional Dependencies
//!
//! - `ErrorSink` - structured error reports (default: [`TracingErrorSink`])
//! - `MetadataProvider` - title/artist/duration/artwork enrichment
//! - `LoggerSink` - host log forwarding
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CacheMode, CoreConfig};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .cache_dir("/var/cache/media-deck")
//!     .cache_mode(CacheMode::DiskCopy)
//!     .engine_ready_timeout(Duration::from_secs(5))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! Missing adapters produce [`Error::CapabilityMissing`] with a message that
//! says how to provide one; invalid values produce [`Error::Config`].

use crate::error::{Error, Result};
use crate::logging::{LoggingConfig, TracingErrorSink};
use bridge_traits::{ErrorSink, FileSystemAccess, LoggerSink, MetadataProvider};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Bytes read from the start of a resource to sniff its MIME type.
pub const DEFAULT_SNIFF_PREFIX_BYTES: usize = 10 * 1024 * 1024;

/// Upper bound for the sniff prefix.
pub const MAX_SNIFF_PREFIX_BYTES: usize = 64 * 1024 * 1024;

/// How long a backend waits for its engine to report playback.
pub const DEFAULT_ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest resource the in-memory strategy will buffer.
pub const DEFAULT_MEMORY_CACHE_LIMIT_BYTES: u64 = 256 * 1024 * 1024;

/// Which cache strategy data sources attach to the items they discover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Play straight from the source path.
    #[default]
    InPlace,
    /// Buffer the whole resource in memory.
    Memory,
    /// Copy the resource into the cache directory.
    DiskCopy,
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Run the metadata provider during discovery (requires MetadataProvider)
    pub enable_metadata_enrichment: bool,

    /// Keep embedded artwork as the item thumbnail
    pub enable_thumbnails: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_metadata_enrichment: false,
            enable_thumbnails: true,
        }
    }
}

/// Core configuration for the Media Deck core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Directory for disk cache artifacts
    pub cache_dir: PathBuf,

    pub cache_mode: CacheMode,

    /// Resources above this size are refused by the memory strategy
    pub memory_cache_limit_bytes: u64,

    /// Bytes read during discovery to sniff the MIME type
    pub sniff_prefix_bytes: usize,

    /// Bound on every engine readiness wait
    pub engine_ready_timeout: Duration,

    /// Buffer size of the aggregated event bus
    pub event_buffer_size: usize,

    pub file_system: Arc<dyn FileSystemAccess>,

    pub error_sink: Arc<dyn ErrorSink>,

    pub metadata_provider: Option<Arc<dyn MetadataProvider>>,

    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("cache_dir", &self.cache_dir)
            .field("cache_mode", &self.cache_mode)
            .field("memory_cache_limit_bytes", &self.memory_cache_limit_bytes)
            .field("sniff_prefix_bytes", &self.sniff_prefix_bytes)
            .field("engine_ready_timeout", &self.engine_ready_timeout)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("file_system", &"FileSystemAccess { ... }")
            .field("error_sink", &"ErrorSink { ... }")
            .field(
                "metadata_provider",
                &self
                    .metadata_provider
                    .as_ref()
                    .map(|_| "MetadataProvider { ... }"),
            )
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("features", &self.features)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Logging setup for [`init_logging`](crate::logging::init_logging),
    /// forwarding to the host logger when one was injected.
    pub fn logging(&self) -> LoggingConfig {
        let logging = LoggingConfig::default();
        match &self.logger_sink {
            Some(sink) => logging.with_logger_sink(Arc::clone(sink)),
            None => logging,
        }
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.sniff_prefix_bytes == 0 {
            return Err(Error::Config(
                "Sniff prefix must be at least 1 byte".to_string(),
            ));
        }

        if self.sniff_prefix_bytes > MAX_SNIFF_PREFIX_BYTES {
            return Err(Error::Config(format!(
                "Sniff prefix exceeds maximum of {} bytes",
                MAX_SNIFF_PREFIX_BYTES
            )));
        }

        if self.engine_ready_timeout.is_zero() {
            return Err(Error::Config(
                "Engine ready timeout must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        if self.cache_mode == CacheMode::Memory && self.memory_cache_limit_bytes == 0 {
            return Err(Error::Config(
                "Memory cache mode selected with a zero memory limit".to_string(),
            ));
        }

        if self.features.enable_metadata_enrichment && self.metadata_provider.is_none() {
            return Err(Error::Config(
                "Metadata enrichment enabled but no MetadataProvider provided. \
                 Disable the feature or inject a MetadataProvider implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(cache_dir: &std::path::Path) -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs: Arc<dyn FileSystemAccess> =
        Arc::new(TokioFileSystem::with_cache_directory(cache_dir.to_path_buf()));
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_cache_dir: &std::path::Path) -> Result<Arc<dyn FileSystemAccess>> {
    Err(Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required for reading media bytes. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default TokioFileSystem. \
                 Other hosts: inject a platform file system adapter."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    cache_dir: Option<PathBuf>,
    cache_mode: CacheMode,
    memory_cache_limit_bytes: Option<u64>,
    sniff_prefix_bytes: Option<usize>,
    engine_ready_timeout: Option<Duration>,
    event_buffer_size: Option<usize>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    error_sink: Option<Arc<dyn ErrorSink>>,
    metadata_provider: Option<Arc<dyn MetadataProvider>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the directory disk cache artifacts are written to.
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn memory_cache_limit_bytes(mut self, limit: u64) -> Self {
        self.memory_cache_limit_bytes = Some(limit);
        self
    }

    /// Sets how many leading bytes discovery reads to sniff the MIME type.
    pub fn sniff_prefix_bytes(mut self, bytes: usize) -> Self {
        self.sniff_prefix_bytes = Some(bytes);
        self
    }

    pub fn engine_ready_timeout(mut self, timeout: Duration) -> Self {
        self.engine_ready_timeout = Some(timeout);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the file system adapter.
    ///
    /// If not provided and the `desktop-shims` feature is enabled,
    /// `TokioFileSystem` rooted at the cache directory is used.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Sets the metadata provider and enables enrichment.
    pub fn metadata_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata_provider = Some(provider);
        self.features.enable_metadata_enrichment = true;
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn enable_metadata_enrichment(mut self, enabled: bool) -> Self {
        self.features.enable_metadata_enrichment = enabled;
        self
    }

    pub fn enable_thumbnails(mut self, enabled: bool) -> Self {
        self.features.enable_thumbnails = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `CoreConfig` instance.
    pub fn build(self) -> Result<CoreConfig> {
        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(&cache_dir)?,
        };

        let config = CoreConfig {
            cache_dir,
            cache_mode: self.cache_mode,
            memory_cache_limit_bytes: self
                .memory_cache_limit_bytes
                .unwrap_or(DEFAULT_MEMORY_CACHE_LIMIT_BYTES),
            sniff_prefix_bytes: self.sniff_prefix_bytes.unwrap_or(DEFAULT_SNIFF_PREFIX_BYTES),
            engine_ready_timeout: self
                .engine_ready_timeout
                .unwrap_or(DEFAULT_ENGINE_READY_TIMEOUT),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            file_system,
            error_sink: self
                .error_sink
                .unwrap_or_else(|| Arc::new(TracingErrorSink)),
            metadata_provider: self.metadata_provider,
            logger_sink: self.logger_sink,
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}
