//! Local file system data source
//!
//! Serves items from a directory tree mounted at a root path. Locators are
//! file paths; relative paths are resolved against the mount root.

use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use core_async::io::BoxedReader;
use core_metadata::sniff;
use core_playback::{
    strategy_for, BrowsableSource, CacheRegistry, DataSource, ErrorReporter, ItemResolver,
    OwnerId, PlayItem, PlaybackError,
};
use core_runtime::config::CoreConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{LocalSourceError, Result};

/// Data source over a local directory tree
///
/// # Discovery
///
/// 1. The locator must name an existing regular file
/// 2. A bounded prefix (`sniff_prefix_bytes`) is read and sniffed for its
///    MIME type, falling back to the file extension
/// 3. The configured metadata provider enriches the item (best-effort)
/// 4. The item is registered in this source's [`CacheRegistry`]
///
/// # Example
///
/// ```ignore
/// use provider_local::LocalDataSource;
/// use core_playback::DataSource;
///
/// let source = LocalDataSource::new("/home/me/Music", &config);
/// let item = source.discover_item("albums/track.flac").await?;
/// let item = source.cache_item(&item).await?;
/// ```
pub struct LocalDataSource {
    mount: PathBuf,
    owner: OwnerId,
    config: CoreConfig,
    registry: CacheRegistry,
    reporter: ErrorReporter,
}

impl LocalDataSource {
    pub fn new(mount: impl Into<PathBuf>, config: &CoreConfig) -> Self {
        let mount = mount.into();
        let owner = OwnerId::unique("local");
        let registry = CacheRegistry::new(owner.clone(), Arc::clone(&config.error_sink));
        let reporter = ErrorReporter::new(owner.as_str(), Arc::clone(&config.error_sink));

        info!(mount = %mount.display(), owner = %owner, "Local data source mounted");
        Self {
            mount,
            owner,
            config: config.clone(),
            registry,
            reporter,
        }
    }

    pub fn mount(&self) -> &Path {
        &self.mount
    }

    /// Absolute path for `path`. An empty path is the mount root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            return self.mount.clone();
        }
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.mount.join(path)
        }
    }

    fn locator_for(&self, path: &str) -> String {
        self.resolve(path).to_string_lossy().into_owned()
    }

    fn fs(&self) -> &dyn FileSystemAccess {
        self.config.file_system.as_ref()
    }

    /// `Some(is_directory)` for existing entries, `None` for missing ones.
    async fn entry_kind(&self, path: &Path) -> Result<Option<bool>> {
        match self.fs().metadata(path).await {
            Ok(metadata) => Ok(Some(metadata.is_directory)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn ensure_file(&self, path: &Path) -> Result<()> {
        match self.entry_kind(path).await? {
            Some(false) => Ok(()),
            _ => Err(LocalSourceError::FileNotFound(path.display().to_string())),
        }
    }

    /// Entries directly under `dir`, split by kind and sorted.
    async fn list(&self, dir: &Path, directories: bool) -> Result<Vec<PathBuf>> {
        if self.entry_kind(dir).await? != Some(true) {
            return Err(LocalSourceError::DirectoryNotFound(dir.display().to_string()));
        }

        let mut selected = Vec::new();
        for entry in self.fs().list_directory(dir).await? {
            match self.entry_kind(&entry).await? {
                Some(is_directory) if is_directory == directories => selected.push(entry),
                Some(_) => {}
                // Removed between listing and inspection
                None => debug!(entry = %entry.display(), "Skipping vanished entry"),
            }
        }
        selected.sort();
        Ok(selected)
    }

    /// Best-effort enrichment through the configured metadata provider.
    async fn enrich(&self, item: &PlayItem, path: &Path) {
        if !self.config.features.enable_metadata_enrichment {
            return;
        }
        let Some(provider) = &self.config.metadata_provider else {
            return;
        };
        if let Some(mime_type) = item.info().mime_type {
            if !provider.supports(&mime_type) {
                debug!(%mime_type, "Metadata provider does not handle this type");
                return;
            }
        }

        match provider.extract(path).await {
            Ok(mut metadata) => {
                if !self.config.features.enable_thumbnails {
                    metadata.artwork = None;
                }
                item.apply_metadata(metadata);
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "Metadata enrichment failed");
            }
        }
    }

    async fn build_item(&self, locator: &str) -> Result<PlayItem> {
        let path = Path::new(locator);
        self.ensure_file(path).await?;

        let prefix = self
            .fs()
            .read_prefix(path, self.config.sniff_prefix_bytes)
            .await?;
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        let sniffed = sniff(&prefix, extension.as_deref());

        let item = PlayItem::new(locator, self.owner.clone(), strategy_for(&self.config));
        item.update_info(|info| match sniffed {
            Some(sniffed) => {
                info.mime_type = Some(sniffed.mime_type);
                info.extension = Some(sniffed.extension);
            }
            None => info.extension = extension,
        });
        self.enrich(&item, path).await;

        debug!(
            title = %item.title(),
            mime_type = ?item.info().mime_type,
            sniffed_bytes = prefix.len(),
            "Built item"
        );
        Ok(item)
    }

    async fn browse(
        &self,
        operation: &str,
        path: &str,
        directories: bool,
        extensions: &[&str],
    ) -> core_playback::Result<Vec<PathBuf>> {
        let dir = self.resolve(path);
        let result = self.list(&dir, directories).await.map(|entries| {
            if extensions.is_empty() {
                return entries;
            }
            entries
                .into_iter()
                .filter(|entry| matches_extension(entry, extensions))
                .collect()
        });

        let mut context = vec![dir.display().to_string()];
        if !extensions.is_empty() {
            context.push(extensions.join(", "));
        }
        self.reporter
            .check(operation, &context, result.map_err(PlaybackError::from))
    }
}

/// Case-insensitive match against extensions given with or without the dot.
fn matches_extension(path: &Path, extensions: &[&str]) -> bool {
    let Some(extension) = path.extension().map(|ext| ext.to_string_lossy()) else {
        return false;
    };
    extensions
        .iter()
        .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(&extension))
}

#[async_trait]
impl ItemResolver for LocalDataSource {
    async fn resolves(&self, locator: &str) -> bool {
        self.ensure_file(Path::new(locator)).await.is_ok()
    }

    async fn resolve_item(&self, locator: &str) -> core_playback::Result<PlayItem> {
        Ok(self.build_item(locator).await?)
    }
}

#[async_trait]
impl DataSource for LocalDataSource {
    fn owner_id(&self) -> &OwnerId {
        &self.owner
    }

    fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    #[instrument(skip(self), fields(owner = %self.owner))]
    async fn discover_item(&self, locator: &str) -> core_playback::Result<Arc<PlayItem>> {
        let locator = self.locator_for(locator);
        self.registry.discover(&locator, self).await
    }

    #[instrument(skip(self, item), fields(owner = %self.owner, locator = item.locator()))]
    async fn cache_item(&self, item: &Arc<PlayItem>) -> core_playback::Result<Arc<PlayItem>> {
        self.registry.cache(item, self).await
    }

    async fn remove_item(&self, item: &PlayItem) -> core_playback::Result<bool> {
        self.registry.remove_item(item).await
    }

    async fn open_stream(&self, locator: &str) -> core_playback::Result<BoxedReader> {
        let path = self.resolve(locator);
        let result = async {
            self.ensure_file(&path).await?;
            Ok::<_, LocalSourceError>(self.fs().open_read_stream(&path).await?)
        }
        .await;
        self.reporter.check(
            "open_stream",
            &[path.display().to_string()],
            result.map_err(PlaybackError::from),
        )
    }

    async fn read_range(&self, locator: &str, offset: u64, length: usize) -> core_playback::Result<Bytes> {
        let path = self.resolve(locator);
        let result = self
            .fs()
            .read_range(&path, offset, length)
            .await
            .map_err(|error: BridgeError| PlaybackError::from(LocalSourceError::from(error)));
        self.reporter.check(
            "read_range",
            &[path.display().to_string(), offset.to_string(), length.to_string()],
            result,
        )
    }
}

#[async_trait]
impl BrowsableSource for LocalDataSource {
    async fn directories(&self, path: &str) -> core_playback::Result<Vec<PathBuf>> {
        self.browse("get_directories", path, true, &[]).await
    }

    async fn files(&self, path: &str, extensions: &[&str]) -> core_playback::Result<Vec<PathBuf>> {
        self.browse("get_files", path, false, extensions).await
    }
}

impl std::fmt::Debug for LocalDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDataSource")
            .field("mount", &self.mount)
            .field("owner", &self.owner)
            .field("registry", &self.registry)
            .finish()
    }
}
