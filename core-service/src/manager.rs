//! The [`MediaManager`] façade.
//!
//! Hosts register data sources and backends once, then drive playback by
//! owner id, locator and channel id. Every event of every registered
//! component is mirrored onto one [`EventBus<CoreEvent>`].
//!
//! Channel operations are routed to the backends associated with the
//! channel: transport commands reach each distinct backend holding a role,
//! volume and devices go to the audio role, stream selection to the role
//! rendering that stream kind.

use bridge_traits::report::ErrorReport;
use bridge_traits::{OutputDevice, StreamKind};
use core_playback::{
    BackendId, BackendRole, BackendService, Capability, Channel, ChannelId, ChannelState,
    CoreEvent, DataSource, EndedCallback, OwnerId, PlayItem, PlaybackError, SelectableStream,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{CoreError, Result};

const COMPONENT: &str = "media-manager";

/// Entry point for host applications.
pub struct MediaManager {
    config: CoreConfig,
    bus: EventBus<CoreEvent>,
    sources: RwLock<HashMap<OwnerId, Arc<dyn DataSource>>>,
    backends: RwLock<HashMap<BackendId, Arc<dyn BackendService>>>,
    channels: RwLock<HashMap<ChannelId, Arc<Channel>>>,
    /// Items whose cache events are already mirrored onto the bus.
    forwarded: Mutex<HashMap<(OwnerId, String), Weak<PlayItem>>>,
    shut_down: AtomicBool,
}

impl MediaManager {
    pub fn new(config: CoreConfig) -> Self {
        let bus = EventBus::new(config.event_buffer_size);
        info!(cache_mode = ?config.cache_mode, "Media manager ready");
        Self {
            config,
            bus,
            sources: RwLock::new(HashMap::new()),
            backends: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
            forwarded: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The bus every component event is mirrored onto.
    pub fn events(&self) -> &EventBus<CoreEvent> {
        &self.bus
    }

    pub fn subscribe(&self) -> EventStream<CoreEvent> {
        self.bus.stream()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    pub fn register_source(&self, source: Arc<dyn DataSource>) -> Result<OwnerId> {
        let result = self.ensure_running().and_then(|()| {
            let owner = source.owner_id().clone();
            let mut sources = self.sources.write();
            if sources.contains_key(&owner) {
                return Err(CoreError::AlreadyRegistered(owner.to_string()));
            }
            sources.insert(owner.clone(), source);
            info!(%owner, "Registered data source");
            Ok(owner)
        });
        self.check("register_source", &[], result)
    }

    pub fn register_backend(&self, backend: Arc<dyn BackendService>) -> Result<BackendId> {
        let result = self.ensure_running().and_then(|()| {
            let id = backend.id();
            let mut backends = self.backends.write();
            if backends.contains_key(&id) {
                return Err(CoreError::AlreadyRegistered(backend.name().to_string()));
            }
            backend.events().forward_to(&self.bus, CoreEvent::Backend);
            info!(backend = backend.name(), %id, roles = ?backend.roles(), "Registered backend");
            backends.insert(id, backend);
            Ok(id)
        });
        self.check("register_backend", &[], result)
    }

    /// Mounts a local directory tree as a data source.
    #[cfg(feature = "local-source")]
    pub async fn mount_local(&self, root: impl Into<std::path::PathBuf>) -> Result<OwnerId> {
        let root = root.into();
        let result: Result<()> = match self.config.file_system.metadata(&root).await {
            Ok(metadata) if metadata.is_directory => Ok(()),
            Ok(_) => Err(PlaybackError::SourceNotFound(root.display().to_string()).into()),
            Err(error) if error.is_not_found() => {
                Err(PlaybackError::SourceNotFound(root.display().to_string()).into())
            }
            Err(error) => Err(PlaybackError::Bridge(error).into()),
        };
        if let Err(error) = result {
            // Not raised by any component, so reported here.
            let report = ErrorReport::new(COMPONENT, "mount_local", error.to_string())
                .with_context(root.display());
            self.config.error_sink.report(&report);
            return Err(error);
        }

        let source = provider_local::LocalDataSource::new(root, &self.config);
        self.register_source(Arc::new(source))
    }

    pub fn source(&self, owner: &OwnerId) -> Result<Arc<dyn DataSource>> {
        self.sources
            .read()
            .get(owner)
            .cloned()
            .ok_or_else(|| CoreError::UnknownSource(owner.clone()))
    }

    pub fn backend(&self, id: BackendId) -> Result<Arc<dyn BackendService>> {
        self.backends
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::UnknownBackend(id))
    }

    /// Registered backends able to provide `capability`.
    pub fn backends_supporting(&self, capability: Capability) -> Vec<BackendId> {
        let mut ids: Vec<_> = self
            .backends
            .read()
            .values()
            .filter(|backend| backend.supports(capability))
            .map(|backend| backend.id())
            .collect();
        ids.sort();
        ids
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// Discovers `locator` through the source `owner` and caches it.
    ///
    /// Cache events of the item are mirrored onto the bus, once per item.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn prepare(&self, owner: &OwnerId, locator: &str) -> Result<Arc<PlayItem>> {
        let result = self.prepare_inner(owner, locator).await;
        self.check("prepare", &[owner.to_string(), locator.to_string()], result)
    }

    async fn prepare_inner(&self, owner: &OwnerId, locator: &str) -> Result<Arc<PlayItem>> {
        self.ensure_running()?;
        let source = self.source(owner)?;

        let item = source.discover_item(locator).await?;
        self.forward_cache_events(owner, &item);
        let item = source.cache_item(&item).await?;

        debug!(locator = item.locator(), state = ?item.cache_state(), "Prepared item");
        Ok(item)
    }

    fn forward_cache_events(&self, owner: &OwnerId, item: &Arc<PlayItem>) {
        let key = (owner.clone(), item.locator().to_string());
        let mut forwarded = self.forwarded.lock();
        let known = forwarded.get(&key).and_then(Weak::upgrade);
        if known.is_some_and(|known| Arc::ptr_eq(&known, item)) {
            return;
        }
        item.events().forward_to(&self.bus, CoreEvent::Cache);
        forwarded.insert(key, Arc::downgrade(item));
    }

    /// Drops the item for `locator` from the source `owner`.
    pub async fn release_item(&self, owner: &OwnerId, locator: &str) -> Result<bool> {
        let result = match self.source(owner) {
            Ok(source) => {
                self.forwarded
                    .lock()
                    .remove(&(owner.clone(), locator.to_string()));
                Ok(source.registry().remove(locator).await)
            }
            Err(error) => Err(error),
        };
        self.check("release_item", &[owner.to_string(), locator.to_string()], result)
    }

    // ========================================================================
    // Channels
    // ========================================================================

    /// Creates a channel for a cached item on `backend`.
    #[instrument(skip(self, item, on_ended), fields(locator = item.locator()))]
    pub async fn open_channel(
        &self,
        backend: BackendId,
        item: Arc<PlayItem>,
        on_ended: Option<EndedCallback>,
    ) -> Result<Arc<Channel>> {
        let context = [backend.to_string(), item.locator().to_string()];
        let result = async {
            self.ensure_running()?;
            let backend = self.backend(backend)?;
            let channel = backend.create_channel(item, on_ended).await?;
            self.channels
                .write()
                .insert(channel.id(), Arc::clone(&channel));
            Ok(channel)
        }
        .await;
        self.check("open_channel", &context, result)
    }

    /// Hands `role` of `channel` to `backend`.
    ///
    /// A role held by another backend is released by its holder first. If
    /// the new backend cannot take it, the previous holder claims it back.
    pub async fn associate(&self, channel: ChannelId, role: BackendRole, backend: BackendId) -> Result<()> {
        let result = async {
            let channel = self.channel(channel)?;
            let grantee = self.backend(backend)?;
            let previous = match channel.backend_for(role) {
                Some(holder) if holder != backend => Some(self.backend(holder)?),
                _ => None,
            };

            let Some(previous) = previous else {
                grantee.associate(&channel, role).await?;
                return Ok(());
            };

            previous.release_role(&channel, role).await?;
            if let Err(error) = grantee.associate(&channel, role).await {
                if let Err(restore) = previous.associate(&channel, role).await {
                    warn!(channel = %channel.id(), ?role, error = %restore, "Previous holder could not reclaim role");
                }
                return Err(error.into());
            }
            debug!(channel = %channel.id(), ?role, from = previous.name(), to = grantee.name(), "Role handed over");
            Ok(())
        }
        .await;
        self.check("associate", &[channel.to_string(), format!("{role:?}")], result)
    }

    pub fn channel(&self, id: ChannelId) -> Result<Arc<Channel>> {
        self.channels
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::UnknownChannel(id))
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.channels.read().keys().copied().collect()
    }

    /// The backend holding `role` on `channel`.
    pub fn backend_for(&self, channel: ChannelId, role: BackendRole) -> Result<Arc<dyn BackendService>> {
        let id = self
            .channel(channel)?
            .backend_for(role)
            .ok_or(CoreError::RoleUnassigned { channel, role })?;
        self.backend(id)
    }

    /// Distinct backends of `channel` in role order.
    fn transport_backends(&self, channel: &Channel) -> Result<Vec<Arc<dyn BackendService>>> {
        let mut ids: Vec<BackendId> = Vec::new();
        for role in BackendRole::ALL {
            if let Some(id) = channel.backend_for(role) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        if ids.is_empty() {
            return Err(CoreError::RoleUnassigned {
                channel: channel.id(),
                role: BackendRole::Audio,
            });
        }
        ids.into_iter().map(|id| self.backend(id)).collect()
    }

    /// Audio role backend, or the first backend of the channel.
    fn output_backend(&self, channel: &Channel) -> Result<Arc<dyn BackendService>> {
        match channel.backend_for(BackendRole::Audio) {
            Some(id) => self.backend(id),
            None => self
                .transport_backends(channel)?
                .into_iter()
                .next()
                .ok_or(CoreError::RoleUnassigned {
                    channel: channel.id(),
                    role: BackendRole::Audio,
                }),
        }
    }

    async fn transport(&self, operation: &'static str, id: ChannelId, state: ChannelState) -> Result<()> {
        let result = async {
            self.ensure_running()?;
            let channel = self.channel(id)?;
            for backend in self.transport_backends(&channel)? {
                match state {
                    ChannelState::Playing if operation == "play" => backend.play(&channel).await?,
                    ChannelState::Playing => backend.resume(&channel).await?,
                    ChannelState::Paused => backend.pause(&channel).await?,
                    ChannelState::Stopped => backend.stop(&channel).await?,
                }
            }
            Ok(())
        }
        .await;
        self.check(operation, &[id.to_string()], result)
    }

    pub async fn play(&self, channel: ChannelId) -> Result<()> {
        self.transport("play", channel, ChannelState::Playing).await
    }

    pub async fn pause(&self, channel: ChannelId) -> Result<()> {
        self.transport("pause", channel, ChannelState::Paused).await
    }

    pub async fn resume(&self, channel: ChannelId) -> Result<()> {
        self.transport("resume", channel, ChannelState::Playing).await
    }

    pub async fn stop(&self, channel: ChannelId) -> Result<()> {
        self.transport("stop", channel, ChannelState::Stopped).await
    }

    pub async fn position(&self, id: ChannelId) -> Result<Duration> {
        let result = async {
            let channel = self.channel(id)?;
            let backend = self.output_backend(&channel)?;
            Ok(backend.position(&channel).await?)
        }
        .await;
        self.check("position", &[id.to_string()], result)
    }

    pub async fn seek(&self, id: ChannelId, position: Duration) -> Result<()> {
        let result = async {
            let channel = self.channel(id)?;
            for backend in self.transport_backends(&channel)? {
                backend.set_position(&channel, position).await?;
            }
            Ok(())
        }
        .await;
        self.check("seek", &[id.to_string()], result)
    }

    pub async fn volume(&self, id: ChannelId) -> Result<f32> {
        let result = async {
            let channel = self.channel(id)?;
            let backend = self.output_backend(&channel)?;
            Ok(backend.volume(&channel).await?)
        }
        .await;
        self.check("volume", &[id.to_string()], result)
    }

    pub async fn set_volume(&self, id: ChannelId, volume: f32) -> Result<()> {
        let result = async {
            let channel = self.channel(id)?;
            self.output_backend(&channel)?
                .set_volume(&channel, volume)
                .await?;
            Ok(())
        }
        .await;
        self.check("set_volume", &[id.to_string(), volume.to_string()], result)
    }

    pub async fn devices(&self, id: ChannelId) -> Result<Vec<OutputDevice>> {
        let result = async {
            let channel = self.channel(id)?;
            Ok(self.output_backend(&channel)?.devices(&channel).await?)
        }
        .await;
        self.check("devices", &[id.to_string()], result)
    }

    pub async fn set_device(&self, id: ChannelId, device_id: &str) -> Result<()> {
        let result = async {
            let channel = self.channel(id)?;
            self.output_backend(&channel)?
                .set_device(&channel, device_id)
                .await?;
            Ok(())
        }
        .await;
        self.check("set_device", &[id.to_string(), device_id.to_string()], result)
    }

    fn role_for(kind: StreamKind) -> BackendRole {
        match kind {
            StreamKind::Audio => BackendRole::Audio,
            StreamKind::Video => BackendRole::Video,
            StreamKind::Subtitle => BackendRole::Subtitle,
        }
    }

    fn unsupported_selection(backend: &dyn BackendService, kind: StreamKind) -> CoreError {
        PlaybackError::UnsupportedCapability(format!(
            "{} cannot select {kind} streams",
            backend.name()
        ))
        .into()
    }

    pub async fn selectable_streams(&self, id: ChannelId, kind: StreamKind) -> Result<Vec<SelectableStream>> {
        let result = async {
            let channel = self.channel(id)?;
            let backend = self.backend_for(id, Self::role_for(kind))?;
            let selection = backend
                .stream_selection(kind)
                .ok_or_else(|| Self::unsupported_selection(backend.as_ref(), kind))?;
            Ok(selection.selectable_streams(&channel).await?)
        }
        .await;
        self.check("selectable_streams", &[id.to_string(), kind.to_string()], result)
    }

    pub async fn select_stream(&self, id: ChannelId, kind: StreamKind, stream: Option<i32>) -> Result<()> {
        let result = async {
            let channel = self.channel(id)?;
            let backend = self.backend_for(id, Self::role_for(kind))?;
            let selection = backend
                .stream_selection(kind)
                .ok_or_else(|| Self::unsupported_selection(backend.as_ref(), kind))?;
            selection.set_selected_stream(&channel, stream).await?;
            Ok(())
        }
        .await;
        self.check("select_stream", &[id.to_string(), kind.to_string()], result)
    }

    /// Destroys a channel. Returns `false` if it was already closed.
    pub async fn close_channel(&self, id: ChannelId) -> Result<bool> {
        let result = async {
            let channel = self.channel(id)?;
            let backend = self
                .transport_backends(&channel)?
                .into_iter()
                .next()
                .ok_or(CoreError::UnknownChannel(id))?;
            let destroyed = backend.destroy_channel(&channel).await?;
            self.channels.write().remove(&id);
            Ok(destroyed)
        }
        .await;
        self.check("close_channel", &[id.to_string()], result)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Destroys every channel and empties every registry.
    ///
    /// Failures are logged and do not stop the shutdown. Later calls do
    /// nothing.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let channels: Vec<_> = self.channels.write().drain().map(|(_, channel)| channel).collect();
        for channel in channels {
            let backend = match self.transport_backends(&channel) {
                Ok(backends) => backends.into_iter().next(),
                Err(error) => {
                    warn!(channel = %channel.id(), %error, "Channel has no backend to close it");
                    None
                }
            };
            if let Some(backend) = backend {
                if let Err(error) = backend.destroy_channel(&channel).await {
                    warn!(channel = %channel.id(), %error, "Failed to destroy channel");
                }
            }
        }

        let sources: Vec<_> = self.sources.read().values().cloned().collect();
        for source in sources {
            let registry = source.registry();
            for locator in registry.locators() {
                registry.remove(&locator).await;
            }
        }
        self.forwarded.lock().clear();

        info!("Media manager shut down");
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(CoreError::ShutDown);
        }
        Ok(())
    }

    /// Reports errors raised by the manager itself. Component errors were
    /// reported where they happened.
    fn check<T>(&self, operation: &str, context: &[String], result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            if error.is_local() {
                let report = context.iter().fold(
                    ErrorReport::new(COMPONENT, operation, error.to_string()),
                    |report, value| report.with_context(value),
                );
                self.config.error_sink.report(&report);
            }
        }
        result
    }
}

impl std::fmt::Debug for MediaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaManager")
            .field("sources", &self.sources.read().len())
            .field("backends", &self.backends.read().len())
            .field("channels", &self.channels.read().len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::report::ErrorSink;
    use core_playback::testing::MemoryFileSystem;
    use mockall::mock;
    use mockall::predicate::function;

    mock! {
        Sink {}
        impl ErrorSink for Sink {
            fn report(&self, report: &ErrorReport);
        }
    }

    fn manager(sink: MockSink) -> MediaManager {
        let config = CoreConfig::builder()
            .cache_dir("/cache")
            .file_system(Arc::new(MemoryFileSystem::new()))
            .error_sink(Arc::new(sink))
            .build()
            .unwrap();
        MediaManager::new(config)
    }

    #[test]
    fn role_for_stream_kind_round_trips() {
        for kind in StreamKind::ALL {
            assert_eq!(MediaManager::role_for(kind).stream_kind(), kind);
        }
    }

    #[tokio::test]
    async fn unknown_ids_are_reported() {
        let mut sink = MockSink::new();
        sink.expect_report()
            .with(function(|report: &ErrorReport| {
                report.component == COMPONENT && report.operation == "play"
            }))
            .times(1)
            .return_const(());
        let manager = manager(sink);

        let error = manager.play(ChannelId::new()).await.unwrap_err();
        assert!(matches!(error, CoreError::UnknownChannel(_)));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_final() {
        let mut sink = MockSink::new();
        sink.expect_report().times(1).return_const(());
        let manager = manager(sink);

        manager.shutdown().await;
        manager.shutdown().await;
        assert!(manager.is_shut_down());

        let error = manager
            .prepare(&OwnerId::new("local#1"), "/music/a.flac")
            .await
            .unwrap_err();
        assert!(matches!(error, CoreError::ShutDown));
    }
}
