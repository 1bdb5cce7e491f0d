//! # Engine Backend
//!
//! [`EngineBackend`] adapts any [`MediaEngine`] to the [`BackendService`]
//! contract. It holds every role its engine supports and implements all
//! three stream-selection facets the engine can render.
//!
//! ## Active Slot
//!
//! The engine plays one media at a time. The backend records which channel
//! owns the engine in a single slot guarded by an async mutex. `play` swaps
//! the slot to the requesting channel; `pause`, `resume` and `stop` require
//! the channel to already own it. Locks are always taken channel first, then
//! slot, and events are emitted after both are released.
//!
//! ## Readiness
//!
//! Commands are confirmed through the engine event stream. The backend
//! subscribes before issuing a command, then waits for the matching event,
//! bounded by `engine_ready_timeout`. A pending play is also interrupted by
//! a stop or destroy of the same channel.

use async_trait::async_trait;
use bridge_traits::{
    EngineCapabilities, EngineEvent, EngineState, EngineTrack, MediaEngine, MediaHandle,
    MediaInput, OutputDevice, ParsedMedia, StreamKind,
};
use core_async::sync::broadcast::error::RecvError;
use core_async::sync::broadcast::Receiver;
use core_async::sync::{CancellationToken, Mutex as AsyncMutex};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventHandlers;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{
    bootstrap, BackendId, BackendRole, BackendService, Capability, Roles, SelectableStream,
    StreamSelection,
};
use crate::channel::{Channel, ChannelId, ChannelState, EndedCallback, UNSELECTED_STREAM};
use crate::error::{PlaybackError, Result};
use crate::events::BackendEvent;
use crate::item::PlayItem;
use crate::report::ErrorReporter;

type ActiveSlot = Option<(ChannelId, Weak<Channel>)>;

/// Normalized `[0, 1]` volume to the engine's `0..=100`.
fn to_native_volume(volume: f32) -> u8 {
    (volume * 100.0).round().clamp(0.0, 100.0) as u8
}

fn from_native_volume(volume: u8) -> f32 {
    f32::from(volume.min(100)) / 100.0
}

fn engine_state_for(state: ChannelState) -> EngineState {
    match state {
        ChannelState::Playing => EngineState::Playing,
        ChannelState::Paused => EngineState::Paused,
        ChannelState::Stopped => EngineState::Stopped,
    }
}

fn stream_name(track: &EngineTrack) -> String {
    match (&track.language, &track.description) {
        (Some(language), Some(description)) => format!("[{language}] {description}"),
        (None, Some(description)) => description.clone(),
        (Some(language), None) => format!("[{language}]"),
        (None, None) => format!("Track {}", track.id),
    }
}

fn supports(capabilities: EngineCapabilities, capability: Capability) -> bool {
    let kind_supported = |kind: StreamKind| match kind {
        StreamKind::Audio => capabilities.audio,
        StreamKind::Video => capabilities.video,
        StreamKind::Subtitle => capabilities.subtitles,
    };
    match capability {
        Capability::AudioOutput => capabilities.audio,
        Capability::VideoRendering => capabilities.video,
        Capability::SubtitleRendering => capabilities.subtitles,
        Capability::StreamSelection(kind) => kind_supported(kind),
    }
}

struct EngineInner<E> {
    id: BackendId,
    name: String,
    engine: E,
    capabilities: EngineCapabilities,
    ready_timeout: Duration,
    active: AsyncMutex<ActiveSlot>,
    events: EventHandlers<BackendEvent>,
    reporter: ErrorReporter,
}

/// A backend driving one native [`MediaEngine`].
pub struct EngineBackend<E> {
    inner: Arc<EngineInner<E>>,
    selectors: [EngineStreamSelector<E>; 3],
}

/// Stream-selection facet of an [`EngineBackend`] for one stream kind.
pub struct EngineStreamSelector<E> {
    kind: StreamKind,
    inner: Arc<EngineInner<E>>,
}

impl<E> EngineBackend<E>
where
    E: MediaEngine + 'static,
{
    /// Wraps `engine`. Fails with
    /// [`NotInitialized`](PlaybackError::NotInitialized) until
    /// [`bootstrap::initialize`] has run.
    pub fn new(engine: E, config: &CoreConfig) -> Result<Self> {
        bootstrap::ensure_initialized(engine.name())?;

        let id = BackendId::new();
        let name = format!("{}-backend", engine.name());
        let reporter = ErrorReporter::new(format!("{name}#{id}"), Arc::clone(&config.error_sink));
        let capabilities = engine.capabilities();

        let inner = Arc::new(EngineInner {
            id,
            name,
            engine,
            capabilities,
            ready_timeout: config.engine_ready_timeout,
            active: AsyncMutex::new(None),
            events: EventHandlers::new(),
            reporter,
        });
        let selectors = StreamKind::ALL.map(|kind| EngineStreamSelector {
            kind,
            inner: Arc::clone(&inner),
        });

        info!(backend = %inner.name, id = %id, ?capabilities, "Engine backend ready");
        Ok(Self { inner, selectors })
    }

    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    /// Id of the channel currently loaded in the engine.
    pub async fn active_channel(&self) -> Option<ChannelId> {
        self.inner.active.lock().await.as_ref().map(|(id, _)| *id)
    }
}

impl<E> EngineInner<E>
where
    E: MediaEngine + 'static,
{
    fn context(channel: &Channel) -> [String; 1] {
        [channel.id().to_string()]
    }

    /// Ownership check: the backend must hold a role on a live channel.
    fn check_associated(&self, channel: &Channel) -> Result<()> {
        if !channel.is_associated(self.id) {
            return Err(PlaybackError::ChannelNotAssociated {
                channel: channel.id(),
                backend: self.id,
            });
        }
        if channel.is_closed() {
            return Err(PlaybackError::ChannelClosed(channel.id()));
        }
        Ok(())
    }

    fn holds(slot: &ActiveSlot, channel: &Channel) -> bool {
        matches!(slot, Some((id, _)) if *id == channel.id())
    }

    async fn is_active(&self, channel: &Channel) -> bool {
        Self::holds(&*self.active.lock().await, channel)
    }

    fn roles(&self) -> Vec<BackendRole> {
        BackendRole::ALL
            .into_iter()
            .filter(|role| supports(self.capabilities, role.capability()))
            .collect()
    }

    /// Loads the cached bytes of `item` into the engine.
    async fn load_item(&self, item: &PlayItem) -> Result<(MediaHandle, ParsedMedia)> {
        let state = item.cache_state();
        let not_cached = || PlaybackError::ItemNotCached {
            locator: item.locator().to_string(),
            state,
        };
        if !state.is_cached() {
            return Err(not_cached());
        }

        let input = match state {
            crate::item::CacheState::Memory => item.cached_stream().await.map(MediaInput::Memory),
            _ => item.cached_path().await.map(MediaInput::Path),
        }
        .ok_or_else(not_cached)?;

        debug!(input = %input.describe(), "Loading media");
        let media = self
            .engine
            .load(input)
            .await
            .map_err(PlaybackError::engine("load"))?;

        match self.engine.parse(media).await {
            Ok(parsed) => Ok((media, parsed)),
            Err(error) => {
                if let Err(release_error) = self.engine.release(media).await {
                    warn!(%media, error = %release_error, "Failed to release unparsable media");
                }
                Err(PlaybackError::engine("parse")(error))
            }
        }
    }

    /// Watches the engine for end-of-media of `channel` and releases the
    /// backend's handle once the channel is gone.
    fn spawn_watcher(self: &Arc<Self>, channel: &Arc<Channel>, media: MediaHandle) {
        let inner = Arc::clone(self);
        let weak = Arc::downgrade(channel);
        let lifetime = channel.lifetime().clone();
        let mut events = self.engine.subscribe();

        core_async::task::spawn(async move {
            loop {
                tokio::select! {
                    _ = lifetime.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(EngineEvent::EndReached(ended)) if ended == media => {
                            let Some(channel) = weak.upgrade() else { break };
                            inner.handle_end(&channel).await;
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "End-of-media watcher lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            match weak.upgrade() {
                Some(channel) => inner.release_channel(&channel).await,
                None => inner.release_media(media).await,
            }
        });
    }

    async fn handle_end(&self, channel: &Arc<Channel>) {
        {
            let _ops = channel.lock_ops().await;
            channel.set_state(ChannelState::Stopped);
        }
        info!(channel = %channel.id(), "Reached end of media");

        self.events
            .emit(BackendEvent::ChannelStateChanged {
                channel: channel.id(),
                state: ChannelState::Stopped,
            })
            .await;
        channel.fire_ended();
        self.events.emit_and_forget(BackendEvent::ChannelEnded {
            channel: channel.id(),
        });
    }

    /// Unloads `channel` from the engine if it owns the slot and releases
    /// this backend's handle. Safe to call more than once.
    async fn release_channel(&self, channel: &Channel) {
        {
            let mut slot = self.active.lock().await;
            if Self::holds(&slot, channel) {
                if let Err(error) = self.engine.stop().await {
                    warn!(channel = %channel.id(), %error, "Engine stop failed during release");
                }
                if let Err(error) = self.engine.set_media(None).await {
                    warn!(channel = %channel.id(), %error, "Engine unload failed during release");
                }
                *slot = None;
            }
        }

        if let Some(media) = channel.take_media(self.id) {
            self.release_media(media).await;
        }
    }

    async fn release_media(&self, media: MediaHandle) {
        if let Err(error) = self.engine.release(media).await {
            warn!(%media, %error, "Failed to release media");
        }
    }

    /// Waits for the engine to confirm `expected` for `media`.
    ///
    /// `events` must have been subscribed before the command was issued.
    async fn await_state(
        &self,
        mut events: Receiver<EngineEvent>,
        media: MediaHandle,
        expected: ChannelState,
        cancel: Option<&CancellationToken>,
        channel: ChannelId,
    ) -> Result<()> {
        let target = engine_state_for(expected);

        if self.engine.state() != target {
            let wait = core_async::time::bounded(
                self.ready_timeout,
                self.wait_for_event(&mut events, media, expected),
            );
            let outcome = match cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(PlaybackError::PlaybackCancelled(channel)),
                    outcome = wait => outcome,
                },
                None => wait.await,
            };
            outcome.map_err(|elapsed| PlaybackError::EngineTimeout(elapsed.limit))??;
        }

        let actual = self.engine.state();
        if actual != target {
            return Err(PlaybackError::UnexpectedEngineState { expected, actual });
        }
        Ok(())
    }

    async fn wait_for_event(
        &self,
        events: &mut Receiver<EngineEvent>,
        media: MediaHandle,
        expected: ChannelState,
    ) -> Result<()> {
        loop {
            match events.recv().await {
                Ok(
                    EngineEvent::Playing(seen) | EngineEvent::Paused(seen) | EngineEvent::Stopped(seen),
                ) if seen != media => continue,
                Ok(EngineEvent::Playing(_)) if expected == ChannelState::Playing => return Ok(()),
                Ok(EngineEvent::Paused(_)) if expected == ChannelState::Paused => return Ok(()),
                Ok(EngineEvent::Stopped(_)) if expected == ChannelState::Stopped => return Ok(()),
                Ok(EngineEvent::Error { media: failed, message })
                    if failed.map_or(true, |failed| failed == media) =>
                {
                    return Err(PlaybackError::EngineOperationFailed {
                        operation: "await_state",
                        reason: message,
                    });
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => {
                    if self.engine.state() == engine_state_for(expected) {
                        return Ok(());
                    }
                }
                Err(RecvError::Closed) => {
                    return Err(PlaybackError::EngineOperationFailed {
                        operation: "await_state",
                        reason: "engine event stream closed".to_string(),
                    });
                }
            }
        }
    }

    /// Re-applies stream choices recorded while the channel was inactive.
    async fn apply_selected_streams(&self, channel: &Channel) {
        for kind in StreamKind::ALL {
            if !supports(self.capabilities, Capability::StreamSelection(kind)) {
                continue;
            }
            let selected = channel.selected_stream(kind);
            if selected == UNSELECTED_STREAM {
                continue;
            }
            if let Err(error) = self.engine.select_track(kind, Some(selected)).await {
                warn!(channel = %channel.id(), %kind, selected, %error, "Could not apply stream selection");
            }
        }
    }

    async fn create_channel(
        self: &Arc<Self>,
        item: Arc<PlayItem>,
        on_ended: Option<EndedCallback>,
    ) -> Result<Arc<Channel>> {
        let (media, parsed) = self.load_item(&item).await?;

        let roles = Roles::all_to(self.id, &self.roles());
        let length = parsed.duration.or_else(|| item.duration());
        let channel = Arc::new(Channel::new(item, roles, length, on_ended));
        channel.set_media(self.id, media);
        self.spawn_watcher(&channel, media);

        info!(channel = %channel.id(), tracks = parsed.tracks.len(), "Channel created");
        self.events
            .emit(BackendEvent::ChannelCreated {
                backend: self.id,
                channel: channel.id(),
            })
            .await;
        Ok(channel)
    }

    /// Fails with `RoleHeld` if another backend holds `role`.
    fn check_role_free(&self, channel: &Channel, role: BackendRole) -> Result<()> {
        match channel.backend_for(role) {
            Some(holder) if holder != self.id => Err(PlaybackError::RoleHeld {
                channel: channel.id(),
                role,
                holder,
            }),
            _ => Ok(()),
        }
    }

    async fn associate(self: &Arc<Self>, channel: &Arc<Channel>, role: BackendRole) -> Result<()> {
        if !supports(self.capabilities, role.capability()) {
            return Err(PlaybackError::UnsupportedCapability(format!(
                "{} cannot hold the {role:?} role",
                self.name
            )));
        }
        if channel.is_closed() {
            return Err(PlaybackError::ChannelClosed(channel.id()));
        }
        self.check_role_free(channel, role)?;

        let _ops = channel.lock_ops().await;
        self.check_role_free(channel, role)?;
        if channel.media_for(self.id).is_none() {
            let (media, _) = self.load_item(channel.item()).await?;
            channel.set_media(self.id, media);
            self.spawn_watcher(channel, media);
        }
        channel.assign(role, self.id);
        debug!(channel = %channel.id(), ?role, "Role claimed");
        Ok(())
    }

    async fn release_role(&self, channel: &Arc<Channel>, role: BackendRole) -> Result<bool> {
        self.check_associated(channel)?;

        let stopped = {
            let _ops = channel.lock_ops().await;
            self.check_associated(channel)?;
            if !channel.unassign(role, self.id) {
                return Ok(false);
            }
            debug!(channel = %channel.id(), ?role, "Role released");
            if channel.is_associated(self.id) {
                return Ok(true);
            }

            self.release_channel(channel).await;
            channel.roles().is_empty() && channel.set_state(ChannelState::Stopped) != ChannelState::Stopped
        };

        if stopped {
            self.emit_state(channel, ChannelState::Stopped).await;
        }
        Ok(true)
    }

    async fn destroy_channel(&self, channel: &Arc<Channel>) -> Result<bool> {
        if !channel.is_associated(self.id) {
            return Err(PlaybackError::ChannelNotAssociated {
                channel: channel.id(),
                backend: self.id,
            });
        }
        channel.cancel_pending_play();

        {
            let _ops = channel.lock_ops().await;
            if !channel.close() {
                return Ok(false);
            }
            self.release_channel(channel).await;
        }

        self.events
            .emit(BackendEvent::ChannelDestroyed {
                backend: self.id,
                channel: channel.id(),
            })
            .await;
        Ok(true)
    }

    async fn play(&self, channel: &Arc<Channel>) -> Result<()> {
        self.check_associated(channel)?;

        let swapped = {
            let _ops = channel.lock_ops().await;
            self.check_associated(channel)?;
            let media = channel
                .media_for(self.id)
                .ok_or(PlaybackError::NoActiveMedia)?;

            let (sequence, token) = channel.begin_pending_play();
            let result = self.play_locked(channel, media, &token).await;
            channel.end_pending_play(sequence);
            result?
        };

        if let Some(previous) = swapped {
            self.events
                .emit(BackendEvent::ChannelStateChanged {
                    channel: previous,
                    state: ChannelState::Stopped,
                })
                .await;
        }
        self.emit_state(channel, ChannelState::Playing).await;
        Ok(())
    }

    /// Returns the channel that was swapped out of the slot, if it was not
    /// already stopped.
    async fn play_locked(
        &self,
        channel: &Arc<Channel>,
        media: MediaHandle,
        token: &CancellationToken,
    ) -> Result<Option<ChannelId>> {
        let mut slot = self.active.lock().await;
        let mut swapped = None;

        if !Self::holds(&slot, channel) {
            if let Some(previous) = slot.take().and_then(|(_, previous)| previous.upgrade()) {
                if previous.set_state(ChannelState::Stopped) != ChannelState::Stopped {
                    swapped = Some(previous.id());
                }
            }
            self.engine
                .set_media(Some(media))
                .await
                .map_err(PlaybackError::engine("set_media"))?;
            *slot = Some((channel.id(), Arc::downgrade(channel)));
        }

        self.engine
            .set_volume(to_native_volume(channel.volume()))
            .await
            .map_err(PlaybackError::engine("set_volume"))?;

        let events = self.engine.subscribe();
        self.engine
            .play()
            .await
            .map_err(PlaybackError::engine("play"))?;
        self.await_state(events, media, ChannelState::Playing, Some(token), channel.id())
            .await?;

        self.apply_selected_streams(channel).await;
        channel.set_state(ChannelState::Playing);
        Ok(swapped)
    }

    /// Shared body of pause, resume and stop: the channel must own the slot.
    async fn transition(
        &self,
        channel: &Arc<Channel>,
        expected: ChannelState,
        operation: &'static str,
    ) -> Result<()> {
        self.check_associated(channel)?;
        if expected == ChannelState::Stopped {
            channel.cancel_pending_play();
        }

        {
            let _ops = channel.lock_ops().await;
            self.check_associated(channel)?;
            let slot = self.active.lock().await;
            if !Self::holds(&slot, channel) {
                return Err(PlaybackError::ChannelNotActive(channel.id()));
            }
            let media = channel
                .media_for(self.id)
                .ok_or(PlaybackError::NoActiveMedia)?;

            let events = self.engine.subscribe();
            let command = match expected {
                ChannelState::Paused => self.engine.set_pause(true).await,
                ChannelState::Playing => self.engine.set_pause(false).await,
                ChannelState::Stopped => self.engine.stop().await,
            };
            command.map_err(PlaybackError::engine(operation))?;
            self.await_state(events, media, expected, None, channel.id())
                .await?;

            channel.set_state(expected);
            drop(slot);
        }

        self.emit_state(channel, expected).await;
        Ok(())
    }

    async fn emit_state(&self, channel: &Channel, state: ChannelState) {
        self.events
            .emit(BackendEvent::ChannelStateChanged {
                channel: channel.id(),
                state,
            })
            .await;
    }

    async fn position(&self, channel: &Arc<Channel>) -> Result<Duration> {
        self.check_associated(channel)?;
        if !self.is_active(channel).await {
            return Ok(channel.position());
        }
        let position = self.engine.time().ok_or(PlaybackError::NoActiveMedia)?;
        channel.set_position(position);
        Ok(position)
    }

    /// Seeking needs media in the engine: the channel must own the slot.
    async fn set_position(&self, channel: &Arc<Channel>, position: Duration) -> Result<()> {
        self.check_associated(channel)?;
        {
            let _ops = channel.lock_ops().await;
            let slot = self.active.lock().await;
            if !Self::holds(&slot, channel) {
                return Err(PlaybackError::ChannelNotActive(channel.id()));
            }
            self.engine
                .seek(position)
                .await
                .map_err(PlaybackError::engine("seek"))?;
            channel.set_position(position);
        }

        self.events
            .emit(BackendEvent::ChannelPositionChanged {
                channel: channel.id(),
                position,
            })
            .await;
        Ok(())
    }

    async fn volume(&self, channel: &Arc<Channel>) -> Result<f32> {
        self.check_associated(channel)?;
        if self.is_active(channel).await {
            if let Some(native) = self.engine.volume() {
                if native != to_native_volume(channel.volume()) {
                    channel.set_volume(from_native_volume(native));
                }
            }
        }
        Ok(channel.volume())
    }

    async fn set_volume(&self, channel: &Arc<Channel>, volume: f32) -> Result<()> {
        self.check_associated(channel)?;
        if !volume.is_finite() || !(0.0..=1.0).contains(&volume) {
            return Err(PlaybackError::InvalidVolume(volume));
        }

        {
            let _ops = channel.lock_ops().await;
            if self.is_active(channel).await {
                self.engine
                    .set_volume(to_native_volume(volume))
                    .await
                    .map_err(PlaybackError::engine("set_volume"))?;
            }
            channel.set_volume(volume);
        }

        self.events
            .emit(BackendEvent::ChannelVolumeChanged {
                channel: channel.id(),
                volume,
            })
            .await;
        Ok(())
    }

    async fn devices(&self, channel: &Arc<Channel>) -> Result<Vec<OutputDevice>> {
        self.check_associated(channel)?;
        self.engine
            .output_devices()
            .await
            .map_err(PlaybackError::engine("output_devices"))
    }

    async fn set_device(&self, channel: &Arc<Channel>, device_id: &str) -> Result<()> {
        let devices = self.devices(channel).await?;
        if !devices.iter().any(|device| device.id == device_id) {
            return Err(PlaybackError::DeviceNotFound(device_id.to_string()));
        }

        self.engine
            .set_output_device(device_id)
            .await
            .map_err(PlaybackError::engine("set_output_device"))?;

        self.events
            .emit(BackendEvent::GlobalDeviceChanged {
                backend: self.id,
                device: device_id.to_string(),
            })
            .await;
        Ok(())
    }

    async fn selectable_streams(
        &self,
        channel: &Arc<Channel>,
        kind: StreamKind,
    ) -> Result<Vec<SelectableStream>> {
        self.check_associated(channel)?;
        let media = channel
            .media_for(self.id)
            .ok_or(PlaybackError::NoActiveMedia)?;

        let tracks = self
            .engine
            .tracks(media, kind)
            .await
            .map_err(PlaybackError::engine("tracks"))?;

        Ok(tracks
            .iter()
            .map(|track| SelectableStream {
                index: track.id,
                kind,
                name: stream_name(track),
                language: track.language.clone(),
            })
            .collect())
    }

    async fn set_selected_stream(
        &self,
        channel: &Arc<Channel>,
        kind: StreamKind,
        stream: Option<i32>,
    ) -> Result<()> {
        self.check_associated(channel)?;
        {
            let _ops = channel.lock_ops().await;
            if self.is_active(channel).await {
                self.engine
                    .select_track(kind, stream)
                    .await
                    .map_err(PlaybackError::engine("select_track"))?;
            } else {
                debug!(channel = %channel.id(), %kind, ?stream, "Recorded selection for next play");
            }
            channel.select_stream(kind, stream);
        }

        self.events
            .emit(BackendEvent::SelectedStreamChanged {
                channel: channel.id(),
                kind,
                stream,
            })
            .await;
        Ok(())
    }
}

#[async_trait]
impl<E> BackendService for EngineBackend<E>
where
    E: MediaEngine + 'static,
{
    fn id(&self) -> BackendId {
        self.inner.id
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn supports(&self, capability: Capability) -> bool {
        supports(self.inner.capabilities, capability)
    }

    fn stream_selection(&self, kind: StreamKind) -> Option<&dyn StreamSelection> {
        if !self.supports(Capability::StreamSelection(kind)) {
            return None;
        }
        self.selectors
            .iter()
            .find(|selector| selector.kind == kind)
            .map(|selector| selector as &dyn StreamSelection)
    }

    fn events(&self) -> &EventHandlers<BackendEvent> {
        &self.inner.events
    }

    #[instrument(skip(self, item, on_ended), fields(backend = %self.inner.name, locator = item.locator()))]
    async fn create_channel(
        &self,
        item: Arc<PlayItem>,
        on_ended: Option<EndedCallback>,
    ) -> Result<Arc<Channel>> {
        let context = [item.locator().to_string()];
        let result = self.inner.create_channel(item, on_ended).await;
        self.inner.reporter.check("create_channel", &context, result)
    }

    #[instrument(skip(self, channel), fields(channel = %channel.id()))]
    async fn associate(&self, channel: &Arc<Channel>, role: BackendRole) -> Result<()> {
        let result = self.inner.associate(channel, role).await;
        self.inner
            .reporter
            .check("associate", &EngineInner::<E>::context(channel), result)
    }

    #[instrument(skip(self, channel), fields(channel = %channel.id()))]
    async fn release_role(&self, channel: &Arc<Channel>, role: BackendRole) -> Result<bool> {
        let result = self.inner.release_role(channel, role).await;
        let context = [channel.id().to_string(), format!("{role:?}")];
        self.inner.reporter.check("release_role", &context, result)
    }

    #[instrument(skip(self, channel), fields(channel = %channel.id()))]
    async fn destroy_channel(&self, channel: &Arc<Channel>) -> Result<bool> {
        let result = self.inner.destroy_channel(channel).await;
        self.inner
            .reporter
            .check("destroy_channel", &EngineInner::<E>::context(channel), result)
    }

    #[instrument(skip(self, channel), fields(channel = %channel.id()))]
    async fn play(&self, channel: &Arc<Channel>) -> Result<()> {
        let result = self.inner.play(channel).await;
        self.inner
            .reporter
            .check("play", &EngineInner::<E>::context(channel), result)
    }

    #[instrument(skip(self, channel), fields(channel = %channel.id()))]
    async fn pause(&self, channel: &Arc<Channel>) -> Result<()> {
        let result = self
            .inner
            .transition(channel, ChannelState::Paused, "pause")
            .await;
        self.inner
            .reporter
            .check("pause", &EngineInner::<E>::context(channel), result)
    }

    #[instrument(skip(self, channel), fields(channel = %channel.id()))]
    async fn resume(&self, channel: &Arc<Channel>) -> Result<()> {
        let result = self
            .inner
            .transition(channel, ChannelState::Playing, "resume")
            .await;
        self.inner
            .reporter
            .check("resume", &EngineInner::<E>::context(channel), result)
    }

    #[instrument(skip(self, channel), fields(channel = %channel.id()))]
    async fn stop(&self, channel: &Arc<Channel>) -> Result<()> {
        let result = self
            .inner
            .transition(channel, ChannelState::Stopped, "stop")
            .await;
        self.inner
            .reporter
            .check("stop", &EngineInner::<E>::context(channel), result)
    }

    async fn state(&self, channel: &Arc<Channel>) -> Result<ChannelState> {
        let result = self
            .inner
            .check_associated(channel)
            .map(|()| channel.state());
        self.inner
            .reporter
            .check("state", &EngineInner::<E>::context(channel), result)
    }

    async fn position(&self, channel: &Arc<Channel>) -> Result<Duration> {
        let result = self.inner.position(channel).await;
        self.inner
            .reporter
            .check("position", &EngineInner::<E>::context(channel), result)
    }

    #[instrument(skip(self, channel), fields(channel = %channel.id()))]
    async fn set_position(&self, channel: &Arc<Channel>, position: Duration) -> Result<()> {
        let result = self.inner.set_position(channel, position).await;
        self.inner
            .reporter
            .check("set_position", &EngineInner::<E>::context(channel), result)
    }

    async fn length(&self, channel: &Arc<Channel>) -> Result<Option<Duration>> {
        let result = self
            .inner
            .check_associated(channel)
            .map(|()| channel.length());
        self.inner
            .reporter
            .check("length", &EngineInner::<E>::context(channel), result)
    }

    async fn volume(&self, channel: &Arc<Channel>) -> Result<f32> {
        let result = self.inner.volume(channel).await;
        self.inner
            .reporter
            .check("volume", &EngineInner::<E>::context(channel), result)
    }

    #[instrument(skip(self, channel), fields(channel = %channel.id()))]
    async fn set_volume(&self, channel: &Arc<Channel>, volume: f32) -> Result<()> {
        let result = self.inner.set_volume(channel, volume).await;
        self.inner
            .reporter
            .check("set_volume", &EngineInner::<E>::context(channel), result)
    }

    async fn devices(&self, channel: &Arc<Channel>) -> Result<Vec<OutputDevice>> {
        let result = self.inner.devices(channel).await;
        self.inner
            .reporter
            .check("devices", &EngineInner::<E>::context(channel), result)
    }

    async fn device(&self, channel: &Arc<Channel>) -> Result<Option<String>> {
        let result = self
            .inner
            .check_associated(channel)
            .map(|()| self.inner.engine.output_device());
        self.inner
            .reporter
            .check("device", &EngineInner::<E>::context(channel), result)
    }

    #[instrument(skip(self, channel), fields(channel = %channel.id()))]
    async fn set_device(&self, channel: &Arc<Channel>, device_id: &str) -> Result<()> {
        let result = self.inner.set_device(channel, device_id).await;
        let context = [channel.id().to_string(), device_id.to_string()];
        self.inner.reporter.check("set_device", &context, result)
    }
}

#[async_trait]
impl<E> StreamSelection for EngineStreamSelector<E>
where
    E: MediaEngine + 'static,
{
    fn kind(&self) -> StreamKind {
        self.kind
    }

    async fn selectable_streams(&self, channel: &Arc<Channel>) -> Result<Vec<SelectableStream>> {
        let result = self.inner.selectable_streams(channel, self.kind).await;
        let context = [channel.id().to_string(), self.kind.to_string()];
        self.inner
            .reporter
            .check("selectable_streams", &context, result)
    }

    #[instrument(skip(self, channel), fields(channel = %channel.id(), kind = %self.kind))]
    async fn set_selected_stream(&self, channel: &Arc<Channel>, stream: Option<i32>) -> Result<()> {
        let result = self
            .inner
            .set_selected_stream(channel, self.kind, stream)
            .await;
        let context = [channel.id().to_string(), self.kind.to_string()];
        self.inner
            .reporter
            .check("set_selected_stream", &context, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_conversion_round_trips_on_percent_steps() {
        assert_eq!(to_native_volume(0.5), 50);
        assert_eq!(to_native_volume(1.0), 100);
        assert_eq!(to_native_volume(0.004), 0);
        assert_eq!(from_native_volume(50), 0.5);
        assert_eq!(from_native_volume(250), 1.0);
    }

    #[test]
    fn stream_names() {
        let track = |language: Option<&str>, description: Option<&str>| EngineTrack {
            id: 3,
            kind: StreamKind::Subtitle,
            language: language.map(String::from),
            description: description.map(String::from),
        };

        assert_eq!(stream_name(&track(Some("en"), Some("English"))), "[en] English");
        assert_eq!(stream_name(&track(None, Some("Commentary"))), "Commentary");
        assert_eq!(stream_name(&track(Some("fr"), None)), "[fr]");
        assert_eq!(stream_name(&track(None, None)), "Track 3");
    }

    #[test]
    fn capabilities_gate_facets() {
        let audio_only = EngineCapabilities::AUDIO_ONLY;
        assert!(supports(audio_only, Capability::AudioOutput));
        assert!(supports(audio_only, Capability::StreamSelection(StreamKind::Audio)));
        assert!(!supports(audio_only, Capability::StreamSelection(StreamKind::Subtitle)));
        assert!(!supports(audio_only, Capability::VideoRendering));
    }
}
