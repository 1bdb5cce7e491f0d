//! # Playback Channels
//!
//! A [`Channel`] binds one cached [`PlayItem`] to up to three backend roles.
//! It records the transport state shared by those backends (state, position,
//! volume, selected streams) and the native media handle each backend loaded
//! for it.
//!
//! ## Concurrency
//!
//! - Mutating operations take the channel's async operation lock
//!   ([`Channel::lock_ops`]); unrelated channels proceed concurrently.
//! - A play waiting for engine readiness registers a pending token. Stop and
//!   destroy cancel it *before* taking the operation lock, which is how a
//!   pending play is interrupted.
//! - Destroying a channel cancels its lifetime token; per-channel background
//!   tasks (end-of-media watchers) stop on it.

use bridge_traits::{MediaHandle, StreamKind};
use core_async::sync::{CancellationToken, Mutex as AsyncMutex, MutexGuard};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::backend::{BackendId, BackendRole, Roles};
use crate::item::PlayItem;

/// Invoked once when playback of a channel reaches the natural end.
pub type EndedCallback = Box<dyn FnOnce(ChannelId) + Send + 'static>;

/// Selected stream value meaning "engine default".
pub const UNSELECTED_STREAM: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelState {
    Stopped,
    Paused,
    Playing,
}

#[derive(Debug, Clone)]
struct Status {
    state: ChannelState,
    position: Duration,
    volume: f32,
    selected: [i32; 3],
}

impl Default for Status {
    fn default() -> Self {
        Self {
            state: ChannelState::Stopped,
            position: Duration::ZERO,
            volume: 1.0,
            selected: [UNSELECTED_STREAM; 3],
        }
    }
}

fn slot(kind: StreamKind) -> usize {
    match kind {
        StreamKind::Video => 0,
        StreamKind::Audio => 1,
        StreamKind::Subtitle => 2,
    }
}

/// An active binding between a cached item and its backends.
pub struct Channel {
    id: ChannelId,
    item: Arc<PlayItem>,
    roles: RwLock<Roles>,
    media: Mutex<HashMap<BackendId, MediaHandle>>,
    length: Option<Duration>,
    status: Mutex<Status>,
    ops: AsyncMutex<()>,
    pending_play: Mutex<Option<(u64, CancellationToken)>>,
    next_play: Mutex<u64>,
    lifetime: CancellationToken,
    on_ended: Mutex<Option<EndedCallback>>,
}

impl Channel {
    pub(crate) fn new(
        item: Arc<PlayItem>,
        roles: Roles,
        length: Option<Duration>,
        on_ended: Option<EndedCallback>,
    ) -> Self {
        Self {
            id: ChannelId::new(),
            item,
            roles: RwLock::new(roles),
            media: Mutex::new(HashMap::new()),
            length,
            status: Mutex::new(Status::default()),
            ops: AsyncMutex::new(()),
            pending_play: Mutex::new(None),
            next_play: Mutex::new(0),
            lifetime: CancellationToken::new(),
            on_ended: Mutex::new(on_ended),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn item(&self) -> &Arc<PlayItem> {
        &self.item
    }

    pub fn roles(&self) -> Roles {
        *self.roles.read()
    }

    pub fn backend_for(&self, role: BackendRole) -> Option<BackendId> {
        self.roles.read().get(role)
    }

    pub fn is_associated(&self, backend: BackendId) -> bool {
        self.roles.read().contains(backend)
    }

    pub fn state(&self) -> ChannelState {
        self.status.lock().state
    }

    /// Last known position. Backends refresh it from the engine while the
    /// channel is active.
    pub fn position(&self) -> Duration {
        self.status.lock().position
    }

    /// Normalized volume in `[0, 1]`.
    pub fn volume(&self) -> f32 {
        self.status.lock().volume
    }

    pub fn length(&self) -> Option<Duration> {
        self.length
    }

    /// Selected stream index for `kind`, [`UNSELECTED_STREAM`] for the default.
    pub fn selected_stream(&self, kind: StreamKind) -> i32 {
        self.status.lock().selected[slot(kind)]
    }

    pub fn is_closed(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// Cancelled when the channel is destroyed.
    pub fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    pub(crate) async fn lock_ops(&self) -> MutexGuard<'_, ()> {
        self.ops.lock().await
    }

    pub(crate) fn assign(&self, role: BackendRole, backend: BackendId) -> Option<BackendId> {
        self.roles.write().set(role, backend)
    }

    pub(crate) fn unassign(&self, role: BackendRole, backend: BackendId) -> bool {
        self.roles.write().clear(role, backend)
    }

    pub(crate) fn media_for(&self, backend: BackendId) -> Option<MediaHandle> {
        self.media.lock().get(&backend).copied()
    }

    pub(crate) fn set_media(&self, backend: BackendId, media: MediaHandle) -> Option<MediaHandle> {
        self.media.lock().insert(backend, media)
    }

    /// Removes the handle of `backend`. Exactly one caller gets it back.
    pub(crate) fn take_media(&self, backend: BackendId) -> Option<MediaHandle> {
        self.media.lock().remove(&backend)
    }

    pub(crate) fn set_state(&self, state: ChannelState) -> ChannelState {
        let mut status = self.status.lock();
        let previous = status.state;
        status.state = state;
        if state == ChannelState::Stopped {
            status.position = Duration::ZERO;
        }
        previous
    }

    pub(crate) fn set_position(&self, position: Duration) {
        self.status.lock().position = position;
    }

    pub(crate) fn set_volume(&self, volume: f32) {
        self.status.lock().volume = volume;
    }

    pub(crate) fn select_stream(&self, kind: StreamKind, stream: Option<i32>) {
        self.status.lock().selected[slot(kind)] = stream.unwrap_or(UNSELECTED_STREAM);
    }

    /// Registers a pending play and returns its sequence number and token.
    /// The token is a child of the lifetime token, so destroying the channel
    /// also cancels it.
    pub(crate) fn begin_pending_play(&self) -> (u64, CancellationToken) {
        let sequence = {
            let mut next = self.next_play.lock();
            *next += 1;
            *next
        };
        let token = self.lifetime.child_token();
        if let Some((_, previous)) = self.pending_play.lock().replace((sequence, token.clone())) {
            previous.cancel();
        }
        (sequence, token)
    }

    pub(crate) fn end_pending_play(&self, sequence: u64) {
        let mut pending = self.pending_play.lock();
        if matches!(*pending, Some((current, _)) if current == sequence) {
            *pending = None;
        }
    }

    /// Cancels a pending play, if any. Returns whether one was pending.
    pub(crate) fn cancel_pending_play(&self) -> bool {
        match self.pending_play.lock().take() {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Marks the channel destroyed. Returns `false` if it already was.
    pub(crate) fn close(&self) -> bool {
        if self.lifetime.is_cancelled() {
            return false;
        }
        self.cancel_pending_play();
        self.lifetime.cancel();
        true
    }

    /// Runs the end callback on its own task. Later calls do nothing.
    pub(crate) fn fire_ended(&self) -> bool {
        let Some(callback) = self.on_ended.lock().take() else {
            return false;
        };
        let id = self.id;
        core_async::task::spawn_detached("channel-ended", async move {
            callback(id);
            Ok::<(), std::convert::Infallible>(())
        });
        true
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status.lock().clone();
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("locator", &self.item.locator())
            .field("roles", &*self.roles.read())
            .field("state", &status.state)
            .field("volume", &status.volume)
            .field("closed", &self.is_closed())
            .finish()
    }
}
