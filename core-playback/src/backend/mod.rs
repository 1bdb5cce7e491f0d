//! # Backend Capability Model
//!
//! A backend implements the base [`BackendService`] contract and any number
//! of optional facets. Facets are queried at runtime instead of being
//! encoded in a type hierarchy:
//!
//! ```ignore
//! if backend.supports(Capability::StreamSelection(StreamKind::Subtitle)) {
//!     let selector = backend.stream_selection(StreamKind::Subtitle).unwrap();
//!     let streams = selector.selectable_streams(&channel).await?;
//! }
//! ```
//!
//! ## Ownership
//!
//! Every channel operation first checks that the requesting backend holds a
//! role on the channel and fails with
//! [`ChannelNotAssociated`](crate::PlaybackError::ChannelNotAssociated)
//! otherwise, before any side effect.

pub mod bootstrap;
pub mod engine;

use async_trait::async_trait;
use bridge_traits::{OutputDevice, StreamKind};
use core_runtime::events::EventHandlers;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::channel::{Channel, ChannelState, EndedCallback};
use crate::error::Result;
use crate::events::BackendEvent;
use crate::item::PlayItem;

pub use engine::EngineBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackendId(Uuid);

impl BackendId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BackendId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a backend can hold on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendRole {
    Audio,
    Video,
    Subtitle,
}

impl BackendRole {
    pub const ALL: [BackendRole; 3] = [BackendRole::Audio, BackendRole::Video, BackendRole::Subtitle];

    /// Capability a backend needs to hold this role.
    pub fn capability(&self) -> Capability {
        match self {
            BackendRole::Audio => Capability::AudioOutput,
            BackendRole::Video => Capability::VideoRendering,
            BackendRole::Subtitle => Capability::SubtitleRendering,
        }
    }

    pub fn stream_kind(&self) -> StreamKind {
        match self {
            BackendRole::Audio => StreamKind::Audio,
            BackendRole::Video => StreamKind::Video,
            BackendRole::Subtitle => StreamKind::Subtitle,
        }
    }
}

/// Backends holding each role of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Roles {
    pub audio: Option<BackendId>,
    pub video: Option<BackendId>,
    pub subtitle: Option<BackendId>,
}

impl Roles {
    /// Assigns every role in `roles` to `backend`.
    pub fn all_to(backend: BackendId, roles: &[BackendRole]) -> Self {
        let mut assigned = Self::default();
        for role in roles {
            assigned.set(*role, backend);
        }
        assigned
    }

    pub fn get(&self, role: BackendRole) -> Option<BackendId> {
        match role {
            BackendRole::Audio => self.audio,
            BackendRole::Video => self.video,
            BackendRole::Subtitle => self.subtitle,
        }
    }

    /// Returns the previous holder of the role.
    pub fn set(&mut self, role: BackendRole, backend: BackendId) -> Option<BackendId> {
        let slot = match role {
            BackendRole::Audio => &mut self.audio,
            BackendRole::Video => &mut self.video,
            BackendRole::Subtitle => &mut self.subtitle,
        };
        slot.replace(backend)
    }

    /// Clears the role if `backend` holds it.
    pub fn clear(&mut self, role: BackendRole, backend: BackendId) -> bool {
        let slot = match role {
            BackendRole::Audio => &mut self.audio,
            BackendRole::Video => &mut self.video,
            BackendRole::Subtitle => &mut self.subtitle,
        };
        if *slot == Some(backend) {
            *slot = None;
            return true;
        }
        false
    }

    pub fn contains(&self, backend: BackendId) -> bool {
        [self.audio, self.video, self.subtitle].contains(&Some(backend))
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none() && self.subtitle.is_none()
    }
}

/// Optional feature set of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    AudioOutput,
    VideoRendering,
    SubtitleRendering,
    StreamSelection(StreamKind),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::AudioOutput => f.write_str("audio output"),
            Capability::VideoRendering => f.write_str("video rendering"),
            Capability::SubtitleRendering => f.write_str("subtitle rendering"),
            Capability::StreamSelection(kind) => write!(f, "{kind} stream selection"),
        }
    }
}

/// A stream a user can pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectableStream {
    pub index: i32,
    pub kind: StreamKind,
    /// Display name, `[language] description` when both are known.
    pub name: String,
    pub language: Option<String>,
}

/// Base contract of every playback backend.
#[async_trait]
pub trait BackendService: Send + Sync {
    fn id(&self) -> BackendId;

    fn name(&self) -> &str;

    fn supports(&self, capability: Capability) -> bool;

    /// Roles this backend can hold.
    fn roles(&self) -> Vec<BackendRole> {
        BackendRole::ALL
            .into_iter()
            .filter(|role| self.supports(role.capability()))
            .collect()
    }

    /// Stream-selection facet for `kind`, if implemented.
    fn stream_selection(&self, kind: StreamKind) -> Option<&dyn StreamSelection>;

    fn events(&self) -> &EventHandlers<BackendEvent>;

    /// Creates a channel for a cached item. `on_ended` runs once when
    /// playback reaches the natural end of the media.
    async fn create_channel(
        &self,
        item: Arc<PlayItem>,
        on_ended: Option<EndedCallback>,
    ) -> Result<Arc<Channel>>;

    /// Claims `role` of an existing channel.
    ///
    /// Only a free role, or one this backend already holds, can be claimed.
    /// A role held by another backend fails with
    /// [`RoleHeld`](crate::PlaybackError::RoleHeld) until its holder calls
    /// [`release_role`](Self::release_role).
    async fn associate(&self, channel: &Arc<Channel>, role: BackendRole) -> Result<()>;

    /// Gives up `role` on a channel this backend is associated with. Once
    /// the backend holds no role it unloads the channel and releases its
    /// media. Returns `false` if the backend did not hold the role.
    async fn release_role(&self, channel: &Arc<Channel>, role: BackendRole) -> Result<bool>;

    /// Releases native resources. Returns `false` if the channel was
    /// already destroyed.
    async fn destroy_channel(&self, channel: &Arc<Channel>) -> Result<bool>;

    async fn play(&self, channel: &Arc<Channel>) -> Result<()>;

    async fn pause(&self, channel: &Arc<Channel>) -> Result<()>;

    async fn resume(&self, channel: &Arc<Channel>) -> Result<()>;

    async fn stop(&self, channel: &Arc<Channel>) -> Result<()>;

    async fn state(&self, channel: &Arc<Channel>) -> Result<ChannelState>;

    async fn set_state(&self, channel: &Arc<Channel>, state: ChannelState) -> Result<()> {
        match state {
            ChannelState::Playing if channel.state() == ChannelState::Paused => {
                self.resume(channel).await
            }
            ChannelState::Playing => self.play(channel).await,
            ChannelState::Paused => self.pause(channel).await,
            ChannelState::Stopped => self.stop(channel).await,
        }
    }

    async fn position(&self, channel: &Arc<Channel>) -> Result<Duration>;

    async fn set_position(&self, channel: &Arc<Channel>, position: Duration) -> Result<()>;

    async fn length(&self, channel: &Arc<Channel>) -> Result<Option<Duration>>;

    /// Normalized volume in `[0, 1]`.
    async fn volume(&self, channel: &Arc<Channel>) -> Result<f32>;

    async fn set_volume(&self, channel: &Arc<Channel>, volume: f32) -> Result<()>;

    /// Output devices of the backend. Device selection is backend-global.
    async fn devices(&self, channel: &Arc<Channel>) -> Result<Vec<OutputDevice>>;

    async fn device(&self, channel: &Arc<Channel>) -> Result<Option<String>>;

    async fn set_device(&self, channel: &Arc<Channel>, device_id: &str) -> Result<()>;
}

/// Optional facet: choose among the video, audio or subtitle streams of a
/// channel.
///
/// When the channel is not the backend's active channel the selection is
/// only recorded and applied the next time it starts playing.
#[async_trait]
pub trait StreamSelection: Send + Sync {
    fn kind(&self) -> StreamKind;

    async fn selectable_streams(&self, channel: &Arc<Channel>) -> Result<Vec<SelectableStream>>;

    /// `None` restores the engine default.
    async fn set_selected_stream(&self, channel: &Arc<Channel>, stream: Option<i32>) -> Result<()>;
}
