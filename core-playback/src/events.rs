//! Playback events.
//!
//! - [`CacheEvent`] is raised by a [`PlayItem`](crate::PlayItem) while it is
//!   being cached.
//! - [`BackendEvent`] is raised by a backend for channel lifecycle and
//!   transport changes.
//! - [`CoreEvent`] wraps both for hosts consuming a single
//!   [`EventBus`](core_runtime::events::EventBus).

use bridge_traits::StreamKind;
use core_runtime::events::EventSeverity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backend::BackendId;
use crate::channel::{ChannelId, ChannelState};
use crate::item::CacheState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    StateChanged { locator: String, state: CacheState },
    /// Fraction of the resource materialized so far, in `[0, 1]`.
    ProgressChanged { locator: String, fraction: f32 },
}

impl CacheEvent {
    pub fn locator(&self) -> &str {
        match self {
            CacheEvent::StateChanged { locator, .. } | CacheEvent::ProgressChanged { locator, .. } => {
                locator
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendEvent {
    ChannelCreated {
        backend: BackendId,
        channel: ChannelId,
    },
    ChannelDestroyed {
        backend: BackendId,
        channel: ChannelId,
    },
    ChannelStateChanged {
        channel: ChannelId,
        state: ChannelState,
    },
    ChannelPositionChanged {
        channel: ChannelId,
        position: Duration,
    },
    /// Normalized volume in `[0, 1]`.
    ChannelVolumeChanged { channel: ChannelId, volume: f32 },
    SelectedStreamChanged {
        channel: ChannelId,
        kind: StreamKind,
        stream: Option<i32>,
    },
    /// Playback reached the natural end of the media.
    ChannelEnded { channel: ChannelId },
    GlobalDeviceChanged { backend: BackendId, device: String },
}

impl BackendEvent {
    /// The channel the event refers to, if any.
    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            BackendEvent::ChannelCreated { channel, .. }
            | BackendEvent::ChannelDestroyed { channel, .. }
            | BackendEvent::ChannelStateChanged { channel, .. }
            | BackendEvent::ChannelPositionChanged { channel, .. }
            | BackendEvent::ChannelVolumeChanged { channel, .. }
            | BackendEvent::SelectedStreamChanged { channel, .. }
            | BackendEvent::ChannelEnded { channel } => Some(*channel),
            BackendEvent::GlobalDeviceChanged { .. } => None,
        }
    }
}

/// Aggregated event stream of a media manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "event", rename_all = "snake_case")]
pub enum CoreEvent {
    Cache(CacheEvent),
    Backend(BackendEvent),
}

impl CoreEvent {
    pub fn description(&self) -> String {
        match self {
            CoreEvent::Cache(CacheEvent::StateChanged { locator, state }) => {
                format!("{locator} is now {state:?}")
            }
            CoreEvent::Cache(CacheEvent::ProgressChanged { locator, fraction }) => {
                format!("{locator} cached {:.0}%", fraction * 100.0)
            }
            CoreEvent::Backend(BackendEvent::ChannelCreated { channel, .. }) => {
                format!("Channel {channel} created")
            }
            CoreEvent::Backend(BackendEvent::ChannelDestroyed { channel, .. }) => {
                format!("Channel {channel} destroyed")
            }
            CoreEvent::Backend(BackendEvent::ChannelStateChanged { channel, state }) => {
                format!("Channel {channel} is {state:?}")
            }
            CoreEvent::Backend(BackendEvent::ChannelPositionChanged { channel, position }) => {
                format!("Channel {channel} moved to {position:?}")
            }
            CoreEvent::Backend(BackendEvent::ChannelVolumeChanged { channel, volume }) => {
                format!("Channel {channel} volume {volume:.2}")
            }
            CoreEvent::Backend(BackendEvent::SelectedStreamChanged {
                channel,
                kind,
                stream,
            }) => match stream {
                Some(index) => format!("Channel {channel} selected {kind} stream {index}"),
                None => format!("Channel {channel} reset {kind} stream"),
            },
            CoreEvent::Backend(BackendEvent::ChannelEnded { channel }) => {
                format!("Channel {channel} reached end of media")
            }
            CoreEvent::Backend(BackendEvent::GlobalDeviceChanged { device, .. }) => {
                format!("Output device changed to {device}")
            }
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Cache(CacheEvent::StateChanged {
                state: CacheState::Failed,
                ..
            }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::ProgressChanged { .. })
            | CoreEvent::Backend(BackendEvent::ChannelPositionChanged { .. }) => {
                EventSeverity::Debug
            }
            _ => EventSeverity::Info,
        }
    }
}

impl From<CacheEvent> for CoreEvent {
    fn from(event: CacheEvent) -> Self {
        CoreEvent::Cache(event)
    }
}

impl From<BackendEvent> for CoreEvent {
    fn from(event: BackendEvent) -> Self {
        CoreEvent::Backend(event)
    }
}
