//! Native media engine contract.
//!
//! A playback backend drives exactly one [`MediaEngine`]. The engine owns the
//! native player: it turns a byte buffer or a file path into a loaded media
//! object, exposes transport controls for whichever media is currently set
//! on the player, and publishes [`EngineEvent`]s for readiness and
//! end-of-media.
//!
//! Engines report their native values (volume `0..=100`, positions as
//! [`Duration`]) and leave normalization to the backend.

use async_trait::async_trait;
use bytes::Bytes;
use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

/// Opaque identifier of media loaded into an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaHandle(u64);

impl MediaHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "media#{}", self.0)
    }
}

/// Where an engine should read media from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaInput {
    /// A file on disk.
    Path(PathBuf),
    /// A fully buffered copy of the media.
    Memory(Bytes),
}

impl MediaInput {
    /// Short description for logs. Never dumps buffer contents.
    pub fn describe(&self) -> String {
        match self {
            MediaInput::Path(path) => format!("path:{}", path.display()),
            MediaInput::Memory(bytes) => format!("memory:{} bytes", bytes.len()),
        }
    }
}

/// Kind of elementary stream inside a media container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Video, StreamKind::Audio, StreamKind::Subtitle];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
            StreamKind::Subtitle => "subtitle",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Player state as reported by the native engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    Opening,
    Buffering,
    Playing,
    Paused,
    Stopped,
    Ended,
    Error,
}

/// One track of a parsed media object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineTrack {
    pub id: i32,
    pub kind: StreamKind,
    pub language: Option<String>,
    pub description: Option<String>,
}

/// Result of parsing loaded media.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMedia {
    pub duration: Option<Duration>,
    pub tracks: Vec<EngineTrack>,
}

/// Audio output device known to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDevice {
    pub id: String,
    pub name: String,
}

/// Which rendering roles an engine can fulfil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineCapabilities {
    pub audio: bool,
    pub video: bool,
    pub subtitles: bool,
}

impl EngineCapabilities {
    pub const FULL: EngineCapabilities = EngineCapabilities {
        audio: true,
        video: true,
        subtitles: true,
    };

    pub const AUDIO_ONLY: EngineCapabilities = EngineCapabilities {
        audio: true,
        video: false,
        subtitles: false,
    };
}

/// Notifications published by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The player started rendering the given media.
    Playing(MediaHandle),
    Paused(MediaHandle),
    Stopped(MediaHandle),
    /// Playback of the given media reached its natural end.
    EndReached(MediaHandle),
    Error {
        media: Option<MediaHandle>,
        message: String,
    },
}

/// Native playback engine.
///
/// Transport calls act on the media last passed to [`MediaEngine::set_media`].
/// Implementations publish [`EngineEvent::Playing`] once playback has really
/// started; callers subscribe before calling [`MediaEngine::play`] and wait
/// for it.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Engine name used in logs and error reports.
    fn name(&self) -> &str;

    fn capabilities(&self) -> EngineCapabilities;

    /// Create native media from a buffer or a path.
    async fn load(&self, input: MediaInput) -> Result<MediaHandle>;

    /// Parse loaded media, returning its duration and tracks.
    async fn parse(&self, media: MediaHandle) -> Result<ParsedMedia>;

    /// Free native media. Releasing unknown media is not an error.
    async fn release(&self, media: MediaHandle) -> Result<()>;

    /// Put media on the player, or clear it with `None`.
    async fn set_media(&self, media: Option<MediaHandle>) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn set_pause(&self, paused: bool) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    fn state(&self) -> EngineState;

    /// Current playback time, `None` when the engine has no valid position.
    fn time(&self) -> Option<Duration>;

    async fn seek(&self, position: Duration) -> Result<()>;

    /// Native volume `0..=100`, `None` when unavailable.
    fn volume(&self) -> Option<u8>;

    async fn set_volume(&self, volume: u8) -> Result<()>;

    async fn output_devices(&self) -> Result<Vec<OutputDevice>>;

    /// Identifier of the active output device.
    fn output_device(&self) -> Option<String>;

    async fn set_output_device(&self, device_id: &str) -> Result<()>;

    /// Tracks of the given kind in parsed media.
    async fn tracks(&self, media: MediaHandle, kind: StreamKind) -> Result<Vec<EngineTrack>>;

    /// Select a track on the player, `None` restores the engine default.
    async fn select_track(&self, kind: StreamKind, track: Option<i32>) -> Result<()>;

    /// Subscribe to engine notifications.
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_input_description_hides_buffer() {
        let input = MediaInput::Memory(Bytes::from_static(b"fLaC\0\0\0\x22"));
        assert_eq!(input.describe(), "memory:8 bytes");

        let input = MediaInput::Path(PathBuf::from("/cache/abc.flac"));
        assert_eq!(input.describe(), "path:/cache/abc.flac");
    }

    #[test]
    fn stream_kind_serializes_snake_case() {
        let json = serde_json::to_string(&StreamKind::Subtitle).unwrap();
        assert_eq!(json, "\"subtitle\"");
    }

    #[test]
    fn capability_presets() {
        assert!(EngineCapabilities::FULL.subtitles);
        assert!(!EngineCapabilities::AUDIO_ONLY.video);
        assert_eq!(EngineCapabilities::default(), EngineCapabilities {
            audio: false,
            video: false,
            subtitles: false,
        });
    }
}
