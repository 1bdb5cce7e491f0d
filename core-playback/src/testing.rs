//! In-memory fakes for tests.
//!
//! Enabled for this crate's own tests and, through the `test-utils` feature,
//! for downstream crates.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::storage::{FileMetadata, FileSystemAccess};
use bridge_traits::{
    EngineCapabilities, EngineEvent, EngineState, EngineTrack, MediaEngine, MediaHandle,
    MediaInput, OutputDevice, ParsedMedia, StreamKind,
};
use bytes::Bytes;
use core_async::io::{AsyncWrite, BoxedReader, BoxedWriter};
use core_async::sync::broadcast;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

// ============================================================================
// File System
// ============================================================================

type FileMap = Arc<RwLock<BTreeMap<PathBuf, Bytes>>>;

/// A file system held in a map. Directories are implied by file paths.
pub struct MemoryFileSystem {
    files: FileMap,
    dirs: RwLock<BTreeSet<PathBuf>>,
    cache_dir: PathBuf,
    reads: AtomicUsize,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(BTreeMap::new())),
            dirs: RwLock::new(BTreeSet::new()),
            cache_dir: PathBuf::from("/cache"),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn with_file(self, path: impl Into<PathBuf>, data: impl Into<Bytes>) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Bytes>) {
        let path = path.into();
        self.add_ancestors(&path);
        self.files.write().insert(path, data.into());
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.files.write().remove(path.as_ref()).is_some()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.files.read().contains_key(path.as_ref())
    }

    /// Number of full reads and opened streams so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn add_ancestors(&self, path: &Path) {
        let mut dirs = self.dirs.write();
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
    }

    fn file(&self, path: &Path) -> Result<Bytes> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(path.display().to_string()))
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for MemoryFileSystem {
    async fn get_cache_directory(&self) -> Result<PathBuf> {
        Ok(self.cache_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.files.read().contains_key(path) || self.dirs.read().contains(path))
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        if self.dirs.read().contains(path) {
            return Ok(FileMetadata {
                size: 0,
                created_at: None,
                modified_at: None,
                is_directory: true,
            });
        }
        let data = self.file(path)?;
        Ok(FileMetadata {
            size: data.len() as u64,
            created_at: None,
            modified_at: None,
            is_directory: false,
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.add_ancestors(path);
        self.dirs.write().insert(path.to_path_buf());
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.file(path)
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        self.insert(path, data);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        if self.remove(path) {
            Ok(())
        } else {
            Err(BridgeError::NotFound(path.display().to_string()))
        }
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if !self.dirs.read().contains(path) {
            return Err(BridgeError::NotFound(path.display().to_string()));
        }
        let is_child = |candidate: &&PathBuf| candidate.parent() == Some(path);
        let mut entries: Vec<PathBuf> = self
            .files
            .read()
            .keys()
            .filter(is_child)
            .cloned()
            .chain(self.dirs.read().iter().filter(is_child).cloned())
            .collect();
        entries.sort();
        Ok(entries)
    }

    async fn open_read_stream(&self, path: &Path) -> Result<BoxedReader> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let data = self.file(path)?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn open_write_stream(&self, path: &Path) -> Result<BoxedWriter> {
        self.insert(path, Bytes::new());
        Ok(Box::new(MemoryWriter {
            files: Arc::clone(&self.files),
            path: path.to_path_buf(),
            buffer: Vec::new(),
        }))
    }
}

/// Publishes its buffer into the file map on flush and shutdown.
struct MemoryWriter {
    files: FileMap,
    path: PathBuf,
    buffer: Vec<u8>,
}

impl MemoryWriter {
    fn publish(&self) {
        self.files
            .write()
            .insert(self.path.clone(), Bytes::copy_from_slice(&self.buffer));
    }
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.get_mut().buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.publish();
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.publish();
        Poll::Ready(Ok(()))
    }
}

// ============================================================================
// Media Engine
// ============================================================================

struct FakeState {
    state: EngineState,
    media: Option<MediaHandle>,
    loaded: HashMap<MediaHandle, MediaInput>,
    released: Vec<MediaHandle>,
    position: Duration,
    volume: u8,
    device: Option<String>,
    selected: HashMap<StreamKind, Option<i32>>,
    confirm_play: bool,
    play_outcome: EngineState,
    fail_load: bool,
}

struct FakeShared {
    name: String,
    capabilities: EngineCapabilities,
    duration: Option<Duration>,
    tracks: Vec<EngineTrack>,
    devices: Vec<OutputDevice>,
    next_handle: AtomicU64,
    events: broadcast::Sender<EngineEvent>,
    state: Mutex<FakeState>,
}

/// Scriptable [`MediaEngine`]. Clones share the same engine.
///
/// By default `play` settles immediately in `Playing` and publishes the
/// matching event. [`FakeEngine::set_confirm_play`] makes it hang in
/// `Opening` until [`FakeEngine::confirm_ready`] is called.
#[derive(Clone)]
pub struct FakeEngine {
    shared: Arc<FakeShared>,
}

impl FakeEngine {
    pub fn new(name: &str, capabilities: EngineCapabilities) -> Self {
        Self::with_media(name, capabilities, Some(Duration::from_secs(180)), default_tracks())
    }

    pub fn with_media(
        name: &str,
        capabilities: EngineCapabilities,
        duration: Option<Duration>,
        tracks: Vec<EngineTrack>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(FakeShared {
                name: name.to_string(),
                capabilities,
                duration,
                tracks,
                devices: vec![
                    OutputDevice {
                        id: "default".into(),
                        name: "System default".into(),
                    },
                    OutputDevice {
                        id: "hdmi".into(),
                        name: "HDMI".into(),
                    },
                ],
                next_handle: AtomicU64::new(1),
                events,
                state: Mutex::new(FakeState {
                    state: EngineState::Idle,
                    media: None,
                    loaded: HashMap::new(),
                    released: Vec::new(),
                    position: Duration::ZERO,
                    volume: 100,
                    device: Some("default".into()),
                    selected: HashMap::new(),
                    confirm_play: true,
                    play_outcome: EngineState::Playing,
                    fail_load: false,
                }),
            }),
        }
    }

    pub fn full(name: &str) -> Self {
        Self::new(name, EngineCapabilities::FULL)
    }

    pub fn set_confirm_play(&self, confirm: bool) {
        self.shared.state.lock().confirm_play = confirm;
    }

    /// State the engine settles in after `play`, while still announcing
    /// `Playing`.
    pub fn set_play_outcome(&self, outcome: EngineState) {
        self.shared.state.lock().play_outcome = outcome;
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.shared.state.lock().fail_load = fail;
    }

    /// Completes a `play` that was left hanging.
    pub fn confirm_ready(&self) {
        let media = {
            let mut state = self.shared.state.lock();
            state.state = EngineState::Playing;
            state.media
        };
        if let Some(media) = media {
            let _ = self.shared.events.send(EngineEvent::Playing(media));
        }
    }

    /// Simulates the natural end of the current media.
    pub fn finish(&self) {
        let media = {
            let mut state = self.shared.state.lock();
            state.state = EngineState::Ended;
            state.media
        };
        if let Some(media) = media {
            let _ = self.shared.events.send(EngineEvent::EndReached(media));
        }
    }

    /// Simulates a volume change made outside the backend.
    pub fn set_native_volume(&self, volume: u8) {
        self.shared.state.lock().volume = volume;
    }

    pub fn current_media(&self) -> Option<MediaHandle> {
        self.shared.state.lock().media
    }

    pub fn loaded_inputs(&self) -> Vec<MediaInput> {
        self.shared.state.lock().loaded.values().cloned().collect()
    }

    pub fn released(&self) -> Vec<MediaHandle> {
        self.shared.state.lock().released.clone()
    }

    pub fn selected_track(&self, kind: StreamKind) -> Option<Option<i32>> {
        self.shared.state.lock().selected.get(&kind).copied()
    }

    fn send(&self, event: EngineEvent) {
        let _ = self.shared.events.send(event);
    }

    fn no_media() -> BridgeError {
        BridgeError::Engine("no media set".into())
    }
}

/// One video, two audio and two subtitle tracks.
pub fn default_tracks() -> Vec<EngineTrack> {
    let track = |id, kind, language: Option<&str>, description: &str| EngineTrack {
        id,
        kind,
        language: language.map(String::from),
        description: Some(description.to_string()),
    };
    vec![
        track(0, StreamKind::Video, None, "H.264"),
        track(1, StreamKind::Audio, Some("en"), "English"),
        track(2, StreamKind::Audio, Some("ja"), "Japanese"),
        track(3, StreamKind::Subtitle, Some("en"), "English"),
        track(4, StreamKind::Subtitle, Some("fr"), "Français"),
    ]
}

#[async_trait]
impl MediaEngine for FakeEngine {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn capabilities(&self) -> EngineCapabilities {
        self.shared.capabilities
    }

    async fn load(&self, input: MediaInput) -> Result<MediaHandle> {
        let mut state = self.shared.state.lock();
        if state.fail_load {
            return Err(BridgeError::Engine(format!("cannot open {}", input.describe())));
        }
        let media = MediaHandle::new(self.shared.next_handle.fetch_add(1, Ordering::SeqCst));
        state.loaded.insert(media, input);
        Ok(media)
    }

    async fn parse(&self, media: MediaHandle) -> Result<ParsedMedia> {
        if !self.shared.state.lock().loaded.contains_key(&media) {
            return Err(BridgeError::NotFound(media.to_string()));
        }
        Ok(ParsedMedia {
            duration: self.shared.duration,
            tracks: self.shared.tracks.clone(),
        })
    }

    async fn release(&self, media: MediaHandle) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.loaded.remove(&media);
        state.released.push(media);
        Ok(())
    }

    async fn set_media(&self, media: Option<MediaHandle>) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.media = media;
        state.state = EngineState::Idle;
        state.position = Duration::ZERO;
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        let (media, confirm) = {
            let mut state = self.shared.state.lock();
            let media = state.media.ok_or_else(Self::no_media)?;
            if state.confirm_play {
                state.state = state.play_outcome;
            } else {
                state.state = EngineState::Opening;
            }
            (media, state.confirm_play)
        };
        if confirm {
            self.send(EngineEvent::Playing(media));
        }
        Ok(())
    }

    async fn set_pause(&self, paused: bool) -> Result<()> {
        let event = {
            let mut state = self.shared.state.lock();
            let media = state.media.ok_or_else(Self::no_media)?;
            match (paused, state.state) {
                (true, EngineState::Playing) => {
                    state.state = EngineState::Paused;
                    Some(EngineEvent::Paused(media))
                }
                (false, EngineState::Paused) => {
                    state.state = EngineState::Playing;
                    Some(EngineEvent::Playing(media))
                }
                _ => None,
            }
        };
        if let Some(event) = event {
            self.send(event);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let media = {
            let mut state = self.shared.state.lock();
            state.state = EngineState::Stopped;
            state.position = Duration::ZERO;
            state.media
        };
        if let Some(media) = media {
            self.send(EngineEvent::Stopped(media));
        }
        Ok(())
    }

    fn state(&self) -> EngineState {
        self.shared.state.lock().state
    }

    fn time(&self) -> Option<Duration> {
        let state = self.shared.state.lock();
        matches!(state.state, EngineState::Playing | EngineState::Paused).then_some(state.position)
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.media.ok_or_else(Self::no_media)?;
        state.position = position;
        Ok(())
    }

    fn volume(&self) -> Option<u8> {
        Some(self.shared.state.lock().volume)
    }

    async fn set_volume(&self, volume: u8) -> Result<()> {
        self.shared.state.lock().volume = volume;
        Ok(())
    }

    async fn output_devices(&self) -> Result<Vec<OutputDevice>> {
        Ok(self.shared.devices.clone())
    }

    fn output_device(&self) -> Option<String> {
        self.shared.state.lock().device.clone()
    }

    async fn set_output_device(&self, device_id: &str) -> Result<()> {
        self.shared.state.lock().device = Some(device_id.to_string());
        Ok(())
    }

    async fn tracks(&self, media: MediaHandle, kind: StreamKind) -> Result<Vec<EngineTrack>> {
        if !self.shared.state.lock().loaded.contains_key(&media) {
            return Err(BridgeError::NotFound(media.to_string()));
        }
        Ok(self
            .shared
            .tracks
            .iter()
            .filter(|track| track.kind == kind)
            .cloned()
            .collect())
    }

    async fn select_track(&self, kind: StreamKind, track: Option<i32>) -> Result<()> {
        self.shared.state.lock().selected.insert(kind, track);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }
}
