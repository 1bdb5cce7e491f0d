//! # Playback Orchestration
//!
//! Plays items from heterogeneous sources through heterogeneous engines.
//!
//! ## Overview
//!
//! This module handles:
//! - [`PlayItem`]s and their cache state machine ([`item`], [`cache`])
//! - Per-source registries that deduplicate discovery and caching per locator
//! - The backend capability model: a base [`BackendService`] plus optional
//!   stream-selection facets ([`backend`])
//! - [`Channel`]s binding a cached item to audio, video and subtitle roles
//! - Playback events fanned out to async observers ([`events`])
//!
//! ## Flow
//!
//! ```text
//! DataSource ──discover──> PlayItem ──CacheRegistry::cache──> Memory | Disk
//!                                                                 │
//!                         BackendService::create_channel <────────┘
//!                                     │
//!                 play / pause / stop / seek / volume / streams
//!                                     │
//!                         EventHandlers<BackendEvent>
//! ```

pub mod backend;
pub mod cache;
pub mod channel;
pub mod error;
pub mod events;
pub mod item;
pub mod report;
pub mod source;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::{
    bootstrap, BackendId, BackendRole, BackendService, Capability, EngineBackend, Roles,
    SelectableStream, StreamSelection,
};
pub use cache::{
    strategy_for, CacheRegistry, CacheStrategy, DiskCopyStrategy, InPlaceStrategy, ItemResolver,
    MemoryStrategy,
};
pub use channel::{Channel, ChannelId, ChannelState, EndedCallback};
pub use error::{PlaybackError, Result, StrategyError};
pub use events::{BackendEvent, CacheEvent, CoreEvent};
pub use item::{CacheState, ItemInfo, OwnerId, PlayItem, Thumbnail};
pub use report::ErrorReporter;
pub use source::{BrowsableSource, DataSource};
