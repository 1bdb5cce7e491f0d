//! # Playback Error Types
//!
//! Every public operation of a registry, data source or backend returns
//! [`PlaybackError`] and hands a structured report to the configured error
//! sink before returning (see [`crate::report::ErrorReporter`]).

use bridge_traits::error::BridgeError;
use bridge_traits::EngineState;
use std::time::Duration;
use thiserror::Error;

use crate::backend::{BackendId, BackendRole};
use crate::channel::{ChannelId, ChannelState};
use crate::item::{CacheState, OwnerId};

/// Failure raised by a [`CacheStrategy`](crate::cache::CacheStrategy) while
/// materializing an item.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("resource is {size} bytes, above the {limit} byte memory cache limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("strategy finished in state {0:?}, expected Memory or Disk")]
    UnexpectedState(CacheState),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Errors that can occur during playback orchestration.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Lifecycle
    // ========================================================================
    /// The process-wide engine bootstrap has not run yet.
    #[error("Media engine not initialized: {0}")]
    NotInitialized(String),

    // ========================================================================
    // Source & Cache Errors
    // ========================================================================
    /// The locator no longer resolves to a readable resource.
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// The item was produced by a different data source.
    #[error("Item belongs to {actual}, not {expected}")]
    OwnershipMismatch { expected: OwnerId, actual: OwnerId },

    /// Channels can only be created from items in the Memory or Disk state.
    #[error("Item not cached: {locator} is {state:?}")]
    ItemNotCached { locator: String, state: CacheState },

    /// The cache strategy failed; the item is now in the Failed state.
    #[error("Caching failed for {locator}: {source}")]
    StrategyFailure {
        locator: String,
        #[source]
        source: StrategyError,
    },

    // ========================================================================
    // Channel Errors
    // ========================================================================
    /// The requesting backend holds no role on the channel.
    #[error("Channel {channel} is not associated with backend {backend}")]
    ChannelNotAssociated {
        channel: ChannelId,
        backend: BackendId,
    },

    /// Another backend holds the role. It has to release it first.
    #[error("The {role:?} role of channel {channel} is held by backend {holder}")]
    RoleHeld {
        channel: ChannelId,
        role: BackendRole,
        holder: BackendId,
    },

    /// The channel is not the one loaded in the backend's playback slot.
    #[error("Channel {0} is not the active channel of its backend")]
    ChannelNotActive(ChannelId),

    /// The channel has been destroyed.
    #[error("Channel {0} is closed")]
    ChannelClosed(ChannelId),

    /// A pending play was cancelled by a stop or destroy of the same channel.
    #[error("Playback of channel {0} was cancelled")]
    PlaybackCancelled(ChannelId),

    // ========================================================================
    // Engine Errors
    // ========================================================================
    /// The engine settled in a state other than the one the command asked for.
    #[error("Expected channel to be {expected:?}, engine reports {actual:?}")]
    UnexpectedEngineState {
        expected: ChannelState,
        actual: EngineState,
    },

    /// The engine has no valid media position.
    #[error("No active media")]
    NoActiveMedia,

    /// The engine did not confirm readiness in time.
    #[error("Engine did not become ready within {0:?}")]
    EngineTimeout(Duration),

    /// A native engine call failed.
    #[error("Engine operation '{operation}' failed: {reason}")]
    EngineOperationFailed {
        operation: &'static str,
        reason: String,
    },

    // ========================================================================
    // Argument Errors
    // ========================================================================
    /// Volume must be a finite value in `[0.0, 1.0]`.
    #[error("Invalid volume: {0} (must be between 0.0 and 1.0)")]
    InvalidVolume(f32),

    #[error("Output device not found: {0}")]
    DeviceNotFound(String),

    /// The backend does not implement the requested capability facet.
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl PlaybackError {
    pub(crate) fn engine(operation: &'static str) -> impl FnOnce(BridgeError) -> Self {
        move |error| PlaybackError::EngineOperationFailed {
            operation,
            reason: error.to_string(),
        }
    }

    /// Returns `true` if the caller asked for something the current state
    /// does not allow. Retrying without changing the request will fail again.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::OwnershipMismatch { .. }
                | PlaybackError::ItemNotCached { .. }
                | PlaybackError::ChannelNotAssociated { .. }
                | PlaybackError::RoleHeld { .. }
                | PlaybackError::ChannelNotActive(_)
                | PlaybackError::ChannelClosed(_)
                | PlaybackError::InvalidVolume(_)
                | PlaybackError::DeviceNotFound(_)
                | PlaybackError::UnsupportedCapability(_)
        )
    }

    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::EngineTimeout(_) | PlaybackError::PlaybackCancelled(_)
        )
    }

    /// Returns `true` if the native engine is the origin of the failure.
    pub fn is_engine_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::EngineOperationFailed { .. }
                | PlaybackError::UnexpectedEngineState { .. }
                | PlaybackError::EngineTimeout(_)
                | PlaybackError::NoActiveMedia
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
