use core_playback::{BackendId, BackendRole, ChannelId, OwnerId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Media manager has been shut down")]
    ShutDown,

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Unknown data source: {0}")]
    UnknownSource(OwnerId),

    #[error("Unknown backend: {0}")]
    UnknownBackend(BackendId),

    #[error("Unknown channel: {0}")]
    UnknownChannel(ChannelId),

    #[error("Channel {channel} has no backend for the {role:?} role")]
    RoleUnassigned { channel: ChannelId, role: BackendRole },

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),
}

impl CoreError {
    /// Errors raised by the manager itself rather than a component it
    /// routed to. Component errors have already been reported at their
    /// own boundary.
    pub(crate) fn is_local(&self) -> bool {
        !matches!(self, CoreError::Playback(_))
    }

    /// The playback error behind this one, if any.
    pub fn as_playback(&self) -> Option<&core_playback::PlaybackError> {
        match self {
            CoreError::Playback(error) => Some(error),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use core_playback::PlaybackError;

    #[test]
    fn playback_errors_are_not_local() {
        let error: CoreError = PlaybackError::NoActiveMedia.into();
        assert!(!error.is_local());
        assert!(matches!(error.as_playback(), Some(PlaybackError::NoActiveMedia)));

        assert!(CoreError::ShutDown.is_local());
        assert!(CoreError::ShutDown.as_playback().is_none());
    }
}
