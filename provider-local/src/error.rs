//! Error types for the local data source

use bridge_traits::error::BridgeError;
use core_playback::PlaybackError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalSourceError {
    /// The locator does not name an existing regular file
    #[error("File does not exist: {0}")]
    FileNotFound(String),

    /// A listing was requested for a path that is not a directory
    #[error("Directory does not exist: {0}")]
    DirectoryNotFound(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, LocalSourceError>;

impl From<LocalSourceError> for PlaybackError {
    fn from(error: LocalSourceError) -> Self {
        match error {
            LocalSourceError::FileNotFound(path) | LocalSourceError::DirectoryNotFound(path) => {
                PlaybackError::SourceNotFound(path)
            }
            LocalSourceError::Bridge(BridgeError::NotFound(path)) => PlaybackError::SourceNotFound(path),
            LocalSourceError::Bridge(error) => PlaybackError::Bridge(error),
        }
    }
}
