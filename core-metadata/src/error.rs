use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to extract metadata: {0}")]
    ExtractionFailed(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl MetadataError {
    /// The file exists but its content could not be understood.
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            MetadataError::ExtractionFailed(_) | MetadataError::UnsupportedFormat(_)
        )
    }
}

impl From<MetadataError> for BridgeError {
    fn from(error: MetadataError) -> Self {
        match error {
            MetadataError::Bridge(inner) => inner,
            MetadataError::Io(inner) => BridgeError::Io(inner),
            MetadataError::FileNotFound(path) => BridgeError::NotFound(path),
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
