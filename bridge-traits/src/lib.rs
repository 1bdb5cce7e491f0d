//! # Host Bridge Traits
//!
//! Contracts between the Media Deck core and the collaborators it consumes but
//! never implements itself.
//!
//! ## Traits
//!
//! ### Media
//! - [`MediaEngine`](engine::MediaEngine) - Native decode/render engine driven by a playback backend
//! - [`MetadataProvider`](metadata::MetadataProvider) - Best-effort title/artist/duration/artwork extraction
//!
//! ### I/O
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File reads, prefix reads, cache directory access
//!
//! ### Diagnostics
//! - [`ErrorSink`](report::ErrorSink) - Structured error reports from public operations
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! use core_runtime::error::Error;
//!
//! let file_system = config.file_system
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "FileSystemAccess".to_string(),
//!         message: "No file system adapter provided. \
//!                  Desktop: enable the `desktop-shims` feature.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! Every bridge trait returns [`BridgeError`](error::BridgeError). Adapters
//! convert platform errors into it and keep the offending path or device in
//! the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared freely
//! across async tasks.

pub mod engine;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod report;
pub mod storage;

pub use error::BridgeError;

pub use engine::{
    EngineCapabilities, EngineEvent, EngineState, EngineTrack, MediaEngine, MediaHandle,
    MediaInput, OutputDevice, ParsedMedia, StreamKind,
};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use metadata::{Artwork, ExtractedMetadata, MetadataProvider};
pub use report::{ErrorReport, ErrorSink};
pub use storage::{FileMetadata, FileSystemAccess};
