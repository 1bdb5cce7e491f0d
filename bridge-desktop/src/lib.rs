//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - [`TokioFileSystem`]: `FileSystemAccess` on top of `tokio::fs`, with
//!   seek-based range reads and a per-user cache directory
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::TokioFileSystem;
//! use bridge_traits::FileSystemAccess;
//!
//! #[tokio::main]
//! async fn main() {
//!     let fs = TokioFileSystem::new();
//!     let header = fs.read_prefix("/music/track.flac".as_ref(), 4096).await;
//! }
//! ```

mod filesystem;

pub use filesystem::TokioFileSystem;
