//! Async runtime abstraction layer for Media Deck.
//!
//! Every `core-*` and `provider-*` crate depends on this crate instead of
//! reaching for tokio directly. The modules re-export the tokio primitives the
//! workspace relies on and add the few helpers tokio does not ship:
//!
//! - `sync`: async locks, channels, [`sync::KeyedMutex`] for per-key exclusion
//!   and [`sync::CancellationToken`]
//! - `task`: task spawning, including fire-and-forget [`task::spawn_detached`]
//! - `time`: sleeps, timeouts and [`time::bounded`]
//! - `io`: async read/write traits
//! - `runtime`: access to the ambient runtime handle
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::KeyedMutex;
//! use core_async::time::{bounded, Duration};
//!
//! async fn example() {
//!     let locks: KeyedMutex<String> = KeyedMutex::new();
//!     let _guard = locks.lock("/music/track.flac".to_string()).await;
//!
//!     let value = bounded(Duration::from_secs(1), async { 42 }).await;
//!     assert_eq!(value.ok(), Some(42));
//! }
//! ```

pub mod io;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
