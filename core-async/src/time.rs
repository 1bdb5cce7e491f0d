//! Time-related utilities.
//!
//! Re-exports tokio's timers plus [`bounded`], the helper every engine wait
//! in the workspace goes through so that no operation blocks indefinitely.

use std::fmt;
use std::future::Future;

pub use std::time::{Duration, Instant};
pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

/// Error returned by [`bounded`] when the deadline passes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    /// The limit that was exceeded.
    pub limit: Duration,
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation did not complete within {:?}", self.limit)
    }
}

impl std::error::Error for Elapsed {}

/// Runs `future` to completion or until `limit` elapses.
pub async fn bounded<F>(limit: Duration, future: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| Elapsed { limit })
}
