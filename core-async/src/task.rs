//! Task spawning and execution abstractions.
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//!
//! async fn example() {
//!     let handle = task::spawn(async { 42 });
//!     assert_eq!(handle.await.ok(), Some(42));
//!
//!     // Nobody waits for this one; a failure is only logged.
//!     task::spawn_detached("cleanup", async { Ok::<_, std::io::Error>(()) });
//! }
//! ```

use std::fmt::Display;
use std::future::Future;

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle, JoinSet};

/// Spawns a new asynchronous task on the ambient Tokio runtime.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Spawns a fallible task whose outcome nobody awaits.
///
/// Errors are logged with the given `label`. When the caller is not running
/// inside a runtime the future is dropped and `false` is returned.
pub fn spawn_detached<F, E>(label: &'static str, future: F) -> bool
where
    F: Future<Output = std::result::Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let Some(handle) = crate::runtime::current() else {
        tracing::warn!(task = label, "No async runtime available, detached task dropped");
        return false;
    };

    handle.spawn(async move {
        if let Err(error) = future.await {
            tracing::warn!(task = label, error = %error, "Detached task failed");
        }
    });
    true
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::oneshot;

    #[tokio::test]
    async fn detached_task_runs_to_completion() {
        let (tx, rx) = oneshot::channel();
        let scheduled = spawn_detached("signal", async move {
            tx.send(7).map_err(|_| "receiver gone")?;
            Ok::<_, &'static str>(())
        });

        assert!(scheduled);
        assert_eq!(rx.await.ok(), Some(7));
    }

    #[test]
    fn detached_task_without_runtime_is_dropped() {
        let scheduled = spawn_detached("orphan", async { Ok::<_, &'static str>(()) });
        assert!(!scheduled);
    }
}
