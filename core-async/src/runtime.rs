//! Runtime utilities that abstract over the underlying async executor.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Returns the handle of the runtime the caller is running on, if any.
///
/// Fire-and-forget work uses this to decide whether it can be scheduled or
/// has to be dropped because no executor is available.
pub fn current() -> Option<Handle> {
    Handle::try_current().ok()
}

/// Runs `future` to completion on a throwaway current-thread runtime.
///
/// Meant for synchronous call sites (tracing layers, tests) that are not
/// running inside an executor.
pub fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
