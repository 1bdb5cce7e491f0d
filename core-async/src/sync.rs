//! Synchronization primitives.
//!
//! Tokio's async-aware primitives are re-exported as-is. On top of them this
//! module provides [`KeyedMutex`], an async exclusive section per key, which
//! the cache registry uses so that only one discovery or caching operation
//! runs per source locator at a time.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{KeyedMutex, Mutex};
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     *mutex.lock().await += 1;
//!
//!     let locks = KeyedMutex::new();
//!     let guard = locks.lock("a").await;
//!     // A second `lock("a")` waits here, `lock("b")` does not.
//!     drop(guard);
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, OwnedMutexGuard, RwLock,
    RwLockReadGuard, RwLockWriteGuard, Semaphore, SemaphorePermit,
};
pub use tokio_util::sync::CancellationToken;

// ============================================================================
// Keyed Mutex
// ============================================================================

/// A family of async mutexes addressed by key.
///
/// Slots are created on first use and removed again once the last holder
/// or waiter for a key is gone, so the map only ever contains keys that are
/// currently contended.
pub struct KeyedMutex<K> {
    slots: parking_lot::Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty keyed mutex.
    pub fn new() -> Self {
        Self {
            slots: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the exclusive section for `key`, waiting for any current
    /// holder to release it.
    pub async fn lock(&self, key: K) -> KeyedMutexGuard<'_, K> {
        let slot = {
            let mut slots = self.slots.lock();
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        // Declared before the wait so a cancelled wait drops its slot
        // reference first.
        let mut waiter = Waiter {
            owner: self,
            key: Some(key),
        };
        let guard = slot.lock_owned().await;
        KeyedMutexGuard {
            owner: self,
            key: waiter.key.take(),
            guard: Some(guard),
        }
    }

    /// Returns `true` when some task currently holds or waits for `key`.
    pub fn is_contended(&self, key: &K) -> bool {
        self.slots.lock().contains_key(key)
    }

    /// Number of keys with a live holder or waiter.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns `true` when no key is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, key: K) {
        let mut slots = self.slots.lock();
        let idle = slots
            .get(&key)
            .map(|slot| Arc::strong_count(slot) == 1)
            .unwrap_or(false);
        if idle {
            slots.remove(&key);
        }
    }
}

impl<K> Default for KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for KeyedMutex<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedMutex")
            .field("keys", &self.slots.lock().len())
            .finish()
    }
}

/// Releases the key when a pending [`KeyedMutex::lock`] is cancelled.
struct Waiter<'a, K>
where
    K: Eq + Hash + Clone,
{
    owner: &'a KeyedMutex<K>,
    key: Option<K>,
}

impl<K> Drop for Waiter<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.owner.release(key);
        }
    }
}

/// Guard returned by [`KeyedMutex::lock`]. Releases the key on drop.
pub struct KeyedMutexGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    owner: &'a KeyedMutex<K>,
    key: Option<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> KeyedMutexGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    /// The key this guard holds.
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }
}

impl<K> Drop for KeyedMutexGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        // Unlock before checking whether the slot is still referenced.
        drop(self.guard.take());
        if let Some(key) = self.key.take() {
            self.owner.release(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedMutex::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("track").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedMutex::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn slot_is_removed_after_release() {
        let locks = KeyedMutex::new();
        {
            let guard = locks.lock("x".to_string()).await;
            assert_eq!(guard.key().map(String::as_str), Some("x"));
            assert!(locks.is_contended(&"x".to_string()));
        }
        assert!(!locks.is_contended(&"x".to_string()));
    }
}
