//! Integration tests for core-async on native platforms.
//!
//! These exercise the helpers the playback core leans on: per-key exclusion,
//! bounded waits, cancellation and detached tasks.

use core_async::sync::{CancellationToken, KeyedMutex};
use core_async::{runtime, sync, task, time};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_keyed_mutex_serializes_per_locator() {
    let locks = Arc::new(KeyedMutex::<String>::new());
    let order = Arc::new(sync::Mutex::new(Vec::new()));

    let first = locks.lock("/music/a.flac".to_string()).await;

    let waiter = {
        let locks = locks.clone();
        let order = order.clone();
        task::spawn(async move {
            let _guard = locks.lock("/music/a.flac".to_string()).await;
            order.lock().await.push("second");
        })
    };
    let other = {
        let locks = locks.clone();
        let order = order.clone();
        task::spawn(async move {
            let _guard = locks.lock("/music/b.flac".to_string()).await;
            order.lock().await.push("other");
        })
    };

    other.await.unwrap();
    task::yield_now().await;
    order.lock().await.push("first");
    drop(first);
    waiter.await.unwrap();

    assert_eq!(*order.lock().await, vec!["other", "first", "second"]);
    assert!(locks.is_empty());
}

#[tokio::test]
async fn test_keyed_mutex_many_waiters() {
    let locks = Arc::new(KeyedMutex::new());
    let counter = Arc::new(AtomicUsize::new(0));

    let mut set = task::JoinSet::new();
    for _ in 0..16 {
        let locks = locks.clone();
        let counter = counter.clone();
        set.spawn(async move {
            let _guard = locks.lock(1u32).await;
            let seen = counter.load(Ordering::SeqCst);
            task::yield_now().await;
            counter.store(seen + 1, Ordering::SeqCst);
        });
    }
    while let Some(result) = set.join_next().await {
        result.unwrap();
    }

    // No lost updates: every holder saw the previous holder's write.
    assert_eq!(counter.load(Ordering::SeqCst), 16);
    assert_eq!(locks.len(), 0);
}

#[tokio::test]
async fn test_keyed_mutex_cancelled_waiter_frees_the_key() {
    let locks = Arc::new(KeyedMutex::new());
    let holder = locks.lock("/music/a.flac").await;

    let waiter = {
        let locks = locks.clone();
        task::spawn(async move {
            let _guard = locks.lock("/music/a.flac").await;
        })
    };
    task::yield_now().await;
    assert!(locks.is_contended(&"/music/a.flac"));

    // The waiter is handed the lock, then cancelled before it runs.
    drop(holder);
    waiter.abort();
    assert!(waiter.await.unwrap_err().is_cancelled());

    assert!(locks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bounded_times_out() {
    let limit = time::Duration::from_secs(10);
    let pending = std::future::pending::<()>();

    let error = time::bounded(limit, pending).await.unwrap_err();
    assert_eq!(error.limit, limit);
    assert_eq!(
        error.to_string(),
        "operation did not complete within 10s"
    );
}

#[tokio::test]
async fn test_bounded_races_cancellation() {
    let token = CancellationToken::new();
    let child = token.child_token();

    let waiter = task::spawn(async move {
        time::bounded(time::Duration::from_secs(5), child.cancelled()).await
    });
    token.cancel();

    assert!(waiter.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_detached_failure_is_contained() {
    let (tx, rx) = sync::oneshot::channel();
    assert!(task::spawn_detached("failing", async move {
        let _ = tx.send(());
        Err::<(), _>("boom")
    }));

    // The failing task ran and the runtime is still usable.
    rx.await.unwrap();
    assert_eq!(task::spawn(async { 5 }).await.unwrap(), 5);
}

#[test]
fn test_block_on_outside_runtime() {
    assert!(runtime::current().is_none());
    let value = runtime::block_on(async {
        assert!(runtime::current().is_some());
        time::sleep(time::Duration::from_millis(1)).await;
        "ready"
    })
    .unwrap();
    assert_eq!(value, "ready");
}
