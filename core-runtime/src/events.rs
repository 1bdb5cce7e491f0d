//! # Event Fan-out
//!
//! Two complementary notification mechanisms live here.
//!
//! - [`EventHandlers`] is an observer list owned by the object that raises
//!   events (a play item, a backend). Handlers are async closures. An event
//!   can be delivered *awaited*, where the emitting call completes only after
//!   every handler finished and their outcomes are aggregated, or
//!   *fire-and-forget*, where every handler runs as its own task and failures
//!   are only logged.
//! - [`EventBus`] is a `tokio::sync::broadcast` channel for consumers that
//!   prefer pulling events from a single stream. Observer lists can be
//!   forwarded into a bus with [`EventHandlers::forward_to`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐ emit (awaited)  ┌───────────────┐  handler  ┌──────────┐
//! │ Backend  ├────────────────>│ EventHandlers ├──────────>│ Observer │
//! └──────────┘                 │  (observers)  │           └──────────┘
//!                              │               │ forward   ┌──────────┐   subscribe  ┌────────────┐
//! ┌──────────┐ emit_and_forget │               ├──────────>│ EventBus ├─────────────>│ EventStream│
//! │ PlayItem ├────────────────>│               │           └──────────┘              └────────────┘
//! └──────────┘                 └───────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventHandlers, HandlerError};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let handlers: EventHandlers<u32> = EventHandlers::new();
//! handlers.subscribe(|value| async move {
//!     if value > 100 {
//!         return Err(HandlerError::new("value too large"));
//!     }
//!     Ok(())
//! });
//!
//! let outcome = handlers.emit(7).await;
//! assert!(outcome.is_success());
//!
//! // Nobody waits for these handlers.
//! handlers.emit_and_forget(500);
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Handler failures never propagate to the emitter as errors. Awaited
//! fan-out returns a [`FanOutOutcome`] listing them; fire-and-forget
//! fan-out logs them at `warn`.
//!
//! `EventBus` receivers can observe `RecvError::Lagged(n)` when they fall
//! behind by more than the buffer size; this is non-fatal. `RecvError::Closed`
//! means every sender is gone.

use futures::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for event bus channels.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Coarse importance of an event, used by hosts to route or filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Observer List
// ============================================================================

/// Failure returned by an event handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Result type returned by event handlers.
pub type HandlerResult = std::result::Result<(), HandlerError>;

type Handler<E> = Arc<dyn Fn(E) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Identifies one subscription to an [`EventHandlers`] list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Aggregated result of an awaited fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutOutcome {
    /// Handlers that ran to completion successfully.
    pub delivered: usize,
    /// Failures in subscription order.
    pub failures: Vec<HandlerError>,
}

impl FanOutOutcome {
    /// `true` when no handler failed. An empty subscriber set is a success.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of handlers that were invoked.
    pub fn invoked(&self) -> usize {
        self.delivered + self.failures.len()
    }
}

/// Ordered list of async event handlers.
pub struct EventHandlers<E> {
    next_id: AtomicU64,
    handlers: parking_lot::RwLock<Vec<(SubscriptionId, Handler<E>)>>,
}

impl<E> EventHandlers<E>
where
    E: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// Registers an async handler. Handlers are started in subscription order.
    pub fn subscribe<F, Fut>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: Handler<E> = Arc::new(move |event| handler(event).boxed());
        self.handlers.write().push((id, handler));
        id
    }

    /// Registers a synchronous observer that cannot fail.
    pub fn subscribe_fn<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(E) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            observer(event);
            futures::future::ready(Ok(()))
        })
    }

    /// Removes a subscription. Returns `false` when it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Handler<E>> {
        self.handlers
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }

    /// Awaited fan-out: completes once every handler has finished.
    ///
    /// Handlers run concurrently; completion order is unspecified.
    pub async fn emit(&self, event: E) -> FanOutOutcome {
        let handlers = self.snapshot();
        if handlers.is_empty() {
            return FanOutOutcome::default();
        }

        let pending: Vec<_> = handlers
            .iter()
            .map(|handler| handler(event.clone()))
            .collect();

        let mut outcome = FanOutOutcome::default();
        for result in join_all(pending).await {
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(error) => outcome.failures.push(error),
            }
        }

        if !outcome.is_success() {
            tracing::debug!(
                failed = outcome.failures.len(),
                invoked = outcome.invoked(),
                "Event handlers reported failures"
            );
        }
        outcome
    }

    /// Fire-and-forget fan-out: each handler runs as an independent task.
    ///
    /// Returns the number of handlers that were scheduled.
    pub fn emit_and_forget(&self, event: E) -> usize {
        let mut scheduled = 0;
        for handler in self.snapshot() {
            if core_async::task::spawn_detached("event-handler", handler(event.clone())) {
                scheduled += 1;
            }
        }
        scheduled
    }

    /// Forwards every event into `bus` after mapping it with `map`.
    pub fn forward_to<T, F>(&self, bus: &EventBus<T>, map: F) -> SubscriptionId
    where
        T: Clone + Send + 'static,
        F: Fn(E) -> T + Send + Sync + 'static,
    {
        let bus = bus.clone();
        self.subscribe_fn(move |event| {
            // No receivers is fine; the bus is a best-effort mirror.
            let _ = bus.emit(map(event));
        })
    }
}

impl<E> Default for EventHandlers<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventHandlers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("subscribers", &self.handlers.read().len())
            .finish()
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel carrying events of type `E`.
///
/// Cloning the bus yields another sender for the same channel.
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E> EventBus<E>
where
    E: Clone + Send + 'static,
{
    /// Creates a new event bus buffering up to `capacity` events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received it, or an error when
    /// nobody is subscribed.
    pub fn emit(&self, event: E) -> Result<usize, SendError<E>> {
        self.sender.send(event)
    }

    /// Creates a new raw receiver. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<E> {
        self.sender.subscribe()
    }

    /// Creates a new [`EventStream`].
    pub fn stream(&self) -> EventStream<E> {
        EventStream::new(self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E> Default for EventBus<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
pub struct EventStream<E> {
    receiver: Receiver<E>,
    filter: Option<EventFilter<E>>,
}

impl<E: Clone> EventStream<E> {
    pub fn new(receiver: Receiver<E>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &E) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<E, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<E, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl<E> fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
