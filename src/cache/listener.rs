//! Listener registration and dispatch
//!
//! Listeners run synchronously on the cache's writer task, in registration
//! order. A slow listener delays every later event; hand heavy work off to a
//! channel instead of doing it inline.

use crate::cache::event::{CacheEvent, CachePhase};
use crate::error::{CanopyError, CanopyResult};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Receives cache events
pub trait ModeledCacheListener<T>: Send + Sync {
    /// Handle one event
    ///
    /// Errors are logged by the dispatcher and never reach the cache.
    fn accept(&self, event: &CacheEvent<T>) -> CanopyResult<()>;

    /// Whether `event` should be delivered given the cache's phase
    ///
    /// Filter decorators override this; plain listeners accept everything.
    fn admits(&self, _event: &CacheEvent<T>, _phase: CachePhase) -> bool {
        true
    }
}

impl<T, F> ModeledCacheListener<T> for F
where
    F: Fn(&CacheEvent<T>) -> CanopyResult<()> + Send + Sync,
{
    fn accept(&self, event: &CacheEvent<T>) -> CanopyResult<()> {
        self(event)
    }
}

/// Handle returned by `Listenable::add_listener`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Ordered set of listeners attached to a cache
pub struct Listenable<T> {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ModeledCacheListener<T>>)>>,
    next_id: AtomicU64,
}

impl<T> Listenable<T> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener; it receives events after all earlier ones
    pub fn add_listener<L>(&self, listener: L) -> ListenerId
    where
        L: ModeledCacheListener<T> + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Unregister a listener; returns false if it was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Deliver `event` to every admitting listener
    ///
    /// A failing or panicking listener is logged and skipped; the rest still
    /// receive the event. Returns the number of failures.
    pub(crate) fn notify(&self, event: &CacheEvent<T>, phase: CachePhase) -> usize {
        // Snapshot so listeners may add or remove listeners while running
        let listeners: Vec<_> = self.listeners.read().clone();
        let mut failures = 0;

        for (index, (id, listener)) in listeners.iter().enumerate() {
            if !listener.admits(event, phase) {
                trace!("Listener {:?} filtered {}", id, event.kind());
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.accept(event)));
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(panic) => CanopyError::Listener(panic_message(panic.as_ref())),
            };
            failures += 1;
            warn!(
                "Listener #{} ({:?}) failed on {} event: {}",
                index,
                id,
                event.kind(),
                error
            );
        }

        failures
    }
}

impl<T> Default for Listenable<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
