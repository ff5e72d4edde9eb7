//! Listener decorators
//!
//! Each decorator wraps a listener and narrows what it admits. They compose:
//! `listener.only(&[..]).post_initialized_only()` delivers an event only if
//! every layer admits it.

use crate::cache::event::{CacheEvent, CacheEventKind, CachePhase};
use crate::cache::listener::ModeledCacheListener;
use crate::error::CanopyResult;

/// Suppresses everything until the cache is initialized
///
/// The `Initialized` event itself is also suppressed: the wrapped listener
/// sees neither the initial snapshot nor the boundary, only what changes
/// after it.
pub struct PostInitializedOnly<L> {
    inner: L,
}

impl<T, L> ModeledCacheListener<T> for PostInitializedOnly<L>
where
    L: ModeledCacheListener<T>,
{
    fn accept(&self, event: &CacheEvent<T>) -> CanopyResult<()> {
        self.inner.accept(event)
    }

    fn admits(&self, event: &CacheEvent<T>, phase: CachePhase) -> bool {
        phase == CachePhase::Initialized
            && !matches!(event, CacheEvent::Initialized)
            && self.inner.admits(event, phase)
    }
}

/// Admits events matching a predicate
pub struct Filtered<L, F> {
    inner: L,
    predicate: F,
}

impl<T, L, F> ModeledCacheListener<T> for Filtered<L, F>
where
    L: ModeledCacheListener<T>,
    F: Fn(&CacheEvent<T>) -> bool + Send + Sync,
{
    fn accept(&self, event: &CacheEvent<T>) -> CanopyResult<()> {
        self.inner.accept(event)
    }

    fn admits(&self, event: &CacheEvent<T>, phase: CachePhase) -> bool {
        (self.predicate)(event) && self.inner.admits(event, phase)
    }
}

/// Admits only the listed event kinds
pub struct OnlyKinds<L> {
    inner: L,
    kinds: Vec<CacheEventKind>,
}

impl<T, L> ModeledCacheListener<T> for OnlyKinds<L>
where
    L: ModeledCacheListener<T>,
{
    fn accept(&self, event: &CacheEvent<T>) -> CanopyResult<()> {
        self.inner.accept(event)
    }

    fn admits(&self, event: &CacheEvent<T>, phase: CachePhase) -> bool {
        self.kinds.contains(&event.kind()) && self.inner.admits(event, phase)
    }
}

/// Decorator constructors for any listener
pub trait ListenerExt<T>: ModeledCacheListener<T> + Sized {
    fn post_initialized_only(self) -> PostInitializedOnly<Self> {
        PostInitializedOnly { inner: self }
    }

    fn filtered<F>(self, predicate: F) -> Filtered<Self, F>
    where
        F: Fn(&CacheEvent<T>) -> bool + Send + Sync,
    {
        Filtered {
            inner: self,
            predicate,
        }
    }

    fn only(self, kinds: &[CacheEventKind]) -> OnlyKinds<Self> {
        OnlyKinds {
            inner: self,
            kinds: kinds.to_vec(),
        }
    }
}

impl<T, L> ListenerExt<T> for L where L: ModeledCacheListener<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::listener::Listenable;
    use crate::model::{ZNode, ZPath};
    use crate::store::Stat;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn node(value: u32) -> ZNode<u32> {
        let now = Utc::now();
        let stat = Stat {
            czxid: 1,
            mzxid: 1,
            version: 0,
            ctime: now,
            mtime: now,
            num_children: 0,
            data_length: 1,
            ephemeral_owner: None,
        };
        ZNode::new(ZPath::parse("/n").unwrap(), stat, value)
    }

    fn counter() -> (
        Arc<AtomicUsize>,
        impl Fn(&CacheEvent<u32>) -> CanopyResult<()> + Send + Sync + 'static,
    ) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let listener = move |_: &CacheEvent<u32>| -> CanopyResult<()> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        (count, listener)
    }

    #[test]
    fn post_initialized_only_waits_for_phase() {
        let (count, listener) = counter();
        let listenable = Listenable::<u32>::new();
        listenable.add_listener(listener.post_initialized_only());

        listenable.notify(&CacheEvent::NodeAdded(node(1)), CachePhase::Initializing);
        listenable.notify(&CacheEvent::ConnectionLost, CachePhase::Initializing);
        listenable.notify(&CacheEvent::Initialized, CachePhase::Initialized);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        listenable.notify(&CacheEvent::NodeAdded(node(2)), CachePhase::Initialized);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn decorators_compose() {
        let (count, listener) = counter();
        let listenable = Listenable::<u32>::new();
        listenable.add_listener(
            listener
                .only(&[CacheEventKind::NodeAdded, CacheEventKind::NodeUpdated])
                .filtered(|event: &CacheEvent<u32>| event.model().is_some_and(|m| *m > 10))
                .post_initialized_only(),
        );

        listenable.notify(&CacheEvent::NodeAdded(node(50)), CachePhase::Initializing);
        listenable.notify(&CacheEvent::NodeAdded(node(5)), CachePhase::Initialized);
        listenable.notify(&CacheEvent::NodeRemoved(node(50)), CachePhase::Initialized);
        listenable.notify(&CacheEvent::ConnectionReconnected, CachePhase::Initialized);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        listenable.notify(&CacheEvent::NodeUpdated(node(50)), CachePhase::Initialized);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
