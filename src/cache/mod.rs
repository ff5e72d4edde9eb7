//! Reactive cache over a store subtree
//!
//! Keeps a typed, continuously updated copy of everything under a model
//! spec's path and turns raw watch notifications into typed events.
//!
//! # Lifecycle
//!
//! | Phase | Reads | Events |
//! |-------|-------|--------|
//! | NotStarted | empty | none |
//! | Initializing | partial | connection events only |
//! | Initialized | current | node, connection |
//! | Closed | `Closed` error | none |
//!
//! Losing the connection never clears the cache: reads keep returning the
//! last known nodes, and the reconnect resync reports whatever changed in
//! the meantime as ordinary node events.

pub mod event;
pub mod filter;
pub mod listener;
mod modeled_cache;

pub use event::{CacheEvent, CacheEventKind, CachePhase};
pub use filter::{Filtered, ListenerExt, OnlyKinds, PostInitializedOnly};
pub use listener::{Listenable, ListenerId, ModeledCacheListener};
pub use modeled_cache::ModeledCache;
