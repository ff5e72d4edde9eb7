//! Canopy - typed, reactive cache over a hierarchical store
//!
//! Mirrors a subtree of a remote key/value hierarchy in memory, decodes its
//! payloads into typed models and turns change notifications into ordered
//! model events that survive connection loss.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod framework;
pub mod model;
pub mod store;
pub mod ui;

pub use cache::{CacheEvent, CacheEventKind, CachePhase, ListenerExt, ModeledCacheListener};
pub use error::{CanopyError, CanopyResult};
pub use framework::{CachedModeledFramework, ModeledFramework};
pub use model::{JsonModelSerializer, ModelSpec, ZNode, ZPath};
pub use store::{MemoryStore, RemoteStore};
