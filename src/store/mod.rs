//! Store module for the hierarchical namespace the cache mirrors
//!
//! - `RemoteStore`: the client interface the cache consumes
//! - `MemoryStore`: an in-process implementation with connection simulation

mod memory;
mod remote;

pub use memory::{MemoryStore, ServerView};
pub use remote::{
    ConnectionCallback, ConnectionListenerId, ConnectionState, CreateMode, CreateOptions,
    DeleteOptions, RemoteStore, Stat, StoreNode, SubtreeSnapshot, WatchCallback, WatchEvent,
    WatchEventKind, WatchId,
};
