//! Remote store abstraction
//!
//! Provides a trait for the hierarchical key/value store the cache mirrors.
//! Implementations own transport, sessions and retry policy; the cache only
//! relies on the operations below.

use crate::error::CanopyResult;
use crate::model::ZPath;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Store-assigned metadata for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Transaction that created the node
    pub czxid: u64,
    /// Transaction that last modified the node
    pub mzxid: u64,
    /// Data version, bumped on every write
    pub version: i32,
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub num_children: u32,
    pub data_length: u32,
    /// Owning session for ephemeral nodes
    pub ephemeral_owner: Option<Uuid>,
}

/// Lifetime of a created node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// Lives until deleted
    #[default]
    Persistent,
    /// Removed when the creating session expires
    Ephemeral,
    /// Removed once its last child is deleted
    Container,
}

/// Options applied when writing a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    pub mode: CreateMode,
    /// Create missing ancestors with empty payloads
    pub create_parents: bool,
    /// Overwrite the payload when the node already exists
    pub set_data_if_exists: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            mode: CreateMode::Persistent,
            create_parents: true,
            set_data_if_exists: true,
        }
    }
}

/// Options applied when deleting a node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Remove descendants first instead of failing with `NotEmpty`
    pub delete_children: bool,
    /// Ignore `NotFound`
    pub quietly: bool,
}

/// Kind of change reported by a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventKind {
    Created,
    Changed,
    Deleted,
}

/// A change at or under a watched path
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: ZPath,
    /// New payload; `None` for deletions
    pub data: Option<Vec<u8>>,
    /// New stat, or the last known stat for deletions
    pub stat: Stat,
    /// Store transaction that caused the change
    pub zxid: u64,
}

/// A node as returned by a subtree enumeration
#[derive(Debug, Clone)]
pub struct StoreNode {
    pub path: ZPath,
    pub data: Vec<u8>,
    pub stat: Stat,
}

/// Point-in-time read of a subtree
#[derive(Debug, Clone, Default)]
pub struct SubtreeSnapshot {
    /// Last store transaction reflected by `nodes`
    pub zxid: u64,
    /// Nodes in path order, parents before children
    pub nodes: Vec<StoreNode>,
}

/// Connection state transitions published by the store client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Suspended,
    Lost,
    Reconnected,
}

impl ConnectionState {
    /// Whether requests can reach the store in this state
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Reconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Suspended => write!(f, "suspended"),
            Self::Lost => write!(f, "lost"),
            Self::Reconnected => write!(f, "reconnected"),
        }
    }
}

/// Handle for a registered watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

/// Handle for a registered connection listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionListenerId(pub u64);

/// Callback invoked for every change at or under a watched path
pub type WatchCallback = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Callback invoked on connection state transitions
pub type ConnectionCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Abstract hierarchical store client
///
/// Callbacks are delivered in store order. Implementations must not invoke
/// two callbacks for the same registration concurrently.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create the node, or overwrite its payload if it exists and the
    /// options allow it
    async fn create_or_set(
        &self,
        path: &ZPath,
        data: Vec<u8>,
        options: &CreateOptions,
    ) -> CanopyResult<Stat>;

    /// Overwrite an existing node, optionally checking its version
    async fn set_data(&self, path: &ZPath, data: Vec<u8>, version: Option<i32>)
        -> CanopyResult<Stat>;

    /// Read payload and stat
    async fn read(&self, path: &ZPath) -> CanopyResult<(Vec<u8>, Stat)>;

    /// Stat of the node, if it exists
    async fn exists(&self, path: &ZPath) -> CanopyResult<Option<Stat>>;

    /// Direct children of the node
    async fn children(&self, path: &ZPath) -> CanopyResult<Vec<ZPath>>;

    /// Delete the node, optionally checking its version
    async fn delete(
        &self,
        path: &ZPath,
        version: Option<i32>,
        options: &DeleteOptions,
    ) -> CanopyResult<()>;

    /// Read the node and all of its descendants in one consistent snapshot
    async fn enumerate_subtree(&self, path: &ZPath) -> CanopyResult<SubtreeSnapshot>;

    /// Register a persistent recursive watch on `path`
    async fn watch(&self, path: &ZPath, callback: WatchCallback) -> CanopyResult<WatchId>;

    /// Cancel a watch; unknown ids are ignored
    async fn unwatch(&self, id: WatchId) -> CanopyResult<()>;

    /// Subscribe to connection state transitions
    fn add_connection_listener(&self, callback: ConnectionCallback) -> ConnectionListenerId;

    /// Unsubscribe from connection state transitions
    fn remove_connection_listener(&self, id: ConnectionListenerId);

    /// Current connection state
    fn connection_state(&self) -> ConnectionState;

    /// Human-readable store name for display
    fn store_name(&self) -> &'static str;
}
