//! Cache lifecycle and typed events

use crate::model::ZNode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePhase {
    NotStarted,
    /// Started; the first snapshot has not been installed yet
    Initializing,
    /// Mirroring the store
    Initialized,
    Closed,
}

impl fmt::Display for CachePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Initializing => write!(f, "initializing"),
            Self::Initialized => write!(f, "initialized"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Discriminant of a `CacheEvent`, used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    NodeAdded,
    NodeUpdated,
    NodeRemoved,
    Initialized,
    ConnectionSuspended,
    ConnectionLost,
    ConnectionReconnected,
}

impl CacheEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeAdded => "added",
            Self::NodeUpdated => "updated",
            Self::NodeRemoved => "removed",
            Self::Initialized => "initialized",
            Self::ConnectionSuspended => "suspended",
            Self::ConnectionLost => "lost",
            Self::ConnectionReconnected => "reconnected",
        }
    }
}

impl fmt::Display for CacheEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event delivered to cache listeners
///
/// Node events carry the node as it was added or updated, or its last
/// cached state for removals.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent<T> {
    NodeAdded(ZNode<T>),
    NodeUpdated(ZNode<T>),
    NodeRemoved(ZNode<T>),
    Initialized,
    ConnectionSuspended,
    ConnectionLost,
    ConnectionReconnected,
}

impl<T> CacheEvent<T> {
    pub fn kind(&self) -> CacheEventKind {
        match self {
            Self::NodeAdded(_) => CacheEventKind::NodeAdded,
            Self::NodeUpdated(_) => CacheEventKind::NodeUpdated,
            Self::NodeRemoved(_) => CacheEventKind::NodeRemoved,
            Self::Initialized => CacheEventKind::Initialized,
            Self::ConnectionSuspended => CacheEventKind::ConnectionSuspended,
            Self::ConnectionLost => CacheEventKind::ConnectionLost,
            Self::ConnectionReconnected => CacheEventKind::ConnectionReconnected,
        }
    }

    /// The node for node events
    pub fn node(&self) -> Option<&ZNode<T>> {
        match self {
            Self::NodeAdded(node) | Self::NodeUpdated(node) | Self::NodeRemoved(node) => Some(node),
            _ => None,
        }
    }

    /// The model for node events
    pub fn model(&self) -> Option<&T> {
        self.node().map(|node| &node.model)
    }

    pub fn is_node_event(&self) -> bool {
        self.node().is_some()
    }
}
