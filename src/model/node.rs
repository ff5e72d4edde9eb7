//! Typed node wrappers

use crate::model::path::ZPath;
use crate::store::Stat;
use serde::Serialize;

/// A decoded model together with where it lives and its store metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZNode<T> {
    pub path: ZPath,
    pub stat: Stat,
    pub model: T,
}

impl<T> ZNode<T> {
    pub fn new(path: ZPath, stat: Stat, model: T) -> Self {
        Self { path, stat, model }
    }

    pub fn model(&self) -> &T {
        &self.model
    }
}

/// Models that know the node name they should be stored under
///
/// Lets callers write `framework.child_for(&model)` instead of spelling out
/// the segment.
pub trait NodeName {
    fn node_name(&self) -> String;
}

impl NodeName for String {
    fn node_name(&self) -> String {
        self.clone()
    }
}

impl NodeName for &str {
    fn node_name(&self) -> String {
        (*self).to_string()
    }
}

impl NodeName for u64 {
    fn node_name(&self) -> String {
        self.to_string()
    }
}
