//! Model (de)serialization
//!
//! The store only sees bytes; a `ModelSerializer` turns them into typed
//! models. Zero-length payloads are reserved for structural nodes (parents
//! created on demand) and are never handed to a serializer by the cache.

use crate::error::{CanopyError, CanopyResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Converts models to and from the bytes stored at a node
pub trait ModelSerializer<T>: Send + Sync {
    /// Encode a model
    fn serialize(&self, model: &T) -> CanopyResult<Vec<u8>>;

    /// Decode a model
    fn deserialize(&self, bytes: &[u8]) -> CanopyResult<T>;
}

/// JSON serializer backed by serde
pub struct JsonModelSerializer<T> {
    _model: PhantomData<fn() -> T>,
}

impl<T> JsonModelSerializer<T> {
    pub fn new() -> Self {
        Self {
            _model: PhantomData,
        }
    }
}

impl<T> Default for JsonModelSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonModelSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonModelSerializer")
    }
}

impl<T> ModelSerializer<T> for JsonModelSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, model: &T) -> CanopyResult<Vec<u8>> {
        Ok(serde_json::to_vec(model)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> CanopyResult<T> {
        serde_json::from_slice(bytes).map_err(|e| CanopyError::serialization("<payload>", e))
    }
}
