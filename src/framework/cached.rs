//! Typed client backed by a cache
//!
//! Reads are served from the shared `ModeledCache` whenever it has the
//! node; writes always go to the store and come back through the watch, so
//! a `set` is not visible to `read_cached` until its event is applied.

use crate::cache::{CachePhase, Listenable, ModeledCache};
use crate::error::{CanopyError, CanopyResult};
use crate::framework::modeled::ModeledFramework;
use crate::model::{ModelSpec, NodeName, ZNode, ZPath};
use crate::store::Stat;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Cached typed access to a subtree
///
/// Children created with `child` share their parent's cache; only the
/// framework returned by `ModeledFramework::cached` owns a new one. The
/// cache is closed when the last framework sharing it is dropped.
pub struct CachedModeledFramework<T>
where
    T: Clone + Send + Sync + 'static,
{
    client: ModeledFramework<T>,
    shared: Arc<SharedCache<T>>,
}

impl<T> Clone for CachedModeledFramework<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            shared: self.shared.clone(),
        }
    }
}

/// The cache behind a family of frameworks
struct SharedCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    cache: Arc<ModeledCache<T>>,
}

impl<T> Drop for SharedCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if matches!(self.cache.phase(), CachePhase::NotStarted | CachePhase::Closed) {
            return;
        }
        let cache = self.cache.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Last framework for {} dropped, closing cache", cache.root());
                handle.spawn(async move { cache.close().await });
            }
            Err(_) => warn!(
                "Cache at {} dropped outside a runtime without close()",
                cache.root()
            ),
        }
    }
}

impl<T> CachedModeledFramework<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(client: ModeledFramework<T>) -> Self {
        let cache = ModeledCache::new(client.store().clone(), client.model_spec().clone());
        Self {
            client,
            shared: Arc::new(SharedCache { cache }),
        }
    }

    /// Start the shared cache; idempotent
    pub fn start(&self) -> CanopyResult<()> {
        self.cache().start()
    }

    /// Close the shared cache; idempotent
    pub async fn close(&self) {
        self.cache().close().await
    }

    /// Listeners of the shared cache
    pub fn listenable(&self) -> &Listenable<T> {
        self.cache().listenable()
    }

    pub fn phase(&self) -> CachePhase {
        self.cache().phase()
    }

    /// Wait for the initial snapshot
    pub async fn await_initialized(&self, timeout: Option<Duration>) -> CanopyResult<()> {
        self.cache().await_initialized(timeout).await
    }

    /// The shared cache; holding it does not keep the cache open
    pub fn cache(&self) -> &Arc<ModeledCache<T>> {
        &self.shared.cache
    }

    /// The uncached framework at the same path
    pub fn uncached(&self) -> &ModeledFramework<T> {
        &self.client
    }

    pub fn model_spec(&self) -> &ModelSpec<T> {
        self.client.model_spec()
    }

    pub fn path(&self) -> &ZPath {
        self.client.path()
    }

    /// Framework for the named child, sharing this cache
    pub fn child(&self, name: &str) -> CanopyResult<Self> {
        Ok(self.sharing(self.client.child(name)?))
    }

    /// Framework for the child named after `model`, sharing this cache
    pub fn child_for(&self, model: &impl NodeName) -> CanopyResult<Self> {
        Ok(self.sharing(self.client.child_for(model)?))
    }

    /// Framework for the parent path, sharing this cache
    pub fn parent(&self) -> Option<Self> {
        self.client.parent().map(|client| self.sharing(client))
    }

    /// Framework for an arbitrary path, sharing this cache
    pub fn with_path(&self, path: ZPath) -> Self {
        self.sharing(self.client.with_path(path))
    }

    /// Framework with `{parameters}` filled in, sharing this cache
    pub fn resolved<S: AsRef<str>>(&self, values: &[S]) -> CanopyResult<Self> {
        Ok(self.sharing(self.client.resolved(values)?))
    }

    fn sharing(&self, client: ModeledFramework<T>) -> Self {
        Self {
            client,
            shared: self.shared.clone(),
        }
    }

    fn ensure_open(&self) -> CanopyResult<()> {
        if self.cache().phase() == CachePhase::Closed {
            Err(CanopyError::Closed)
        } else {
            Ok(())
        }
    }

    /// Write through to the store
    pub async fn set(&self, model: &T) -> CanopyResult<Stat> {
        self.ensure_open()?;
        self.client.set(model).await
    }

    /// Versioned write through to the store
    pub async fn update(&self, model: &T, version: Option<i32>) -> CanopyResult<Stat> {
        self.ensure_open()?;
        self.client.update(model, version).await
    }

    /// Delete through the store
    pub async fn delete(&self, version: Option<i32>) -> CanopyResult<()> {
        self.ensure_open()?;
        self.client.delete(version).await
    }

    /// Model at this path, from the cache when possible
    pub async fn read(&self) -> CanopyResult<T> {
        Ok(self.read_with_stat().await?.model)
    }

    /// Node at this path, from the cache when possible
    ///
    /// Once the cache is initialized a cached node is returned without
    /// touching the store, even while disconnected. Otherwise the store is
    /// asked directly.
    pub async fn read_with_stat(&self) -> CanopyResult<ZNode<T>> {
        let cached = self.cache().current_data(self.path())?;
        if self.cache().phase() == CachePhase::Initialized {
            if let Some(node) = cached {
                return Ok(node);
            }
        }
        trace!("Cache miss for {}, reading from store", self.path());
        self.client.read_with_stat().await
    }

    /// Node at this path from the cache only
    pub fn read_cached(&self) -> CanopyResult<ZNode<T>> {
        self.cache()
            .current_data(self.path())?
            .ok_or_else(|| CanopyError::NotFound(self.path().to_string()))
    }

    /// Paths of the cached direct children
    pub async fn children(&self) -> CanopyResult<Vec<ZPath>> {
        self.cache().current_children_paths(self.path())
    }

    /// Cached direct children with their models
    ///
    /// Best effort: a child removed between listing and lookup is omitted.
    pub async fn children_as_nodes(&self) -> CanopyResult<Vec<ZNode<T>>> {
        let mut nodes = Vec::new();
        for path in self.children().await? {
            if let Some(node) = self.cache().current_data(&path)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// Every cached node below this path
    pub fn list(&self) -> CanopyResult<Vec<ZNode<T>>> {
        let path = self.path();
        Ok(self
            .cache()
            .current_subtree(path)?
            .into_iter()
            .filter(|node| &node.path != path)
            .collect())
    }
}
