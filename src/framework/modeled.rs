//! Typed client without a cache
//!
//! Every operation goes straight to the store and encodes or decodes models
//! through the model spec's serializer.

use crate::error::{CanopyError, CanopyResult};
use crate::framework::cached::CachedModeledFramework;
use crate::model::{ModelSpec, NodeName, ZNode, ZPath};
use crate::store::{RemoteStore, Stat};
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Typed access to the nodes described by a model spec
pub struct ModeledFramework<T> {
    store: Arc<dyn RemoteStore>,
    spec: ModelSpec<T>,
}

impl<T> Clone for ModeledFramework<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            spec: self.spec.clone(),
        }
    }
}

impl<T> ModeledFramework<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Bind a model spec to a store client
    pub fn wrap(store: Arc<dyn RemoteStore>, spec: ModelSpec<T>) -> Self {
        Self { store, spec }
    }

    /// Cached view of the subtree at this framework's path
    ///
    /// The cache is not started; call `start` on the result.
    pub fn cached(&self) -> CachedModeledFramework<T> {
        CachedModeledFramework::new(self.clone())
    }

    pub fn model_spec(&self) -> &ModelSpec<T> {
        &self.spec
    }

    pub fn path(&self) -> &ZPath {
        self.spec.path()
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Framework for the named child path
    pub fn child(&self, name: &str) -> CanopyResult<Self> {
        Ok(self.with_spec(self.spec.child(name)?))
    }

    /// Framework for the child named after `model`
    pub fn child_for(&self, model: &impl NodeName) -> CanopyResult<Self> {
        self.child(&model.node_name())
    }

    /// Framework for the parent path; `None` at the root
    pub fn parent(&self) -> Option<Self> {
        self.spec.parent().map(|spec| self.with_spec(spec))
    }

    /// Framework for an arbitrary path, keeping the model spec's options
    pub fn with_path(&self, path: ZPath) -> Self {
        self.with_spec(self.spec.with_path(path))
    }

    /// Framework with `{parameters}` filled in
    pub fn resolved<S: AsRef<str>>(&self, values: &[S]) -> CanopyResult<Self> {
        Ok(self.with_spec(self.spec.resolved(values)?))
    }

    fn with_spec(&self, spec: ModelSpec<T>) -> Self {
        Self {
            store: self.store.clone(),
            spec,
        }
    }

    /// Create the node or overwrite its model
    pub async fn set(&self, model: &T) -> CanopyResult<Stat> {
        let path = self.path();
        path.ensure_resolved()?;
        let data = self.spec.encode(model)?;
        let stat = self
            .store
            .create_or_set(path, data, self.spec.create_options())
            .await?;
        debug!("Set {} (version {})", path, stat.version);
        Ok(stat)
    }

    /// Overwrite an existing node, failing if its version moved on
    pub async fn update(&self, model: &T, version: Option<i32>) -> CanopyResult<Stat> {
        let path = self.path();
        path.ensure_resolved()?;
        let data = self.spec.encode(model)?;
        self.store.set_data(path, data, version).await
    }

    /// Read and decode the model
    pub async fn read(&self) -> CanopyResult<T> {
        Ok(self.read_with_stat().await?.model)
    }

    /// Read the model along with its stat
    pub async fn read_with_stat(&self) -> CanopyResult<ZNode<T>> {
        let path = self.path();
        path.ensure_resolved()?;
        let (data, stat) = self.store.read(path).await?;
        let model = self.spec.decode(path, &data)?;
        Ok(ZNode::new(path.clone(), stat, model))
    }

    /// Delete the node using the model spec's delete options
    pub async fn delete(&self, version: Option<i32>) -> CanopyResult<()> {
        let path = self.path();
        path.ensure_resolved()?;
        self.store
            .delete(path, version, self.spec.delete_options())
            .await
    }

    /// Stat of the node, if it exists
    pub async fn check_exists(&self) -> CanopyResult<Option<Stat>> {
        let path = self.path();
        path.ensure_resolved()?;
        self.store.exists(path).await
    }

    /// Paths of the direct children
    pub async fn children(&self) -> CanopyResult<Vec<ZPath>> {
        let path = self.path();
        path.ensure_resolved()?;
        self.store.children(path).await
    }

    /// Decoded direct children
    ///
    /// Children deleted between listing and reading, structural children
    /// without a payload and children that fail to decode are left out.
    pub async fn children_as_nodes(&self) -> CanopyResult<Vec<ZNode<T>>> {
        let children = self.children().await?;
        let reads = children.into_iter().map(|path| async move {
            let outcome = self.store.read(&path).await;
            (path, outcome)
        });

        let mut nodes = Vec::new();
        for (path, outcome) in join_all(reads).await {
            match outcome {
                Ok((data, _)) if data.is_empty() => {}
                Ok((data, stat)) => match self.spec.decode(&path, &data) {
                    Ok(model) => nodes.push(ZNode::new(path, stat, model)),
                    Err(e) => warn!("Skipping child: {}", e),
                },
                Err(CanopyError::NotFound(_)) => debug!("Child {} vanished while listing", path),
                Err(e) => return Err(e),
            }
        }
        Ok(nodes)
    }
}
