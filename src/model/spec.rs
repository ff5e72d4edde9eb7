//! Model specifications
//!
//! A `ModelSpec` binds a path template to a model type, its serializer and
//! the options used when writing or deleting nodes. Specs are immutable;
//! navigation returns new specs sharing the same serializer.

use crate::config::schema::ModelConfig;
use crate::error::{CanopyError, CanopyResult};
use crate::model::node::NodeName;
use crate::model::path::ZPath;
use crate::model::serializer::ModelSerializer;
use crate::store::{CreateOptions, DeleteOptions};
use std::fmt;
use std::sync::Arc;

/// Typed schema for the nodes at a path
pub struct ModelSpec<T> {
    path: ZPath,
    serializer: Arc<dyn ModelSerializer<T>>,
    create_options: CreateOptions,
    delete_options: DeleteOptions,
}

impl<T> Clone for ModelSpec<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            serializer: self.serializer.clone(),
            create_options: self.create_options.clone(),
            delete_options: self.delete_options.clone(),
        }
    }
}

impl<T> fmt::Debug for ModelSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSpec")
            .field("path", &self.path)
            .field("create_options", &self.create_options)
            .field("delete_options", &self.delete_options)
            .finish()
    }
}

impl<T> ModelSpec<T> {
    /// Start building a spec for `path`
    pub fn builder<S>(path: ZPath, serializer: S) -> ModelSpecBuilder<T>
    where
        S: ModelSerializer<T> + 'static,
    {
        ModelSpecBuilder {
            path,
            serializer: Arc::new(serializer),
            create_options: CreateOptions::default(),
            delete_options: DeleteOptions::default(),
        }
    }

    pub fn path(&self) -> &ZPath {
        &self.path
    }

    pub fn create_options(&self) -> &CreateOptions {
        &self.create_options
    }

    pub fn delete_options(&self) -> &DeleteOptions {
        &self.delete_options
    }

    /// Same spec, different path
    pub fn with_path(&self, path: ZPath) -> Self {
        Self {
            path,
            ..self.clone()
        }
    }

    /// Spec for the named child of this spec's path
    pub fn child(&self, name: &str) -> CanopyResult<Self> {
        Ok(self.with_path(self.path.child(name)?))
    }

    /// Spec for the parent path; `None` at the root
    pub fn parent(&self) -> Option<Self> {
        self.path.parent().map(|path| self.with_path(path))
    }

    /// Fill `{parameters}` in the path template
    pub fn resolved<S: AsRef<str>>(&self, values: &[S]) -> CanopyResult<Self> {
        Ok(self.with_path(self.path.resolved(values)?))
    }

    /// Fill the next `{parameter}` with the model's node name
    pub fn resolved_for(&self, model: &impl NodeName) -> CanopyResult<Self> {
        self.resolved(&[model.node_name()])
    }

    /// Encode a model for storage
    pub fn encode(&self, model: &T) -> CanopyResult<Vec<u8>> {
        self.serializer
            .serialize(model)
            .map_err(|e| attach_path(e, &self.path))
    }

    /// Decode the payload stored at `path`
    pub fn decode(&self, path: &ZPath, bytes: &[u8]) -> CanopyResult<T> {
        self.serializer
            .deserialize(bytes)
            .map_err(|e| attach_path(e, path))
    }
}

fn attach_path(err: CanopyError, path: &ZPath) -> CanopyError {
    match err {
        CanopyError::Serialization { reason, .. } => CanopyError::serialization(path, reason),
        CanopyError::Json(e) => CanopyError::serialization(path, e),
        other => other,
    }
}

/// Builder for `ModelSpec`
pub struct ModelSpecBuilder<T> {
    path: ZPath,
    serializer: Arc<dyn ModelSerializer<T>>,
    create_options: CreateOptions,
    delete_options: DeleteOptions,
}

impl<T> ModelSpecBuilder<T> {
    pub fn with_create_options(mut self, options: CreateOptions) -> Self {
        self.create_options = options;
        self
    }

    pub fn with_delete_options(mut self, options: DeleteOptions) -> Self {
        self.delete_options = options;
        self
    }

    /// Take create/delete options from the `[model]` config section
    pub fn with_config(self, config: &ModelConfig) -> Self {
        self.with_create_options(config.create_options())
            .with_delete_options(config.delete_options())
    }

    pub fn build(self) -> ModelSpec<T> {
        ModelSpec {
            path: self.path,
            serializer: self.serializer,
            create_options: self.create_options,
            delete_options: self.delete_options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::serializer::JsonModelSerializer;
    use crate::store::CreateMode;

    fn spec() -> ModelSpec<Vec<u32>> {
        ModelSpec::builder(
            ZPath::parse("/root/{id}").unwrap(),
            JsonModelSerializer::new(),
        )
        .build()
    }

    #[test]
    fn navigation_keeps_options() {
        let spec = ModelSpec::builder(ZPath::parse("/a").unwrap(), JsonModelSerializer::<u8>::new())
            .with_create_options(CreateOptions {
                mode: CreateMode::Ephemeral,
                ..CreateOptions::default()
            })
            .build();
        let child = spec.child("b").unwrap();
        assert_eq!(child.path().to_string(), "/a/b");
        assert_eq!(child.create_options().mode, CreateMode::Ephemeral);
        assert_eq!(child.parent().unwrap().path(), spec.path());
    }

    #[test]
    fn resolved_for_uses_node_name() {
        let resolved = spec().resolved_for(&42u64).unwrap();
        assert_eq!(resolved.path().to_string(), "/root/42");
    }

    #[test]
    fn decode_errors_name_the_path() {
        let spec = spec();
        let path = ZPath::parse("/root/7").unwrap();
        match spec.decode(&path, b"{broken").unwrap_err() {
            CanopyError::Serialization { path, .. } => assert_eq!(path, "/root/7"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn with_config_applies_model_section() {
        let config = ModelConfig {
            create_parents: false,
            delete_children: true,
            create_mode: CreateMode::Container,
        };
        let spec = ModelSpec::builder(ZPath::root(), JsonModelSerializer::<u8>::new())
            .with_config(&config)
            .build();
        assert!(!spec.create_options().create_parents);
        assert_eq!(spec.create_options().mode, CreateMode::Container);
        assert!(spec.delete_options().delete_children);
    }
}
