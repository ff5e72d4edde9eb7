//! Typed model layer
//!
//! Paths, model specs and the serializers that turn node payloads into
//! typed values.

pub mod node;
pub mod path;
pub mod serializer;
pub mod spec;

pub use node::{NodeName, ZNode};
pub use path::{Segment, ZPath};
pub use serializer::{JsonModelSerializer, ModelSerializer};
pub use spec::{ModelSpec, ModelSpecBuilder};
