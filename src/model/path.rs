//! Hierarchical paths with optional `{parameter}` placeholders
//!
//! A `ZPath` is an ordered list of segments. Ordering is segment-wise, so
//! every descendant of a path sorts directly after it; the cache relies on
//! that to find subtrees with a single range scan.

use crate::error::{CanopyError, CanopyResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = '/';

/// One component of a path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Segment {
    /// Literal node name
    Name(String),
    /// Placeholder filled in by `ZPath::resolved`, e.g. `{id}`
    Parameter(String),
}

impl Segment {
    fn parse(raw: &str, full: &str) -> CanopyResult<Self> {
        if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            return Ok(Self::Parameter(inner.to_string()));
        }
        validate_name(raw, full)?;
        Ok(Self::Name(raw.to_string()))
    }

    /// Whether this segment still needs a value
    pub fn is_parameter(&self) -> bool {
        matches!(self, Self::Parameter(_))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{}", name),
            Self::Parameter(name) => write!(f, "{{{}}}", name),
        }
    }
}

fn validate_name(name: &str, full: &str) -> CanopyResult<()> {
    let reason = if name.is_empty() {
        "empty segment"
    } else if name.contains(SEPARATOR) {
        "segment contains '/'"
    } else if name == "." || name == ".." {
        "relative segments are not allowed"
    } else if name.contains('\0') {
        "segment contains NUL"
    } else {
        return Ok(());
    };
    Err(CanopyError::invalid_path(full, reason))
}

/// An absolute path in the store namespace
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ZPath {
    segments: Vec<Segment>,
}

impl ZPath {
    /// The namespace root, `/`
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse an absolute path such as `/root/{id}/config`
    pub fn parse(path: &str) -> CanopyResult<Self> {
        let rest = path
            .strip_prefix(SEPARATOR)
            .ok_or_else(|| CanopyError::invalid_path(path, "path must start with '/'"))?;
        if rest.is_empty() {
            return Ok(Self::root());
        }
        let segments = rest
            .split(SEPARATOR)
            .map(|raw| Segment::parse(raw, path))
            .collect::<CanopyResult<Vec<_>>>()?;
        Ok(Self { segments })
    }

    /// Path of the named child
    pub fn child(&self, name: &str) -> CanopyResult<Self> {
        let segment = Segment::parse(name, &format!("{}/{}", self, name))?;
        let mut segments = self.segments.clone();
        segments.push(segment);
        Ok(Self { segments })
    }

    /// Parent path; `None` for the root
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// Last segment rendered as a node name (empty for the root)
    pub fn node_name(&self) -> String {
        self.segments
            .last()
            .map(Segment::to_string)
            .unwrap_or_default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True if `self` equals `prefix` or is nested under it
    pub fn starts_with(&self, prefix: &ZPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// True if `self` is a direct child of `parent`
    pub fn is_child_of(&self, parent: &ZPath) -> bool {
        self.depth() == parent.depth() + 1 && self.starts_with(parent)
    }

    /// True once every parameter has been substituted
    pub fn is_resolved(&self) -> bool {
        !self.segments.iter().any(Segment::is_parameter)
    }

    /// Substitute parameters left to right with `values`
    ///
    /// Extra values are ignored; parameters without a value stay in place,
    /// so callers can resolve a path in several steps.
    pub fn resolved<S: AsRef<str>>(&self, values: &[S]) -> CanopyResult<Self> {
        let mut values = values.iter();
        let mut segments = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Parameter(_) => match values.next() {
                    Some(value) => {
                        validate_name(value.as_ref(), &self.to_string())?;
                        segments.push(Segment::Name(value.as_ref().to_string()));
                    }
                    None => segments.push(segment.clone()),
                },
                Segment::Name(_) => segments.push(segment.clone()),
            }
        }
        Ok(Self { segments })
    }

    /// Error unless the path is fully resolved
    pub fn ensure_resolved(&self) -> CanopyResult<()> {
        if self.is_resolved() {
            Ok(())
        } else {
            Err(CanopyError::UnresolvedPath(self.to_string()))
        }
    }
}

impl fmt::Display for ZPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "{}", SEPARATOR);
        }
        for segment in &self.segments {
            write!(f, "{}{}", SEPARATOR, segment)?;
        }
        Ok(())
    }
}

impl FromStr for ZPath {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ZPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ZPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
