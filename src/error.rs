//! Error types for Canopy
//!
//! All modules use `CanopyResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Canopy operations
pub type CanopyResult<T> = Result<T, CanopyError>;

/// All errors that can occur in Canopy
#[derive(Error, Debug)]
pub enum CanopyError {
    // Store errors
    #[error("Store unreachable: {0}")]
    Connectivity(String),

    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Version mismatch at {path}: expected {expected}, found {actual}")]
    BadVersion {
        path: String,
        expected: i32,
        actual: i32,
    },

    #[error("Node has children: {0}")]
    NotEmpty(String),

    // Model errors
    #[error("Cannot decode model at {path}: {reason}")]
    Serialization { path: String, reason: String },

    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Path has unresolved parameters: {0}")]
    UnresolvedPath(String),

    // Cache errors
    #[error("Listener failed: {0}")]
    Listener(String),

    #[error("Cache closed")]
    Closed,

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CanopyError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a model decode/encode error for a path
    pub fn serialization(path: impl ToString, reason: impl ToString) -> Self {
        Self::Serialization {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// Only connectivity failures are transient; everything else reflects
    /// the state of the store or the caller's input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Timeout(_))
    }

    /// Whether the error means the node does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Connectivity(_) => Some("Cached reads keep working; writes resume on reconnect"),
            Self::Closed => Some("Create a new cached framework; closed caches cannot restart"),
            Self::UnresolvedPath(_) => Some("Call resolved() with a value for every {parameter}"),
            Self::ConfigInvalid { .. } => Some("Run: canopy config init --force"),
            _ => None,
        }
    }
}
