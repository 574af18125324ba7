//! Error types for the photosync library
//!
//! This module defines all error types that can occur while walking a photo
//! library, listing a bucket, or executing sync actions. Data-integrity
//! errors (out-of-order listings, malformed trees, corrupt downloads) are
//! kept distinct from plain I/O failures so callers can tell a bad upstream
//! from a flaky one.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the photosync library
pub type Result<T> = std::result::Result<T, SyncError>;

/// Example configuration shown when no config file can be found
const CONFIG_HELP: &str = "\
The configuration file is YAML and should look like this:

source:
  root: /path/to/photo/library
target:
  root: /path/to/bucket
prefix: \"\"
";

/// Main error type for all photosync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors while parsing YAML configuration
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A sorted input produced a key that does not strictly follow the previous one
    #[error("Input out of order: {previous:?} followed by {next:?}")]
    OutOfOrder {
        /// Key of the element that was current before advancing
        previous: String,
        /// Key of the newly advanced element
        next: String,
    },

    /// A tree node reported both child nodes and an album
    #[error("Node {node:?} has both children and an album")]
    StructureViolation {
        /// Name of the offending node
        node: String,
    },

    /// The tree source returned an object type this crate does not understand
    #[error("Unsupported node type: {0}")]
    UnsupportedNode(String),

    /// Downloaded content does not match the declared checksum
    #[error("Hash mismatch for {key} - expected: {expected}, actual: {actual}")]
    HashMismatch {
        /// Item the content belongs to
        key: String,
        /// Declared MD5
        expected: String,
        /// MD5 of the bytes actually received
        actual: String,
    },

    /// Downloaded content does not match the declared byte count
    #[error("Size mismatch for {key} - expected: {expected} bytes, actual: {actual} bytes")]
    SizeMismatch {
        /// Item the content belongs to
        key: String,
        /// Declared size
        expected: u64,
        /// Size actually received
        actual: u64,
    },

    /// Object or item not found in a store
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Path-prefix filter is malformed
    #[error("Invalid prefix {0:?}: must be empty or end with '/'")]
    InvalidPrefix(String),

    /// Storage key cannot be stored safely
    #[error("Invalid object key: {0:?}")]
    InvalidKey(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file is missing
    #[error("Config file does not exist: {0:?}")]
    ConfigNotFound(PathBuf),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Create a configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        SyncError::Config(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SyncError::Internal(msg.into())
    }

    /// Check if this error means the upstream data can't be trusted
    ///
    /// These are never retried: rerunning against the same source or bucket
    /// listing will fail the same way.
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            SyncError::OutOfOrder { .. }
                | SyncError::StructureViolation { .. }
                | SyncError::UnsupportedNode(_)
                | SyncError::HashMismatch { .. }
                | SyncError::SizeMismatch { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SyncError::ConfigNotFound(path) => {
                format!("Config file does not exist: {}\n\n{}", path.display(), CONFIG_HELP)
            }
            SyncError::InvalidPrefix(prefix) => {
                format!(
                    "Prefix {:?} must be empty or end with '/'. Try '{}/'.",
                    prefix,
                    prefix.trim_end_matches('/')
                )
            }
            SyncError::OutOfOrder { previous, next } => {
                format!(
                    "Listing returned {:?} after {:?}. Keys must be strictly increasing; \
                     check for duplicate photos with identical names and metadata.",
                    next, previous
                )
            }
            SyncError::StructureViolation { node } => {
                format!(
                    "Folder {:?} contains both sub-folders and photos. \
                     Move the photos into their own folder and rerun.",
                    node
                )
            }
            _ => self.to_string(),
        }
    }
}
