//! Shared error types used across s3watcher crates.

use thiserror::Error;

/// Path-related errors shared across crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Path is outside the expected root directory.
    #[error("Path is outside root: {path} not in {root}")]
    PathOutsideRoot {
        /// The path that was checked.
        path: String,
        /// The root directory it should be within.
        root: String,
    },

    /// Object key does not name a file below the configured prefix.
    #[error("Invalid object key: {key}")]
    InvalidKey {
        /// The offending key.
        key: String,
    },
}
