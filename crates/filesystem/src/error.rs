//! Error types for file system operations.

use s3watcher_common::PathError;
use thiserror::Error;

/// Errors raised while scanning or modifying the local tree.
#[derive(Error, Debug)]
pub enum FileSystemError {
    /// I/O error on a specific path.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Root directory missing or not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory { path: String },

    /// Path handling error.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Unknown user or group name.
    #[error("Unknown {kind}: {name}")]
    UnknownPrincipal { kind: &'static str, name: String },

    /// Malformed `user:group` specification.
    #[error("Invalid ownership '{spec}': expected user:group")]
    InvalidOwnership { spec: String },
}
