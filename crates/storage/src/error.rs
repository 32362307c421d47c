//! Error types for storage and queue operations.

use thiserror::Error;

/// Errors that can occur during storage and queue operations.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Object not found in S3.
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Bucket missing or unreachable.
    #[error("Bucket not found or not accessible: {bucket}: {message}")]
    BucketNotFound { bucket: String, message: String },

    /// Queue does not exist.
    #[error("Queue not found: {queue}")]
    QueueNotFound { queue: String },

    /// Access denied.
    #[error("Access denied to {resource}: {message}")]
    AccessDenied { resource: String, message: String },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StorageError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::NetworkError { retryable, .. } => *retryable,
            StorageError::NotFound { .. } => false,
            StorageError::BucketNotFound { .. } => false,
            StorageError::QueueNotFound { .. } => false,
            StorageError::AccessDenied { .. } => false,
            StorageError::IoError { .. } => false,
            StorageError::InvalidConfig { .. } => false,
            StorageError::Other { .. } => false,
        }
    }

    /// Create a retryable network error from any displayable error.
    pub fn network(err: impl std::fmt::Display) -> Self {
        StorageError::NetworkError {
            message: err.to_string(),
            retryable: true,
        }
    }

    /// Create an I/O error bound to a path.
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        StorageError::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<s3watcher_common::PathError> for StorageError {
    fn from(err: s3watcher_common::PathError) -> Self {
        StorageError::Other {
            message: err.to_string(),
        }
    }
}

/// Non-fatal error encountered during batch transfer.
#[derive(Debug, Clone)]
pub struct TransferError {
    /// The key that failed.
    pub key: String,
    /// The error that occurred.
    pub error: StorageError,
}

impl TransferError {
    /// Create a new transfer error.
    pub fn new(key: impl Into<String>, error: StorageError) -> Self {
        Self {
            key: key.into(),
            error,
        }
    }
}
