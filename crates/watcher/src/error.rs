//! Error types for the watcher pipeline.

use s3watcher_common::PathError;
use s3watcher_filesystem::FileSystemError;
use s3watcher_storage::StorageError;
use thiserror::Error;

/// Reasons a queue message cannot become a notification event.
///
/// The raw message keeps its receipt handle, so a message rejected with any of
/// these can still be acknowledged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("message has no message id")]
    MissingMessageId,

    #[error("message has no receipt handle")]
    MissingAckToken,

    #[error("message has no body")]
    MissingBody,

    #[error("message body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("message body has no event records")]
    MissingRecords,

    #[error("event record has no object key")]
    MissingKey,

    #[error("object key is not valid percent-encoding: {key}")]
    InvalidKeyEncoding { key: String },

    #[error("event record has no event name")]
    MissingEventName,

    #[error("unrecognized event name: {0}")]
    UnrecognizedEvent(String),
}

/// Errors that stop the watcher from starting or a sweep from running.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Missing or invalid setting.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Queue or bucket absent and provisioning was not requested.
    #[error("Provisioning error: {message}")]
    Provisioning { message: String },

    /// Storage or queue failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Local file system failure.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// Key could not be mapped below the download root.
    #[error(transparent)]
    Path(#[from] PathError),

    /// A background task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(String),
}

impl WatcherError {
    /// Whether this error comes from bad configuration rather than the
    /// environment.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            WatcherError::Config { .. }
                | WatcherError::Storage(StorageError::InvalidConfig { .. })
        )
    }
}
