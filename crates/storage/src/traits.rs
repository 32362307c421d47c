//! Storage, queue and sink interfaces.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{AuditRecord, ReceiveSettings};

/// Information about an S3 object from list operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// S3 object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds).
    pub last_modified: Option<i64>,
    /// ETag (usually MD5 hash for non-multipart uploads).
    pub etag: Option<String>,
}

/// A message as delivered by the queue transport, before any parsing.
///
/// Every field is optional because the transport does not guarantee them;
/// validation happens when the message is turned into a notification event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    /// Transport-assigned message id.
    pub message_id: Option<String>,
    /// Receipt handle needed to delete the message.
    pub ack_token: Option<String>,
    /// Message body (JSON for bucket notifications).
    pub body: Option<String>,
}

/// Object storage operations used by the watcher - implemented by each backend.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Check that a bucket exists and is reachable with the current credentials.
    async fn head_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// List every object below `prefix`, following continuation tokens.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StorageError>;

    /// Download object to file path, replacing any existing file.
    ///
    /// Returns the number of bytes written.
    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<u64, StorageError>;
}

/// Message queue operations used by the watcher.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Resolve a queue name to its URL.
    ///
    /// Returns `StorageError::QueueNotFound` when no such queue exists.
    async fn get_queue_url(&self, queue_name: &str) -> Result<String, StorageError>;

    /// Receive up to `settings.max_messages` messages.
    ///
    /// An empty vector means the queue had nothing to deliver.
    async fn receive_messages(
        &self,
        queue_url: &str,
        settings: &ReceiveSettings,
    ) -> Result<Vec<RawMessage>, StorageError>;

    /// Delete (acknowledge) a message by its receipt handle.
    async fn delete_message(&self, queue_url: &str, ack_token: &str) -> Result<(), StorageError>;
}

/// Destination for human-readable notifications (chat channel).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one message.
    async fn notify(&self, message: &str) -> Result<(), StorageError>;
}

/// Destination for structured audit records (time-series log).
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Write one record.
    async fn record(&self, record: &AuditRecord) -> Result<(), StorageError>;
}
