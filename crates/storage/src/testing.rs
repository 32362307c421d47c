//! In-memory clients and sinks for tests.
//!
//! Compiled with the `testing` feature. Every double records the calls made
//! against it so tests can assert on downloads, acknowledgements and side
//! effects without any network access.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::download::DownloadOptions;
use crate::error::StorageError;
use crate::session::{Session, SessionFactory};
use crate::traits::{
    AuditSink, NotificationSink, ObjectInfo, QueueClient, RawMessage, StorageClient,
};
use crate::types::{AuditRecord, ReceiveSettings};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build an S3 event-notification body with one record.
pub fn s3_event_body(event_name: &str, key: &str) -> String {
    serde_json::json!({
        "Records": [{
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "eventName": event_name,
            "s3": {
                "bucket": { "name": "test-bucket" },
                "object": { "key": key, "size": 3 }
            }
        }]
    })
    .to_string()
}

/// Build a raw queue message.
pub fn raw_message(message_id: &str, ack_token: &str, body: impl Into<String>) -> RawMessage {
    RawMessage {
        message_id: Some(message_id.to_string()),
        ack_token: Some(ack_token.to_string()),
        body: Some(body.into()),
    }
}

/// Object store held in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: Mutex<HashSet<String>>,
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    downloads: Mutex<Vec<String>>,
    list_delay: Mutex<Duration>,
    truncated: Mutex<HashSet<String>>,
}

impl MemoryStorage {
    /// Create a store containing one empty bucket.
    pub fn with_bucket(bucket: &str) -> Self {
        let storage = Self::default();
        lock(&storage.buckets).insert(bucket.to_string());
        storage
    }

    /// Add an object (creating its bucket).
    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        lock(&self.buckets).insert(bucket.to_string());
        lock(&self.objects).insert((bucket.to_string(), key.to_string()), data.into());
    }

    /// Delay every listing by `delay`.
    pub fn set_list_delay(&self, delay: Duration) {
        *lock(&self.list_delay) = delay;
    }

    /// Make downloads of `key` write the file and then fail, like a
    /// connection dropped before the transfer was confirmed.
    pub fn fail_after_write(&self, key: &str) {
        lock(&self.truncated).insert(key.to_string());
    }

    /// Keys fetched so far, in call order.
    pub fn downloads(&self) -> Vec<String> {
        lock(&self.downloads).clone()
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn head_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        if lock(&self.buckets).contains(bucket) {
            Ok(())
        } else {
            Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
                message: "no such bucket".to_string(),
            })
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        self.head_bucket(bucket).await?;
        let delay: Duration = *lock(&self.list_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(lock(&self.objects)
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), data)| ObjectInfo {
                key: k.clone(),
                size: data.len() as u64,
                last_modified: None,
                etag: None,
            })
            .collect())
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<u64, StorageError> {
        lock(&self.downloads).push(key.to_string());
        let data: Vec<u8> = lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;

        tokio::fs::write(file_path, &data)
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;
        if lock(&self.truncated).contains(key) {
            return Err(StorageError::network("connection reset during transfer"));
        }
        Ok(data.len() as u64)
    }
}

/// Queue held in memory. Each receive call pops one scripted batch.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<BTreeMap<String, String>>,
    batches: Mutex<VecDeque<Result<Vec<RawMessage>, StorageError>>>,
    deleted: Mutex<Vec<String>>,
    receive_calls: AtomicUsize,
}

impl MemoryQueue {
    /// Create a transport knowing one queue.
    pub fn with_queue(name: &str, url: &str) -> Self {
        let queue = Self::default();
        lock(&queue.queues).insert(name.to_string(), url.to_string());
        queue
    }

    /// Script the next receive call to return `messages`.
    pub fn push_batch(&self, messages: Vec<RawMessage>) {
        lock(&self.batches).push_back(Ok(messages));
    }

    /// Script the next receive call to fail.
    pub fn push_error(&self, error: StorageError) {
        lock(&self.batches).push_back(Err(error));
    }

    /// Receipt handles deleted so far, in call order.
    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    /// Number of receive calls made.
    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn get_queue_url(&self, queue_name: &str) -> Result<String, StorageError> {
        lock(&self.queues)
            .get(queue_name)
            .cloned()
            .ok_or_else(|| StorageError::QueueNotFound {
                queue: queue_name.to_string(),
            })
    }

    async fn receive_messages(
        &self,
        _queue_url: &str,
        settings: &ReceiveSettings,
    ) -> Result<Vec<RawMessage>, StorageError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.batches).pop_front() {
            Some(Ok(mut messages)) => {
                messages.truncate(settings.max_messages.max(1) as usize);
                Ok(messages)
            }
            Some(Err(e)) => Err(e),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_message(&self, _queue_url: &str, ack_token: &str) -> Result<(), StorageError> {
        lock(&self.deleted).push(ack_token.to_string());
        Ok(())
    }
}

/// Session factory handing out the same in-memory clients on every build.
pub struct StaticSessionFactory {
    storage: Arc<MemoryStorage>,
    queue: Arc<MemoryQueue>,
    bucket: String,
    options: DownloadOptions,
}

impl StaticSessionFactory {
    /// Create a factory over the given doubles.
    pub fn new(
        storage: Arc<MemoryStorage>,
        queue: Arc<MemoryQueue>,
        bucket: impl Into<String>,
        options: DownloadOptions,
    ) -> Self {
        Self {
            storage,
            queue,
            bucket: bucket.into(),
            options,
        }
    }
}

#[async_trait]
impl SessionFactory for StaticSessionFactory {
    async fn create_session(&self) -> Result<Session, StorageError> {
        Ok(Session::new(
            self.storage.clone(),
            self.queue.clone(),
            self.bucket.clone(),
            self.options.clone(),
        ))
    }
}

/// Notification sink that stores messages, optionally failing every call.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    /// A notifier whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Messages received so far.
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, message: &str) -> Result<(), StorageError> {
        lock(&self.messages).push(message.to_string());
        if self.fail {
            return Err(StorageError::network("notification channel unavailable"));
        }
        Ok(())
    }
}

/// Audit sink that stores records, optionally failing every call.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    fail: bool,
}

impl RecordingAuditSink {
    /// An audit sink whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Records received so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        lock(&self.records).clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), StorageError> {
        lock(&self.records).push(record.clone());
        if self.fail {
            return Err(StorageError::network("audit log unavailable"));
        }
        Ok(())
    }
}
