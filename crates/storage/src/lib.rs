//! Storage and queue abstraction for the bucket watcher.
//!
//! This crate provides a backend-agnostic interface for the operations the
//! watcher performs against object storage and its notification queue, plus
//! the pieces built on top of those interfaces:
//!
//! - **Traits** - `StorageClient`, `QueueClient`, and the optional
//!   `NotificationSink` / `AuditSink` side-effect destinations
//! - **Downloads** - `DownloadOrchestrator`, a pooled "transfer manager" that
//!   mirrors objects into a local directory tree
//! - **Sessions** - `Session` and `SessionManager`, which rebuild every client
//!   handle once credentials reach their configured age
//!
//! The AWS SDK implementation lives in `s3watcher-storage-aws`. In-memory
//! doubles for tests are available behind the `testing` feature.

mod download;
mod error;
mod session;
mod traits;
mod types;

#[cfg(feature = "testing")]
pub mod testing;

pub use download::{DownloadOptions, DownloadOrchestrator};
pub use error::{StorageError, TransferError};
pub use session::{Session, SessionFactory, SessionManager};
pub use traits::{AuditSink, NotificationSink, ObjectInfo, QueueClient, RawMessage, StorageClient};
pub use types::{
    AuditRecord, DownloadRequest, ReceiveSettings, S3Location, StorageSettings,
    TransferStatistics,
};
