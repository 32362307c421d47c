//! AWS SDK backend for s3watcher.
//!
//! Implements the `StorageClient`, `QueueClient`, `SessionFactory` and
//! `AuditSink` seams from `s3watcher-storage` on top of the AWS SDK for Rust,
//! plus provisioning of the notification queue.
//!
//! # Example
//!
//! ```ignore
//! use s3watcher_storage::{SessionManager, StorageSettings};
//! use s3watcher_storage_aws::SdkSessionFactory;
//!
//! let factory = Arc::new(SdkSessionFactory::new(StorageSettings::default(), "my-bucket"));
//! let sessions = SessionManager::new(factory, Duration::from_secs(900)).await?;
//! ```

mod audit;
mod client;
mod error;
mod provision;
mod queue;
mod session;

pub use audit::{record_dimensions, TimestreamAuditSink};
pub use client::SdkStorageClient;
pub use error::AwsError;
pub use provision::{object_created_route, queue_policy, routes_to, Provisioner, ROUTE_ID};
pub use queue::SdkQueueClient;
pub use session::{load_sdk_config, s3_client, SdkSessionFactory};
