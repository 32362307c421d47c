//! Download orchestration for the local mirror.
//!
//! This module provides high-level download operations that work with any
//! `StorageClient` implementation. It handles:
//!
//! - Creating missing intermediate directories below the destination
//! - Bounding concurrent transfers with a shared permit pool
//! - Parallel batch downloads that keep going past individual failures
//!
//! The permit pool is shared by every clone of an orchestrator, so the
//! steady-state processor and a reconciliation sweep running at the same time
//! never exceed the configured concurrency together.
//!
//! # Example
//!
//! ```ignore
//! use s3watcher_storage::{DownloadOrchestrator, DownloadOptions};
//!
//! let orchestrator = DownloadOrchestrator::new(client, "my-bucket", DownloadOptions::default());
//! let stats = orchestrator.download_object("a/b.txt", Path::new("/data/a/b.txt")).await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use s3watcher_common::DEFAULT_CONCURRENCY_LIMIT;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{StorageError, TransferError};
use crate::traits::StorageClient;
use crate::types::{DownloadRequest, TransferStatistics};

/// Options for download operations.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Maximum concurrent downloads.
    pub max_concurrency: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY_LIMIT,
        }
    }
}

impl DownloadOptions {
    /// Set maximum concurrency for parallel downloads.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

/// Pooled downloads from one bucket using any StorageClient implementation.
#[derive(Clone)]
pub struct DownloadOrchestrator {
    /// The storage client for S3 operations.
    client: Arc<dyn StorageClient>,
    /// Bucket objects are fetched from.
    bucket: String,
    /// Download options.
    options: DownloadOptions,
    /// Shared transfer permits.
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for DownloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOrchestrator")
            .field("bucket", &self.bucket)
            .field("options", &self.options)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl DownloadOrchestrator {
    /// Create a new download orchestrator.
    ///
    /// # Arguments
    /// * `client` - Storage client for S3 operations
    /// * `bucket` - Bucket to download from
    /// * `options` - Download options
    pub fn new(
        client: Arc<dyn StorageClient>,
        bucket: impl Into<String>,
        options: DownloadOptions,
    ) -> Self {
        let permits: Arc<Semaphore> = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
        Self {
            client,
            bucket: bucket.into(),
            options,
            permits,
        }
    }

    /// Bucket this orchestrator reads from.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Configured concurrency bound.
    pub fn max_concurrency(&self) -> usize {
        self.options.max_concurrency.max(1)
    }

    /// Download a single object, creating missing parent directories first.
    ///
    /// Existing files at `destination` are overwritten, so repeating a download
    /// is harmless.
    ///
    /// # Arguments
    /// * `key` - Object key
    /// * `destination` - Local file path
    pub async fn download_object(
        &self,
        key: &str,
        destination: &Path,
    ) -> Result<TransferStatistics, StorageError> {
        let created: bool = ensure_parent_dir(destination).await?;

        let _permit: OwnedSemaphorePermit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| StorageError::Other {
                message: format!("download pool closed: {}", e),
            })?;

        let bytes: u64 = self
            .client
            .get_object_to_file(&self.bucket, key, destination)
            .await?;

        log::info!(
            "Downloaded file ({}) from S3 bucket ({}) to {}",
            key,
            self.bucket,
            destination.display()
        );

        let mut stats: TransferStatistics = TransferStatistics::downloaded(bytes);
        if created {
            stats.directories_created = 1;
        }
        Ok(stats)
    }

    /// Download many objects in parallel using buffer_unordered.
    ///
    /// Individual failures are logged and collected in
    /// `TransferStatistics::errors`; they never abort the batch.
    pub async fn download_objects(&self, requests: Vec<DownloadRequest>) -> TransferStatistics {
        if requests.is_empty() {
            return TransferStatistics::default();
        }

        let results: Vec<TransferStatistics> = stream::iter(requests)
            .map(|request| async move {
                match self.download_object(&request.key, &request.destination).await {
                    Ok(stats) => stats,
                    Err(e) => {
                        log::error!(
                            "Error downloading file ({}) from S3 bucket ({}): {}",
                            request.key,
                            self.bucket,
                            e
                        );
                        TransferStatistics::failed(TransferError::new(request.key, e))
                    }
                }
            })
            .buffer_unordered(self.max_concurrency())
            .collect()
            .await;

        let mut stats = TransferStatistics::default();
        for result in results {
            stats.merge(result);
        }
        stats
    }
}

/// Create any missing directories above `path`.
///
/// Returns `true` when something had to be created.
async fn ensure_parent_dir(path: &Path) -> Result<bool, StorageError> {
    let parent: &Path = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(false),
    };

    if tokio::fs::metadata(parent).await.is_ok_and(|m| m.is_dir()) {
        return Ok(false);
    }

    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| StorageError::io(parent.display().to_string(), e))?;
    log::info!("Created directory ({})", parent.display());
    Ok(true)
}
