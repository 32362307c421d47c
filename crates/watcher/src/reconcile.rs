//! One-time startup catch-up between the bucket and the local mirror.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use s3watcher_common::relative_to_local_path;
use s3watcher_filesystem::{diff_remote, LocalScanner, LocalSnapshot, Ownership, RemoteDiff};
use s3watcher_storage::{
    DownloadRequest, ObjectInfo, S3Location, Session, SessionManager, TransferError,
    TransferStatistics,
};

use crate::error::WatcherError;
use crate::processor::apply_owner;

/// Lists the bucket, scans the mirror, and downloads what is missing.
pub struct Reconciler {
    sessions: Arc<SessionManager>,
    location: S3Location,
    root: PathBuf,
    owner: Option<Ownership>,
}

impl Reconciler {
    pub fn new(
        sessions: Arc<SessionManager>,
        location: S3Location,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sessions,
            location,
            root: root.into(),
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: Option<Ownership>) -> Self {
        self.owner = owner;
        self
    }

    /// Compute remote keys with no local file.
    pub async fn plan(&self) -> Result<RemoteDiff, WatcherError> {
        let session: Arc<Session> = self.sessions.current().await?;
        let remote: Vec<ObjectInfo> = session
            .storage()
            .list_objects(&self.location.bucket, &self.location.list_prefix())
            .await?;

        let scanner: LocalScanner = LocalScanner::new(self.root.clone());
        let local: LocalSnapshot = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(|e| WatcherError::Task(e.to_string()))??;

        let diff: RemoteDiff = diff_remote(
            remote.iter().map(|o| o.key.as_str()),
            &self.location.prefix,
            &local,
        );
        log::info!(
            "Reconciliation of {}: {} remote objects, {} present locally, {} missing",
            self.location,
            remote.len(),
            diff.present,
            diff.missing.len()
        );
        Ok(diff)
    }

    /// Download every missing object through the shared download pool.
    ///
    /// Individual failures are collected in the returned statistics.
    #[tracing::instrument(skip(self), fields(location = %self.location))]
    pub async fn run(&self) -> Result<TransferStatistics, WatcherError> {
        let diff: RemoteDiff = self.plan().await?;
        if diff.is_complete() {
            log::info!("Local mirror of {} is up to date", self.location);
            return Ok(TransferStatistics::default());
        }

        let mut stats = TransferStatistics::default();
        let mut requests: Vec<DownloadRequest> = Vec::with_capacity(diff.missing.len());
        for entry in diff.missing {
            match relative_to_local_path(&entry.relative_path, &self.root) {
                Ok(destination) => requests.push(DownloadRequest::new(entry.key, destination)),
                Err(e) => {
                    log::error!(
                        "Cannot mirror ({}) under {}: {}",
                        entry.key,
                        self.root.display(),
                        e
                    );
                    let error: TransferError = TransferError::new(entry.key, e.into());
                    stats.merge(TransferStatistics::failed(error));
                }
            }
        }

        let session: Arc<Session> = self.sessions.current().await?;
        let downloaded: TransferStatistics =
            session.downloads().download_objects(requests.clone()).await;

        if let Some(owner) = &self.owner {
            let failed: HashSet<&str> =
                downloaded.errors.iter().map(|e| e.key.as_str()).collect();
            for request in requests.iter().filter(|r| !failed.contains(r.key.as_str())) {
                apply_owner(owner, &request.destination);
            }
        }

        stats.merge(downloaded);
        log::info!(
            "Reconciliation downloaded {} files ({} bytes), {} failed",
            stats.files_transferred,
            stats.bytes_transferred,
            stats.errors.len()
        );
        Ok(stats)
    }
}
