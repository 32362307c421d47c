//! Startup verification and task wiring.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use s3watcher_common::{DEFAULT_HISTORY_LIMIT, DEFAULT_POLL_INTERVAL_SECS};
use s3watcher_filesystem::Ownership;
use s3watcher_storage::{
    ReceiveSettings, S3Location, Session, SessionManager, StorageError, TransferStatistics,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::WatcherError;
use crate::event::NotificationEvent;
use crate::poller::Poller;
use crate::processor::{Processor, Sinks};
use crate::reconcile::Reconciler;

/// Fully validated watcher settings.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Local mirror root.
    pub root: PathBuf,
    /// Bucket and sub-prefix being mirrored.
    pub location: S3Location,
    /// Name of the notification queue.
    pub queue_name: String,
    /// Message ids remembered for duplicate suppression.
    pub history_limit: usize,
    /// Pause between queue polls.
    pub poll_interval: Duration,
    /// Receive batch size and visibility lease.
    pub receive: ReceiveSettings,
    /// Accepted but local deletion is never performed.
    pub allow_delete: bool,
    /// Run the reconciliation sweep before processing events.
    pub reconcile: bool,
    /// Ownership applied to downloaded files.
    pub owner: Option<Ownership>,
}

impl WatcherConfig {
    pub fn new(
        root: impl Into<PathBuf>,
        location: S3Location,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            location,
            queue_name: queue_name.into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            receive: ReceiveSettings::default(),
            allow_delete: false,
            reconcile: false,
            owner: None,
        }
    }
}

/// Running poller and processor tasks.
#[derive(Debug)]
pub struct WatcherHandle {
    queue_url: String,
    poller: JoinHandle<()>,
    processor: JoinHandle<()>,
}

impl WatcherHandle {
    /// URL of the queue being consumed.
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Stop both tasks. In-flight downloads are dropped with them.
    pub fn abort(&self) {
        self.poller.abort();
        self.processor.abort();
    }

    /// Run until `shutdown` resolves or a task ends, then stop both.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), WatcherError>
    where
        F: Future<Output = ()>,
    {
        let result: Result<(), WatcherError> = tokio::select! {
            _ = shutdown => {
                log::info!("Shutdown requested, stopping watcher");
                Ok(())
            }
            joined = &mut self.poller => task_ended("poller", joined),
            joined = &mut self.processor => task_ended("processor", joined),
        };
        self.abort();
        result
    }
}

fn task_ended(
    name: &str,
    joined: Result<(), tokio::task::JoinError>,
) -> Result<(), WatcherError> {
    match joined {
        Ok(()) => Err(WatcherError::Task(format!("{} stopped unexpectedly", name))),
        Err(e) => Err(WatcherError::Task(format!("{} failed: {}", name, e))),
    }
}

/// Entry point tying the pipeline together.
pub struct Watcher {
    config: WatcherConfig,
    sessions: Arc<SessionManager>,
    sinks: Sinks,
}

impl Watcher {
    pub fn new(config: WatcherConfig, sessions: Arc<SessionManager>) -> Self {
        Self {
            config,
            sessions,
            sinks: Sinks::default(),
        }
    }

    pub fn with_sinks(mut self, sinks: Sinks) -> Self {
        self.sinks = sinks;
        self
    }

    /// Check the root, resolve the queue URL and reach the bucket.
    ///
    /// # Errors
    /// `Config` when the root is not a directory, `Provisioning` when the queue
    /// does not exist or the bucket is missing, `Storage` for anything else.
    pub async fn verify(&self) -> Result<String, WatcherError> {
        let root_ok: bool = tokio::fs::metadata(&self.config.root)
            .await
            .is_ok_and(|m| m.is_dir());
        if !root_ok {
            return Err(WatcherError::Config {
                message: format!(
                    "download directory {} does not exist or is not a directory",
                    self.config.root.display()
                ),
            });
        }

        let session: Arc<Session> = self.sessions.current().await?;

        let lookup = session.queue().get_queue_url(&self.config.queue_name).await;
        let queue_url: String = match lookup {
            Ok(url) => url,
            Err(StorageError::QueueNotFound { queue }) => {
                return Err(WatcherError::Provisioning {
                    message: format!(
                        "queue {} does not exist; run with --setup to create it",
                        queue
                    ),
                });
            }
            Err(e) => return Err(e.into()),
        };

        match session.storage().head_bucket(&self.config.location.bucket).await {
            Ok(()) => {}
            Err(StorageError::BucketNotFound { bucket, message }) => {
                return Err(WatcherError::Provisioning {
                    message: format!("bucket {} is not reachable: {}", bucket, message),
                });
            }
            Err(e) => return Err(e.into()),
        }

        log::info!(
            "Verified queue ({}) and bucket ({})",
            queue_url,
            self.config.location.bucket
        );
        Ok(queue_url)
    }

    /// Verify the environment and spawn the poller and processor.
    ///
    /// With reconciliation enabled the sweep runs before the first receive,
    /// so no message is leased from the queue until the mirror has caught up.
    /// The processor drains the work queue from the start.
    pub async fn start(self) -> Result<WatcherHandle, WatcherError> {
        let queue_url: String = self.verify().await?;
        let config: WatcherConfig = self.config;

        let (sender, receiver) = mpsc::unbounded_channel::<NotificationEvent>();

        let poller: Poller = Poller::new(Arc::clone(&self.sessions), queue_url.clone(), sender)
            .with_receive_settings(config.receive)
            .with_interval(config.poll_interval)
            .with_history_limit(config.history_limit);

        let processor: Processor = Processor::new(
            Arc::clone(&self.sessions),
            queue_url.clone(),
            config.location.clone(),
            config.root.clone(),
        )
        .with_owner(config.owner)
        .with_allow_delete(config.allow_delete)
        .with_sinks(self.sinks);

        let reconciler: Option<Reconciler> = config.reconcile.then(|| {
            Reconciler::new(
                Arc::clone(&self.sessions),
                config.location.clone(),
                config.root.clone(),
            )
            .with_owner(config.owner)
        });

        let poller_task: JoinHandle<()> = tokio::spawn(async move {
            if let Some(reconciler) = reconciler {
                sweep(reconciler).await;
            }
            poller.run().await;
        });
        let processor_task: JoinHandle<()> = tokio::spawn(processor.run(receiver));

        log::info!(
            "Watching {} via queue ({}) into {}",
            config.location,
            queue_url,
            config.root.display()
        );
        Ok(WatcherHandle {
            queue_url,
            poller: poller_task,
            processor: processor_task,
        })
    }
}

async fn sweep(reconciler: Reconciler) {
    match reconciler.run().await {
        Ok(TransferStatistics { errors, .. }) if !errors.is_empty() => {
            log::warn!("Reconciliation finished with {} failures", errors.len())
        }
        Ok(_) => {}
        Err(e) => log::error!("Reconciliation failed: {}", e),
    }
}
