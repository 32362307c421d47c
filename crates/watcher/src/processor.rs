//! Consumer side of the pipeline: downloads, acknowledgements, side effects.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use s3watcher_common::local_path_for_key;
use s3watcher_filesystem::Ownership;
use s3watcher_storage::{
    AuditRecord, AuditSink, NotificationSink, S3Location, Session, SessionManager,
};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::event::{EventAction, NotificationEvent};

/// Action type written to the audit log for downloads.
pub const AUDIT_ACTION_PUT: &str = "PUT";

/// Destination recorded in the audit log for downloads.
pub const AUDIT_DESTINATION: &str = "External Server";

/// Optional best-effort side-effect destinations.
#[derive(Clone, Default)]
pub struct Sinks {
    pub notifier: Option<Arc<dyn NotificationSink>>,
    pub audit: Option<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for Sinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sinks")
            .field("notifier", &self.notifier.is_some())
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Object written to `path`.
    Downloaded { path: PathBuf, bytes: u64 },
    /// Download attempted and failed.
    Failed { reason: String },
    /// Event not materialized locally (removals).
    Ignored,
}

/// Drains the work queue one event at a time.
pub struct Processor {
    sessions: Arc<SessionManager>,
    queue_url: String,
    location: S3Location,
    root: PathBuf,
    owner: Option<Ownership>,
    allow_delete: bool,
    sinks: Sinks,
}

impl Processor {
    /// Create a processor mirroring `location` under `root`.
    pub fn new(
        sessions: Arc<SessionManager>,
        queue_url: impl Into<String>,
        location: S3Location,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sessions,
            queue_url: queue_url.into(),
            location,
            root: root.into(),
            owner: None,
            allow_delete: false,
            sinks: Sinks::default(),
        }
    }

    pub fn with_owner(mut self, owner: Option<Ownership>) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_allow_delete(mut self, allow_delete: bool) -> Self {
        self.allow_delete = allow_delete;
        self
    }

    pub fn with_sinks(mut self, sinks: Sinks) -> Self {
        self.sinks = sinks;
        self
    }

    /// Process events until every sender is gone.
    #[tracing::instrument(skip(self, work), fields(bucket = %self.location.bucket))]
    pub async fn run(self, mut work: UnboundedReceiver<NotificationEvent>) {
        log::info!(
            "Processing events for {} into {}",
            self.location,
            self.root.display()
        );
        while let Some(event) = work.recv().await {
            self.handle(&event).await;
        }
        log::info!("Work queue closed, stopping processor");
    }

    /// Handle one event. Never fails; every problem is logged.
    ///
    /// The source message is acknowledged only after the download attempt,
    /// whatever its result. Sinks run after the acknowledgement.
    pub async fn handle(&self, event: &NotificationEvent) -> EventOutcome {
        let session: Arc<Session> = match self.sessions.current().await {
            Ok(session) => session,
            Err(e) => {
                log::error!(
                    "No session available for ({}); message left for redelivery: {}",
                    event.object_key(),
                    e
                );
                return EventOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let outcome: EventOutcome = match event.action() {
            EventAction::Create => self.download(&session, event.object_key()).await,
            EventAction::Delete => {
                if self.allow_delete {
                    log::info!(
                        "Removal of ({}) noted; local files are never deleted",
                        event.object_key()
                    );
                } else {
                    log::debug!("Ignoring removal of ({})", event.object_key());
                }
                EventOutcome::Ignored
            }
        };

        if let Err(e) = session
            .queue()
            .delete_message(&self.queue_url, event.ack_token())
            .await
        {
            log::error!(
                "Error deleting message for ({}) from queue ({}): {}",
                event.object_key(),
                self.queue_url,
                e
            );
        }

        self.emit(event.object_key(), &outcome).await;
        outcome
    }

    async fn download(&self, session: &Session, key: &str) -> EventOutcome {
        let destination: PathBuf = match local_path_for_key(&self.root, key, &self.location.prefix)
        {
            Ok(path) => path,
            Err(e) => {
                log::error!("Cannot mirror ({}) under {}: {}", key, self.root.display(), e);
                return EventOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        match session.downloads().download_object(key, &destination).await {
            Ok(stats) => {
                if let Some(owner) = &self.owner {
                    apply_owner(owner, &destination);
                }
                EventOutcome::Downloaded {
                    path: destination,
                    bytes: stats.bytes_transferred,
                }
            }
            Err(e) => {
                log::error!(
                    "Error downloading file ({}) from S3 bucket ({}): {}",
                    key,
                    self.location.bucket,
                    e
                );
                EventOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn emit(&self, key: &str, outcome: &EventOutcome) {
        let message: String = match outcome {
            EventOutcome::Downloaded { path, .. } => format!(
                "File ({}) downloaded from S3 bucket ({}) to {}",
                key,
                self.location.bucket,
                path.display()
            ),
            EventOutcome::Failed { reason } => format!(
                "Error downloading file ({}) from S3 bucket ({}): {}",
                key, self.location.bucket, reason
            ),
            EventOutcome::Ignored => return,
        };

        if let Some(notifier) = &self.sinks.notifier {
            if let Err(e) = notifier.notify(&message).await {
                log::warn!("Error sending notification for ({}): {}", key, e);
            }
        }

        if let (EventOutcome::Downloaded { .. }, Some(audit)) = (outcome, &self.sinks.audit) {
            let record: AuditRecord = audit_record(key, &self.location.bucket);
            match audit.record(&record).await {
                Ok(()) => log::info!("Object ({}) - Event Successfully Logged", key),
                Err(e) => log::warn!("Error writing audit record for ({}): {}", key, e),
            }
        }
    }
}

/// Audit record for a completed download of `key` from `bucket`.
pub fn audit_record(key: &str, bucket: &str) -> AuditRecord {
    AuditRecord {
        action_type: AUDIT_ACTION_PUT.to_string(),
        file_key: key.to_string(),
        new_file_key: Some(key.to_string()),
        source_bucket: Some(bucket.to_string()),
        destination_bucket: Some(AUDIT_DESTINATION.to_string()),
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    }
}

/// Apply `owner` to `path`, logging rather than failing.
pub(crate) fn apply_owner(owner: &Ownership, path: &Path) {
    if let Err(e) = owner.apply(path) {
        log::warn!("Error setting ownership of {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use s3watcher_storage::testing::{
        raw_message, s3_event_body, MemoryQueue, MemoryStorage, RecordingAuditSink,
        RecordingNotifier, StaticSessionFactory,
    };
    use s3watcher_storage::DownloadOptions;
    use tempfile::TempDir;

    use super::*;

    const QUEUE_URL: &str = "https://queue.local/watch";

    struct Fixture {
        storage: Arc<MemoryStorage>,
        queue: Arc<MemoryQueue>,
        sessions: Arc<SessionManager>,
        dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::with_bucket("bucket"));
        let queue = Arc::new(MemoryQueue::with_queue("watch", QUEUE_URL));
        let factory = Arc::new(StaticSessionFactory::new(
            storage.clone(),
            queue.clone(),
            "bucket",
            DownloadOptions::default(),
        ));
        let sessions = Arc::new(
            SessionManager::new(factory, Duration::from_secs(900))
                .await
                .unwrap(),
        );
        Fixture {
            storage,
            queue,
            sessions,
            dir: TempDir::new().unwrap(),
        }
    }

    /// An owner different from the test process when running as root, so a
    /// chown is observable; the process's own ids otherwise.
    fn test_owner() -> Ownership {
        // SAFETY: these calls have no preconditions and cannot fail.
        let (euid, uid, gid) = unsafe { (libc::geteuid(), libc::getuid(), libc::getgid()) };
        if euid == 0 {
            Ownership { uid: 4242, gid: 4242 }
        } else {
            Ownership { uid, gid }
        }
    }

    fn owner_of(path: &Path) -> (u32, u32) {
        use std::os::unix::fs::MetadataExt;
        let meta = std::fs::metadata(path).unwrap();
        (meta.uid(), meta.gid())
    }

    fn event(id: &str, name: &str, key: &str) -> NotificationEvent {
        let token: String = format!("ack-{}", id);
        NotificationEvent::from_raw(&raw_message(id, &token, s3_event_body(name, key))).unwrap()
    }

    #[tokio::test]
    async fn test_create_downloads_then_acknowledges() {
        let fx = fixture().await;
        fx.storage.put("bucket", "raw/day1/a.txt", "abc");
        let processor = Processor::new(
            fx.sessions.clone(),
            QUEUE_URL,
            S3Location::new("bucket", "raw"),
            fx.dir.path(),
        );

        let outcome = processor
            .handle(&event("m1", "ObjectCreated:Put", "raw/day1/a.txt"))
            .await;

        let expected: PathBuf = fx.dir.path().join("day1/a.txt");
        assert_eq!(
            outcome,
            EventOutcome::Downloaded {
                path: expected.clone(),
                bytes: 3
            }
        );
        assert_eq!(std::fs::read_to_string(expected).unwrap(), "abc");
        assert_eq!(fx.queue.deleted(), vec!["ack-m1".to_string()]);
    }

    #[tokio::test]
    async fn test_owner_applied_after_successful_download() {
        let fx = fixture().await;
        fx.storage.put("bucket", "owned.txt", "abc");
        let owner: Ownership = test_owner();
        let processor = Processor::new(
            fx.sessions.clone(),
            QUEUE_URL,
            S3Location::new("bucket", ""),
            fx.dir.path(),
        )
        .with_owner(Some(owner));

        let outcome = processor
            .handle(&event("m1", "ObjectCreated:Put", "owned.txt"))
            .await;

        assert!(matches!(outcome, EventOutcome::Downloaded { .. }));
        assert_eq!(owner_of(&fx.dir.path().join("owned.txt")), (owner.uid, owner.gid));
    }

    #[tokio::test]
    async fn test_owner_not_applied_after_failed_download() {
        let fx = fixture().await;
        fx.storage.put("bucket", "partial.txt", "abc");
        fx.storage.fail_after_write("partial.txt");
        let processor = Processor::new(
            fx.sessions.clone(),
            QUEUE_URL,
            S3Location::new("bucket", ""),
            fx.dir.path(),
        )
        .with_owner(Some(test_owner()));

        let outcome = processor
            .handle(&event("m1", "ObjectCreated:Put", "partial.txt"))
            .await;

        assert!(matches!(outcome, EventOutcome::Failed { .. }));
        let path: PathBuf = fx.dir.path().join("partial.txt");
        assert!(path.exists());
        // SAFETY: no preconditions.
        let (uid, gid) = unsafe { (libc::geteuid(), libc::getegid()) };
        assert_eq!(owner_of(&path), (uid, gid));
        assert_eq!(fx.queue.deleted(), vec!["ack-m1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_download_is_still_acknowledged() {
        let fx = fixture().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let audit = Arc::new(RecordingAuditSink::default());
        let processor = Processor::new(
            fx.sessions.clone(),
            QUEUE_URL,
            S3Location::new("bucket", ""),
            fx.dir.path(),
        )
        .with_sinks(Sinks {
            notifier: Some(notifier.clone()),
            audit: Some(audit.clone()),
        });

        let outcome = processor
            .handle(&event("m1", "ObjectCreated:Put", "missing.txt"))
            .await;

        assert!(matches!(outcome, EventOutcome::Failed { .. }));
        assert_eq!(fx.queue.deleted(), vec!["ack-m1".to_string()]);
        assert_eq!(notifier.messages().len(), 1);
        assert!(notifier.messages()[0].starts_with("Error downloading file (missing.txt)"));
        assert!(audit.records().is_empty());
    }

    #[tokio::test]
    async fn test_removal_is_acknowledged_without_touching_files() {
        let fx = fixture().await;
        std::fs::write(fx.dir.path().join("keep.txt"), "local").unwrap();
        let processor = Processor::new(
            fx.sessions.clone(),
            QUEUE_URL,
            S3Location::new("bucket", ""),
            fx.dir.path(),
        )
        .with_allow_delete(true);

        let outcome = processor
            .handle(&event("m1", "ObjectRemoved:Delete", "keep.txt"))
            .await;

        assert_eq!(outcome, EventOutcome::Ignored);
        assert!(fx.dir.path().join("keep.txt").exists());
        assert!(fx.storage.downloads().is_empty());
        assert_eq!(fx.queue.deleted(), vec!["ack-m1".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_sinks_do_not_block_acknowledgement() {
        let fx = fixture().await;
        fx.storage.put("bucket", "a.txt", "x");
        let notifier = Arc::new(RecordingNotifier::failing());
        let audit = Arc::new(RecordingAuditSink::failing());
        let processor = Processor::new(
            fx.sessions.clone(),
            QUEUE_URL,
            S3Location::new("bucket", ""),
            fx.dir.path(),
        )
        .with_sinks(Sinks {
            notifier: Some(notifier.clone()),
            audit: Some(audit.clone()),
        });

        let outcome = processor.handle(&event("m1", "ObjectCreated:Put", "a.txt")).await;

        assert!(matches!(outcome, EventOutcome::Downloaded { .. }));
        assert_eq!(fx.queue.deleted().len(), 1);
        assert_eq!(notifier.messages().len(), 1);
        let records = audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action_type, "PUT");
        assert_eq!(records[0].file_key, "a.txt");
        assert_eq!(records[0].source_bucket.as_deref(), Some("bucket"));
        assert_eq!(records[0].destination_bucket.as_deref(), Some("External Server"));
    }

    #[tokio::test]
    async fn test_key_escaping_root_is_rejected() {
        let fx = fixture().await;
        fx.storage.put("bucket", "../escape.txt", "x");
        let processor = Processor::new(
            fx.sessions.clone(),
            QUEUE_URL,
            S3Location::new("bucket", ""),
            fx.dir.path().join("mirror"),
        );

        let outcome = processor
            .handle(&event("m1", "ObjectCreated:Put", "../escape.txt"))
            .await;

        assert!(matches!(outcome, EventOutcome::Failed { .. }));
        assert!(!fx.dir.path().join("escape.txt").exists());
        assert!(fx.storage.downloads().is_empty());
        assert_eq!(fx.queue.deleted().len(), 1);
    }

    #[test]
    fn test_audit_record_fields() {
        let record = audit_record("k.bin", "data");
        assert_eq!(record.new_file_key.as_deref(), Some("k.bin"));
        assert!(record.timestamp_ms > 0);
    }
}
