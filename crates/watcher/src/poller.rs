//! Queue polling and duplicate suppression.
//!
//! The poller is the only producer of the work queue and the only owner of
//! the [`DedupHistory`]. Each cycle it receives a batch, turns every message
//! into a [`NotificationEvent`], and forwards events whose message id has not
//! been seen before. Messages that fail to parse and recognized duplicates are
//! acknowledged here so they are not redelivered.

use std::sync::Arc;
use std::time::Duration;

use s3watcher_common::{DEFAULT_HISTORY_LIMIT, DEFAULT_POLL_INTERVAL_SECS};
use s3watcher_storage::{RawMessage, ReceiveSettings, Session, SessionManager, StorageError};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::MissedTickBehavior;

use crate::event::NotificationEvent;
use crate::history::DedupHistory;

/// Shortest pause between polls.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Counts from one ingest call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Messages received.
    pub received: usize,
    /// New events pushed to the work queue.
    pub enqueued: usize,
    /// Events dropped because their id was already seen.
    pub duplicates: usize,
    /// Messages that could not be parsed.
    pub rejected: usize,
}

/// Producer side of the pipeline.
pub struct Poller {
    sessions: Arc<SessionManager>,
    queue_url: String,
    settings: ReceiveSettings,
    interval: Duration,
    history: DedupHistory,
    work: UnboundedSender<NotificationEvent>,
}

impl Poller {
    /// Create a poller feeding `work` from the queue at `queue_url`.
    pub fn new(
        sessions: Arc<SessionManager>,
        queue_url: impl Into<String>,
        work: UnboundedSender<NotificationEvent>,
    ) -> Self {
        Self {
            sessions,
            queue_url: queue_url.into(),
            settings: ReceiveSettings::default(),
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            history: DedupHistory::new(DEFAULT_HISTORY_LIMIT),
            work,
        }
    }

    pub fn with_receive_settings(mut self, settings: ReceiveSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the pause between polls. Zero is raised to [`MIN_POLL_INTERVAL`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history = DedupHistory::new(limit);
        self
    }

    pub fn history(&self) -> &DedupHistory {
        &self.history
    }

    /// Receive up to one batch. An empty batch is the normal idle case.
    pub async fn fetch_batch(&self) -> Result<Vec<RawMessage>, StorageError> {
        let session: Arc<Session> = self.sessions.current().await?;
        session
            .queue()
            .receive_messages(&self.queue_url, &self.settings)
            .await
    }

    /// Parse, deduplicate and enqueue a batch.
    ///
    /// Acknowledgement failures are logged; they never fail the batch.
    pub async fn ingest(&mut self, messages: Vec<RawMessage>) -> IngestStats {
        let mut stats = IngestStats {
            received: messages.len(),
            ..Default::default()
        };

        for message in messages {
            let event: NotificationEvent = match NotificationEvent::from_raw(&message) {
                Ok(event) => event,
                Err(e) => {
                    stats.rejected += 1;
                    log::error!(
                        "Error parsing message {} from queue ({}): {}",
                        message.message_id.as_deref().unwrap_or("<none>"),
                        self.queue_url,
                        e
                    );
                    match message.ack_token.as_deref().filter(|t| !t.is_empty()) {
                        Some(token) => self.acknowledge(token).await,
                        None => log::warn!(
                            "Message without receipt handle on queue ({}) cannot be deleted",
                            self.queue_url
                        ),
                    }
                    continue;
                }
            };

            if !self.history.insert(event.message_id()) {
                stats.duplicates += 1;
                log::debug!(
                    "Dropping duplicate message {} for ({})",
                    event.message_id(),
                    event.object_key()
                );
                self.acknowledge(event.ack_token()).await;
                continue;
            }

            log::debug!(
                "Queued {} event for ({}) from message {}",
                event.action(),
                event.object_key(),
                event.message_id()
            );
            if self.work.send(event).is_err() {
                log::warn!("Work queue closed; dropping remaining messages");
                break;
            }
            stats.enqueued += 1;
        }

        stats
    }

    /// One fetch-and-ingest cycle.
    pub async fn poll_once(&mut self) -> Result<IngestStats, StorageError> {
        let messages: Vec<RawMessage> = self.fetch_batch().await?;
        if messages.is_empty() {
            return Ok(IngestStats::default());
        }
        Ok(self.ingest(messages).await)
    }

    /// Poll until the work queue is closed. Transport errors are logged and
    /// the loop carries on at the next tick.
    #[tracing::instrument(skip(self), fields(queue = %self.queue_url))]
    pub async fn run(mut self) {
        log::info!("Polling for messages on queue ({})", self.queue_url);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.work.is_closed() {
                log::info!("Work queue closed, stopping poller");
                return;
            }

            match self.poll_once().await {
                Ok(stats) if stats.received > 0 => log::debug!(
                    "Received {} messages: {} queued, {} duplicates, {} rejected",
                    stats.received,
                    stats.enqueued,
                    stats.duplicates,
                    stats.rejected
                ),
                Ok(_) => {}
                Err(e) if e.is_retryable() => log::warn!(
                    "Transient error polling queue ({}), retrying next tick: {}",
                    self.queue_url,
                    e
                ),
                Err(e) => log::error!(
                    "Error polling for messages on queue ({}): {}",
                    self.queue_url,
                    e
                ),
            }
        }
    }

    async fn acknowledge(&self, ack_token: &str) {
        let result: Result<(), StorageError> = match self.sessions.current().await {
            Ok(session) => session.queue().delete_message(&self.queue_url, ack_token).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            log::error!(
                "Error deleting message from queue ({}): {}",
                self.queue_url,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use s3watcher_storage::testing::{
        raw_message, s3_event_body, MemoryQueue, MemoryStorage, StaticSessionFactory,
    };
    use s3watcher_storage::DownloadOptions;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use super::*;
    use crate::event::EventAction;

    const QUEUE_URL: &str = "https://queue.local/watch";

    async fn poller(queue: Arc<MemoryQueue>) -> (Poller, UnboundedReceiver<NotificationEvent>) {
        let factory = Arc::new(StaticSessionFactory::new(
            Arc::new(MemoryStorage::with_bucket("bucket")),
            queue,
            "bucket",
            DownloadOptions::default(),
        ));
        let sessions = Arc::new(
            SessionManager::new(factory, Duration::from_secs(900))
                .await
                .unwrap(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        (Poller::new(sessions, QUEUE_URL, tx), rx)
    }

    #[tokio::test]
    async fn test_zero_interval_is_raised_and_run_stops_on_closed_queue() {
        let queue = Arc::new(MemoryQueue::with_queue("watch", QUEUE_URL));
        let (poller, rx) = poller(queue.clone()).await;
        let poller = poller.with_interval(Duration::ZERO);
        assert_eq!(poller.interval(), MIN_POLL_INTERVAL);

        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), poller.run())
            .await
            .unwrap();
        assert_eq!(queue.receive_calls(), 0);
    }

    #[tokio::test]
    async fn test_same_id_is_enqueued_once() {
        let queue = Arc::new(MemoryQueue::with_queue("watch", QUEUE_URL));
        let (mut poller, mut rx) = poller(queue.clone()).await;
        let body = s3_event_body("ObjectCreated:Put", "a.txt");

        let first = poller.ingest(vec![raw_message("m1", "r1", body.clone())]).await;
        let second = poller.ingest(vec![raw_message("m1", "r2", body)]).await;

        assert_eq!(first.enqueued, 1);
        assert_eq!(second.duplicates, 1);
        assert_eq!(second.enqueued, 0);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.action(), EventAction::Create);
        assert!(rx.try_recv().is_err());
        // Only the duplicate was acknowledged by the poller.
        assert_eq!(queue.deleted(), vec!["r2".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_message_is_acknowledged_once() {
        let queue = Arc::new(MemoryQueue::with_queue("watch", QUEUE_URL));
        let (mut poller, mut rx) = poller(queue.clone()).await;

        let stats = poller
            .ingest(vec![
                raw_message("bad", "r-bad", "{not json"),
                raw_message("ok", "r-ok", s3_event_body("ObjectCreated:Put", "f.txt")),
            ])
            .await;

        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.enqueued, 1);
        assert_eq!(queue.deleted(), vec!["r-bad".to_string()]);
        assert_eq!(rx.try_recv().unwrap().object_key(), "f.txt");
        assert!(!poller.history().contains("bad"));
    }

    #[tokio::test]
    async fn test_message_without_ack_token_is_skipped() {
        let queue = Arc::new(MemoryQueue::with_queue("watch", QUEUE_URL));
        let (mut poller, _rx) = poller(queue.clone()).await;

        let mut message = raw_message("m", "r", s3_event_body("ObjectCreated:Put", "f.txt"));
        message.ack_token = None;
        let stats = poller.ingest(vec![message]).await;

        assert_eq!(stats.rejected, 1);
        assert!(queue.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_poll_once_surfaces_transport_errors() {
        let queue = Arc::new(MemoryQueue::with_queue("watch", QUEUE_URL));
        queue.push_error(StorageError::network("connection reset"));
        queue.push_batch(vec![raw_message("m1", "r1", s3_event_body("ObjectCreated:Put", "x"))]);
        let (mut poller, _rx) = poller(queue.clone()).await;

        assert!(poller.poll_once().await.is_err());
        assert_eq!(poller.poll_once().await.unwrap().enqueued, 1);
        assert_eq!(poller.poll_once().await.unwrap(), IngestStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_errors_and_stops_when_queue_closes() {
        let queue = Arc::new(MemoryQueue::with_queue("watch", QUEUE_URL));
        queue.push_error(StorageError::network("throttled"));
        queue.push_batch(vec![raw_message("m1", "r1", s3_event_body("ObjectCreated:Put", "x"))]);
        let (poller, mut rx) = poller(queue.clone()).await;

        let task = tokio::spawn(poller.with_interval(Duration::from_secs(1)).run());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.object_key(), "x");
        assert!(queue.receive_calls() >= 2);

        drop(rx);
        tokio::time::advance(Duration::from_secs(2)).await;
        task.await.unwrap();
    }
}
