//! Credentialed session lifecycle.
//!
//! A [`Session`] bundles the live queue client, storage client and download
//! orchestrator built from one set of credentials. [`SessionManager`] hands
//! out the current session and transparently rebuilds it once it is older
//! than the configured maximum age, so callers never check staleness
//! themselves.
//!
//! Rebuilding is transactional: the replacement is fully constructed before
//! it is swapped in. Operations already holding the previous `Arc<Session>`
//! finish on it; every later call to [`SessionManager::current`] sees the new
//! one. If a rebuild fails the stale session is not handed out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::download::{DownloadOptions, DownloadOrchestrator};
use crate::error::StorageError;
use crate::traits::{QueueClient, StorageClient};

/// Live client handles built from one set of credentials.
pub struct Session {
    storage: Arc<dyn StorageClient>,
    queue: Arc<dyn QueueClient>,
    downloads: DownloadOrchestrator,
    created_at: Instant,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("downloads", &self.downloads)
            .field("age", &self.age())
            .finish()
    }
}

impl Session {
    /// Assemble a session from freshly built clients.
    ///
    /// # Arguments
    /// * `storage` - Object storage client
    /// * `queue` - Queue client
    /// * `bucket` - Bucket the download orchestrator reads from
    /// * `options` - Download pool options
    pub fn new(
        storage: Arc<dyn StorageClient>,
        queue: Arc<dyn QueueClient>,
        bucket: impl Into<String>,
        options: DownloadOptions,
    ) -> Self {
        let downloads: DownloadOrchestrator =
            DownloadOrchestrator::new(Arc::clone(&storage), bucket, options);
        Self {
            storage,
            queue,
            downloads,
            created_at: Instant::now(),
        }
    }

    /// Object storage client.
    pub fn storage(&self) -> &dyn StorageClient {
        self.storage.as_ref()
    }

    /// Queue client.
    pub fn queue(&self) -> &dyn QueueClient {
        self.queue.as_ref()
    }

    /// Pooled download orchestrator ("transfer manager").
    pub fn downloads(&self) -> &DownloadOrchestrator {
        &self.downloads
    }

    /// Time since this session was built.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Builds new sessions, e.g. by reloading credentials.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Build a complete new session.
    async fn create_session(&self) -> Result<Session, StorageError>;
}

/// Owner of the current session.
pub struct SessionManager {
    factory: Arc<dyn SessionFactory>,
    current: RwLock<Arc<Session>>,
    refresh_lock: Mutex<()>,
    max_age: Duration,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl SessionManager {
    /// Build the initial session.
    ///
    /// # Arguments
    /// * `factory` - Source of sessions
    /// * `max_age` - Age at which a session is rebuilt
    pub async fn new(
        factory: Arc<dyn SessionFactory>,
        max_age: Duration,
    ) -> Result<Self, StorageError> {
        let session: Session = factory.create_session().await?;
        Ok(Self {
            factory,
            current: RwLock::new(Arc::new(session)),
            refresh_lock: Mutex::new(()),
            max_age,
        })
    }

    /// Current session, rebuilt first if it has reached its maximum age.
    pub async fn current(&self) -> Result<Arc<Session>, StorageError> {
        let session: Arc<Session> = Arc::clone(&*self.current.read().await);
        if session.age() < self.max_age {
            return Ok(session);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        let session: Arc<Session> = Arc::clone(&*self.current.read().await);
        if session.age() < self.max_age {
            return Ok(session);
        }

        log::info!(
            "Session is {}s old (limit {}s), refreshing clients",
            session.age().as_secs(),
            self.max_age.as_secs()
        );
        self.rebuild().await
    }

    /// Caller must hold `refresh_lock`.
    async fn rebuild(&self) -> Result<Arc<Session>, StorageError> {
        let fresh: Arc<Session> = match self.factory.create_session().await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                log::error!("Error refreshing session: {}", e);
                return Err(e);
            }
        };

        *self.current.write().await = Arc::clone(&fresh);
        log::info!("Session refreshed");
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::traits::{ObjectInfo, RawMessage};
    use crate::types::ReceiveSettings;

    struct NullStorage;

    #[async_trait]
    impl StorageClient for NullStorage {
        async fn head_bucket(&self, _bucket: &str) -> Result<(), StorageError> {
            Ok(())
        }

        async fn list_objects(
            &self,
            _bucket: &str,
            _prefix: &str,
        ) -> Result<Vec<ObjectInfo>, StorageError> {
            Ok(Vec::new())
        }

        async fn get_object_to_file(
            &self,
            _bucket: &str,
            _key: &str,
            _file_path: &Path,
        ) -> Result<u64, StorageError> {
            Ok(0)
        }
    }

    struct NullQueue;

    #[async_trait]
    impl QueueClient for NullQueue {
        async fn get_queue_url(&self, queue_name: &str) -> Result<String, StorageError> {
            Ok(queue_name.to_string())
        }

        async fn receive_messages(
            &self,
            _queue_url: &str,
            _settings: &ReceiveSettings,
        ) -> Result<Vec<RawMessage>, StorageError> {
            Ok(Vec::new())
        }

        async fn delete_message(
            &self,
            _queue_url: &str,
            _ack_token: &str,
        ) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        builds: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl SessionFactory for CountingFactory {
        async fn create_session(&self) -> Result<Session, StorageError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::network("credentials expired"));
            }
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Session::new(
                Arc::new(NullStorage),
                Arc::new(NullQueue),
                "bucket",
                DownloadOptions::default(),
            ))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_session_is_reused() {
        let factory = Arc::new(CountingFactory::default());
        let manager = SessionManager::new(factory.clone(), Duration::from_secs(900))
            .await
            .unwrap();

        let first: Arc<Session> = manager.current().await.unwrap();
        tokio::time::advance(Duration::from_secs(899)).await;
        let second: Arc<Session> = manager.current().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_session_is_rebuilt() {
        let factory = Arc::new(CountingFactory::default());
        let manager = SessionManager::new(factory.clone(), Duration::from_secs(900))
            .await
            .unwrap();

        let old: Arc<Session> = manager.current().await.unwrap();
        tokio::time::advance(Duration::from_secs(900)).await;
        let new: Arc<Session> = manager.current().await.unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
        // In-flight holders keep a usable handle.
        assert_eq!(old.downloads().bucket(), "bucket");
        assert!(new.age() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_does_not_hand_out_stale_session() {
        let factory = Arc::new(CountingFactory::default());
        let manager = SessionManager::new(factory.clone(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        factory.fail.store(true, Ordering::SeqCst);
        assert!(manager.current().await.is_err());

        factory.fail.store(false, Ordering::SeqCst);
        assert!(manager.current().await.is_ok());
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let factory = Arc::new(CountingFactory::default());
        let manager = Arc::new(
            SessionManager::new(factory.clone(), Duration::from_secs(60))
                .await
                .unwrap(),
        );
        tokio::time::advance(Duration::from_secs(61)).await;

        let (a, b) = tokio::join!(manager.current(), manager.current());
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    }
}
