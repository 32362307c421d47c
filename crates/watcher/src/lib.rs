//! Bucket notification pipeline for s3watcher.
//!
//! A [`Poller`] receives queue messages, parses them into
//! [`NotificationEvent`]s, drops duplicates through a bounded
//! [`DedupHistory`], and hands new events to a [`Processor`] over an
//! unbounded channel. The processor downloads each created object into the
//! local mirror and acknowledges the message afterwards. A [`Reconciler`] can
//! catch up on objects created while nothing was watching.
//!
//! [`Watcher`] verifies the queue and bucket and spawns both tasks.

pub mod error;
pub mod event;
pub mod history;
pub mod poller;
pub mod processor;
pub mod reconcile;
pub mod watcher;

pub use error::{ParseError, WatcherError};
pub use event::{decode_key, EventAction, NotificationEvent};
pub use history::DedupHistory;
pub use poller::{IngestStats, Poller};
pub use processor::{
    audit_record, EventOutcome, Processor, Sinks, AUDIT_ACTION_PUT, AUDIT_DESTINATION,
};
pub use reconcile::Reconciler;
pub use watcher::{Watcher, WatcherConfig, WatcherHandle};
