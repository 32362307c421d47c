//! Shared constants used across s3watcher crates.

/// Maximum number of messages a single queue receive call may return.
pub const MAX_RECEIVE_BATCH: i32 = 10;

/// Default visibility lease for received messages (seconds).
/// Short enough that an unacknowledged message is redelivered quickly.
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: i32 = 5;

/// Default interval between queue polls (seconds).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

/// Default number of message ids remembered for duplicate suppression.
pub const DEFAULT_HISTORY_LIMIT: usize = 100_000;

/// Default age after which client handles are rebuilt (minutes).
pub const DEFAULT_SESSION_REFRESH_MINS: u64 = 15;

/// Default bound on concurrent downloads and pooled connections.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 20;

/// Audit database used when none is configured.
pub const DEFAULT_AUDIT_DATABASE: &str = "sdc_aws_logs";

/// Audit table used when none is configured.
pub const DEFAULT_AUDIT_TABLE: &str = "sdc_aws_s3_bucket_log_table";

/// Suffix of the scratch file a download streams into before it is renamed
/// into place.
pub const PARTIAL_DOWNLOAD_SUFFIX: &str = ".s3watcher-part";
