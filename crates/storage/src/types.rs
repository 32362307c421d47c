//! Shared data structures for storage operations.

use std::path::PathBuf;

use s3watcher_common::{
    DEFAULT_CONCURRENCY_LIMIT, DEFAULT_VISIBILITY_TIMEOUT_SECS, MAX_RECEIVE_BATCH,
};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, TransferError};

/// Configuration settings for building storage and queue clients.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// AWS region (falls back to the profile/environment when unset).
    pub region: Option<String>,
    /// Named credential profile.
    pub profile: Option<String>,
    /// Custom endpoint (LocalStack, MinIO, ElasticMQ).
    pub endpoint_url: Option<String>,
    /// Bound on concurrent downloads and pooled connections.
    pub concurrency_limit: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            endpoint_url: None,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
        }
    }
}

/// Bucket plus optional sub-prefix being mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Location {
    /// S3 bucket name.
    pub bucket: String,
    /// Sub-prefix inside the bucket, without surrounding slashes (may be empty).
    pub prefix: String,
}

impl S3Location {
    /// Create a new S3 location.
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            bucket: bucket.into(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Parse `bucket` or `bucket/sub/prefix`.
    pub fn parse(value: &str) -> Result<Self, StorageError> {
        let value: &str = value.trim().trim_start_matches("s3://");
        let (bucket, prefix) = match value.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix),
            None => (value, ""),
        };

        if bucket.is_empty() {
            return Err(StorageError::InvalidConfig {
                message: format!("bucket name is empty in '{}'", value),
            });
        }

        Ok(Self::new(bucket, prefix))
    }

    /// Prefix to use for listing: `"{prefix}/"`, or empty for the whole bucket.
    pub fn list_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    /// ARN of the bucket.
    pub fn bucket_arn(&self) -> String {
        format!("arn:aws:s3:::{}", self.bucket)
    }
}

impl std::fmt::Display for S3Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "s3://{}", self.bucket)
        } else {
            write!(f, "s3://{}/{}", self.bucket, self.prefix)
        }
    }
}

/// Parameters of one queue receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveSettings {
    /// Maximum messages per call (1..=10).
    pub max_messages: i32,
    /// Visibility lease applied to received messages (seconds).
    pub visibility_timeout: i32,
    /// Long-poll wait (seconds). Zero keeps the poll loop responsive.
    pub wait_time_seconds: i32,
}

impl Default for ReceiveSettings {
    fn default() -> Self {
        Self {
            max_messages: MAX_RECEIVE_BATCH,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT_SECS,
            wait_time_seconds: 0,
        }
    }
}

impl ReceiveSettings {
    /// Set the batch size, clamped to what the transport accepts.
    pub fn with_max_messages(mut self, max_messages: i32) -> Self {
        self.max_messages = max_messages.clamp(1, MAX_RECEIVE_BATCH);
        self
    }

    /// Set the visibility lease.
    pub fn with_visibility_timeout(mut self, seconds: i32) -> Self {
        self.visibility_timeout = seconds.max(0);
        self
    }
}

/// One structured audit entry describing a transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    /// Action performed (e.g. "PUT").
    pub action_type: String,
    /// Object key that triggered the action.
    pub file_key: String,
    /// Key or path the object was written to, if different.
    pub new_file_key: Option<String>,
    /// Bucket the object came from.
    pub source_bucket: Option<String>,
    /// Where the object went.
    pub destination_bucket: Option<String>,
    /// Event time (Unix epoch milliseconds).
    pub timestamp_ms: i64,
}

/// One object to fetch into the local tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Object key.
    pub key: String,
    /// Local destination path.
    pub destination: PathBuf,
}

impl DownloadRequest {
    /// Create a new download request.
    pub fn new(key: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            destination: destination.into(),
        }
    }
}

/// Aggregated statistics for batch operations.
#[derive(Debug, Clone, Default)]
pub struct TransferStatistics {
    /// Total files processed.
    pub files_processed: u64,
    /// Files actually transferred.
    pub files_transferred: u64,
    /// Total bytes transferred.
    pub bytes_transferred: u64,
    /// Directories created along the way.
    pub directories_created: u64,
    /// Errors encountered (non-fatal).
    pub errors: Vec<TransferError>,
}

impl TransferStatistics {
    /// Create statistics for a downloaded file.
    pub fn downloaded(size: u64) -> Self {
        Self {
            files_processed: 1,
            files_transferred: 1,
            bytes_transferred: size,
            ..Default::default()
        }
    }

    /// Create statistics for a failed file.
    pub fn failed(error: TransferError) -> Self {
        Self {
            files_processed: 1,
            errors: vec![error],
            ..Default::default()
        }
    }

    /// Merge another statistics into this one.
    pub fn merge(&mut self, other: Self) {
        self.files_processed += other.files_processed;
        self.files_transferred += other.files_transferred;
        self.bytes_transferred += other.bytes_transferred;
        self.directories_created += other.directories_created;
        self.errors.extend(other.errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_location_parse_bucket_only() {
        let loc: S3Location = S3Location::parse("my-bucket").unwrap();
        assert_eq!(loc.bucket, "my-bucket");
        assert_eq!(loc.prefix, "");
        assert_eq!(loc.list_prefix(), "");
    }

    #[test]
    fn test_s3_location_parse_with_prefix() {
        let loc: S3Location = S3Location::parse("s3://my-bucket/level0/raw/").unwrap();
        assert_eq!(loc.bucket, "my-bucket");
        assert_eq!(loc.prefix, "level0/raw");
        assert_eq!(loc.list_prefix(), "level0/raw/");
        assert_eq!(loc.to_string(), "s3://my-bucket/level0/raw");
    }

    #[test]
    fn test_s3_location_parse_empty_bucket() {
        assert!(S3Location::parse("/prefix").is_err());
        assert!(S3Location::parse("").is_err());
    }

    #[test]
    fn test_bucket_arn() {
        let loc: S3Location = S3Location::new("data", "");
        assert_eq!(loc.bucket_arn(), "arn:aws:s3:::data");
    }

    #[test]
    fn test_receive_settings_clamped() {
        let settings: ReceiveSettings = ReceiveSettings::default().with_max_messages(50);
        assert_eq!(settings.max_messages, 10);
        assert_eq!(settings.wait_time_seconds, 0);
        let settings: ReceiveSettings = settings.with_max_messages(0);
        assert_eq!(settings.max_messages, 1);
    }

    #[test]
    fn test_transfer_statistics_merge() {
        let mut stats1 = TransferStatistics::downloaded(100);
        let stats2 = TransferStatistics::failed(TransferError::new(
            "b.txt",
            StorageError::network("timeout"),
        ));
        stats1.merge(stats2);

        assert_eq!(stats1.files_processed, 2);
        assert_eq!(stats1.files_transferred, 1);
        assert_eq!(stats1.bytes_transferred, 100);
        assert_eq!(stats1.errors.len(), 1);
        assert_eq!(stats1.errors[0].key, "b.txt");
    }
}
