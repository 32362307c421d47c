//! Audit records written to Amazon Timestream.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_timestreamwrite::types::{Dimension, MeasureValueType, Record, TimeUnit};
use aws_sdk_timestreamwrite::Client as TimestreamClient;

use s3watcher_storage::{AuditRecord, AuditSink, StorageError};

use crate::error::{storage_error, AwsError};

/// Measure name every record is written under.
const MEASURE_NAME: &str = "timestamp";

/// AuditSink writing one Timestream record per transfer.
#[derive(Debug, Clone)]
pub struct TimestreamAuditSink {
    client: TimestreamClient,
    database: String,
    table: String,
}

impl TimestreamAuditSink {
    /// Connect with endpoint discovery, which Timestream requires.
    ///
    /// The endpoint reload task is spawned onto the current runtime.
    pub async fn connect(
        sdk_config: &SdkConfig,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let (client, reload) = TimestreamClient::new(sdk_config)
            .with_endpoint_discovery_enabled()
            .await
            .map_err(|e| StorageError::NetworkError {
                message: format!("Timestream endpoint discovery failed: {}", e),
                retryable: true,
            })?;
        tokio::spawn(reload.reload_task());

        Ok(Self {
            client,
            database: database.into(),
            table: table.into(),
        })
    }
}

/// Always `N/A`; the watcher has no file count to report.
const FILE_COUNT_DIMENSION: &str = "current file count";

const NOT_APPLICABLE: &str = "N/A";

fn dimension(name: &str, value: &str) -> Result<Dimension, AwsError> {
    Dimension::builder()
        .name(name)
        .value(value)
        .build()
        .map_err(|e| AwsError::ConfigError(e.to_string()))
}

/// Dimensions for `record`; absent optional fields are given placeholders
/// because Timestream rejects empty dimension values.
pub fn record_dimensions(record: &AuditRecord) -> Vec<(&'static str, String)> {
    vec![
        ("action_type", record.action_type.clone()),
        (
            "source_bucket",
            record.source_bucket.clone().unwrap_or_else(|| NOT_APPLICABLE.to_string()),
        ),
        (
            "destination_bucket",
            record
                .destination_bucket
                .clone()
                .unwrap_or_else(|| NOT_APPLICABLE.to_string()),
        ),
        ("file_key", record.file_key.clone()),
        (
            "new_file_key",
            record.new_file_key.clone().unwrap_or_else(|| NOT_APPLICABLE.to_string()),
        ),
        (FILE_COUNT_DIMENSION, NOT_APPLICABLE.to_string()),
    ]
}

#[async_trait]
impl AuditSink for TimestreamAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), StorageError> {
        let dimensions: Vec<Dimension> = record_dimensions(record)
            .iter()
            .map(|(name, value)| dimension(name, value))
            .collect::<Result<_, _>>()?;

        let entry: Record = Record::builder()
            .time(record.timestamp_ms.to_string())
            .time_unit(TimeUnit::Milliseconds)
            .set_dimensions(Some(dimensions))
            .measure_name(MEASURE_NAME)
            .measure_value((record.timestamp_ms as f64 / 1000.0).to_string())
            .measure_value_type(MeasureValueType::Double)
            .build();

        self.client
            .write_records()
            .database_name(&self.database)
            .table_name(&self.table)
            .records(entry)
            .send()
            .await
            .map_err(|err| storage_error(&format!("{}/{}", self.database, self.table), &err))?;

        log::debug!("Wrote audit record for {}", record.file_key);
        Ok(())
    }
}
