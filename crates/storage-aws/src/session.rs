//! Building sessions from the default AWS credential chain.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::Region;

use s3watcher_storage::{
    DownloadOptions, Session, SessionFactory, StorageError, StorageSettings,
};

use crate::client::SdkStorageClient;
use crate::queue::SdkQueueClient;

/// Load shared SDK configuration for `settings`.
///
/// Credentials are re-resolved from the profile/environment on every call.
pub async fn load_sdk_config(settings: &StorageSettings) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(ref profile) = settings.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(ref region) = settings.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(ref endpoint) = settings.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}

/// Build an S3 client, using path-style addressing for custom endpoints.
pub fn s3_client(sdk_config: &SdkConfig, settings: &StorageSettings) -> aws_sdk_s3::Client {
    let config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(settings.endpoint_url.is_some())
        .build();
    aws_sdk_s3::Client::from_conf(config)
}

/// SessionFactory that reloads credentials and rebuilds every client.
#[derive(Debug, Clone)]
pub struct SdkSessionFactory {
    settings: StorageSettings,
    bucket: String,
}

impl SdkSessionFactory {
    /// Create a factory for sessions downloading from `bucket`.
    pub fn new(settings: StorageSettings, bucket: impl Into<String>) -> Self {
        Self {
            settings,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl SessionFactory for SdkSessionFactory {
    async fn create_session(&self) -> Result<Session, StorageError> {
        let sdk_config: SdkConfig = load_sdk_config(&self.settings).await;
        if sdk_config.region().is_none() {
            return Err(StorageError::InvalidConfig {
                message: "no AWS region configured (set --region or AWS_REGION)".to_string(),
            });
        }

        let storage = SdkStorageClient::new(s3_client(&sdk_config, &self.settings));
        let queue = SdkQueueClient::new(aws_sdk_sqs::Client::new(&sdk_config));

        log::debug!(
            "Built AWS session (region {:?}, profile {:?})",
            sdk_config.region(),
            self.settings.profile
        );

        Ok(Session::new(
            Arc::new(storage),
            Arc::new(queue),
            self.bucket.clone(),
            DownloadOptions::default().with_max_concurrency(self.settings.concurrency_limit),
        ))
    }
}
