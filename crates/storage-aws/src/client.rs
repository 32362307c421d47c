//! AWS SDK S3 client implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use s3watcher_common::PARTIAL_DOWNLOAD_SUFFIX;
use s3watcher_storage::{ObjectInfo, StorageClient, StorageError};

use crate::error::storage_error;

/// StorageClient implementation using AWS SDK for Rust.
///
/// Retries and connection pooling come from the SDK; downloads are streamed
/// to disk chunk by chunk.
#[derive(Debug, Clone)]
pub struct SdkStorageClient {
    /// The underlying S3 client.
    s3_client: S3Client,
}

impl SdkStorageClient {
    /// Wrap an already configured S3 client.
    pub fn new(s3_client: S3Client) -> Self {
        Self { s3_client }
    }
}

/// Scratch path next to `destination`; renamed over it once complete.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(PARTIAL_DOWNLOAD_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl StorageClient for SdkStorageClient {
    async fn head_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        match self.s3_client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    Err(StorageError::BucketNotFound {
                        bucket: bucket.to_string(),
                        message: "bucket does not exist".to_string(),
                    })
                } else {
                    Err(storage_error(&format!("s3://{}", bucket), &err))
                }
            }
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects: Vec<ObjectInfo> = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.s3_client.list_objects_v2().bucket(bucket);

            if !prefix.is_empty() {
                request = request.prefix(prefix);
            }

            if let Some(ref token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_bucket()) {
                    StorageError::BucketNotFound {
                        bucket: bucket.to_string(),
                        message: "bucket does not exist".to_string(),
                    }
                } else {
                    storage_error(&format!("s3://{}/{}", bucket, prefix), &err)
                }
            })?;

            for obj in response.contents() {
                let last_modified: Option<i64> = obj
                    .last_modified()
                    .and_then(|dt| dt.to_millis().ok())
                    .map(|ms| ms / 1000);

                objects.push(ObjectInfo {
                    key: obj.key().unwrap_or_default().to_string(),
                    size: obj.size().map(|s| s.max(0) as u64).unwrap_or(0),
                    last_modified,
                    etag: obj.e_tag().map(|s| s.to_string()),
                });
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated() == Some(true) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        log::debug!(
            "Listed {} objects under s3://{}/{}",
            objects.len(),
            bucket,
            prefix
        );
        Ok(objects)
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<u64, StorageError> {
        let response = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    storage_error(&format!("s3://{}/{}", bucket, key), &err)
                }
            })?;

        let scratch: PathBuf = partial_path(file_path);
        let scratch_display: String = scratch.display().to_string();

        let mut file = File::create(&scratch)
            .await
            .map_err(|e| StorageError::io(&scratch_display, e))?;

        let mut written: u64 = 0;
        let mut body = response.body;
        loop {
            let chunk = match body.try_next().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&scratch).await;
                    return Err(StorageError::NetworkError {
                        message: e.to_string(),
                        retryable: true,
                    });
                }
            };
            if let Err(e) = file.write_all(&chunk).await {
                drop(file);
                let _ = tokio::fs::remove_file(&scratch).await;
                return Err(StorageError::io(&scratch_display, e));
            }
            written += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| StorageError::io(&scratch_display, e))?;
        drop(file);

        tokio::fs::rename(&scratch, file_path)
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_client_implements_storage_client() {
        fn assert_storage_client<T: StorageClient>() {}
        assert_storage_client::<SdkStorageClient>();
    }

    #[test]
    fn test_partial_path_sits_next_to_destination() {
        let scratch: PathBuf = partial_path(Path::new("/data/level0/file.cdf"));
        assert_eq!(scratch, PathBuf::from("/data/level0/file.cdf.s3watcher-part"));
    }
}
