//! AWS SDK SQS client implementation.

use async_trait::async_trait;
use aws_sdk_sqs::Client as SqsClient;

use s3watcher_storage::{QueueClient, RawMessage, ReceiveSettings, StorageError};

use crate::error::storage_error;

/// QueueClient implementation using AWS SDK for Rust.
#[derive(Debug, Clone)]
pub struct SdkQueueClient {
    sqs_client: SqsClient,
}

impl SdkQueueClient {
    /// Wrap an already configured SQS client.
    pub fn new(sqs_client: SqsClient) -> Self {
        Self { sqs_client }
    }
}

#[async_trait]
impl QueueClient for SdkQueueClient {
    async fn get_queue_url(&self, queue_name: &str) -> Result<String, StorageError> {
        let response = self
            .sqs_client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_queue_does_not_exist())
                {
                    StorageError::QueueNotFound {
                        queue: queue_name.to_string(),
                    }
                } else {
                    storage_error(queue_name, &err)
                }
            })?;

        response
            .queue_url()
            .map(|url| url.to_string())
            .ok_or_else(|| StorageError::QueueNotFound {
                queue: queue_name.to_string(),
            })
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        settings: &ReceiveSettings,
    ) -> Result<Vec<RawMessage>, StorageError> {
        let response = self
            .sqs_client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(settings.max_messages)
            .visibility_timeout(settings.visibility_timeout)
            .wait_time_seconds(settings.wait_time_seconds)
            .send()
            .await
            .map_err(|err| storage_error(queue_url, &err))?;

        Ok(response
            .messages()
            .iter()
            .map(|message| RawMessage {
                message_id: message.message_id().map(|s| s.to_string()),
                ack_token: message.receipt_handle().map(|s| s.to_string()),
                body: message.body().map(|s| s.to_string()),
            })
            .collect())
    }

    async fn delete_message(&self, queue_url: &str, ack_token: &str) -> Result<(), StorageError> {
        self.sqs_client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(ack_token)
            .send()
            .await
            .map_err(|err| storage_error(queue_url, &err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_client_implements_queue_client() {
        fn assert_queue_client<T: QueueClient>() {}
        assert_queue_client::<SdkQueueClient>();
    }
}
