//! Slack notification sink.

use std::time::Duration;

use async_trait::async_trait;
use s3watcher_storage::{NotificationSink, StorageError};
use serde::Deserialize;

/// Web API method used to post messages.
pub const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts notifications to one Slack channel.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    http: reqwest::Client,
    token: String,
    channel: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackNotifier {
    pub fn new(token: impl Into<String>, channel: impl Into<String>) -> Result<Self, StorageError> {
        let http: reqwest::Client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::InvalidConfig {
                message: format!("cannot build HTTP client: {}", e),
            })?;
        Ok(Self {
            http,
            token: token.into(),
            channel: channel.into(),
            endpoint: POST_MESSAGE_URL.to_string(),
        })
    }

    /// Post somewhere other than the public Slack API.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// JSON body for posting `message`.
    pub fn payload(&self, message: &str) -> serde_json::Value {
        serde_json::json!({
            "channel": self.channel,
            "text": message,
        })
    }
}

#[async_trait]
impl NotificationSink for SlackNotifier {
    async fn notify(&self, message: &str) -> Result<(), StorageError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(StorageError::network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::NetworkError {
                message: format!("Slack returned HTTP {}", status),
                retryable: status.is_server_error(),
            });
        }

        let body: PostMessageResponse = response.json().await.map_err(StorageError::network)?;
        if !body.ok {
            return Err(StorageError::Other {
                message: format!(
                    "Slack rejected message for {}: {}",
                    self.channel,
                    body.error.as_deref().unwrap_or("unknown error")
                ),
            });
        }
        log::debug!("Posted notification to Slack channel {}", self.channel);
        Ok(())
    }
}
