//! Queue and bucket-notification provisioning.
//!
//! Makes sure the named queue exists, lets the bucket publish to it, and adds
//! an `s3:ObjectCreated:*` route for the watched prefix to the bucket's
//! notification configuration. Existing routes are preserved; nothing is
//! written when an equivalent route is already present.

use aws_config::SdkConfig;
use aws_sdk_s3::types::{
    Event, FilterRule, FilterRuleName, NotificationConfiguration,
    NotificationConfigurationFilter, QueueConfiguration, S3KeyFilter,
};
use aws_sdk_sqs::types::QueueAttributeName;

use s3watcher_storage::{S3Location, StorageError, StorageSettings};

use crate::error::{storage_error, AwsError};
use crate::session::s3_client;

const OBJECT_CREATED: &str = "s3:ObjectCreated:*";

/// Id given to the notification route this tool adds.
pub const ROUTE_ID: &str = "s3watcher-object-created";

/// Access policy letting `bucket_arn` send messages to `queue_arn`.
pub fn queue_policy(queue_arn: &str, bucket_arn: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "AllowBucketNotifications",
            "Effect": "Allow",
            "Principal": { "Service": "s3.amazonaws.com" },
            "Action": "sqs:SendMessage",
            "Resource": queue_arn,
            "Condition": { "ArnLike": { "aws:SourceArn": bucket_arn } }
        }]
    })
    .to_string()
}

/// Prefix filter value of a route, if it has one.
fn route_prefix(config: &QueueConfiguration) -> Option<&str> {
    config
        .filter()
        .and_then(|f| f.key())
        .and_then(|k| {
            k.filter_rules()
                .iter()
                .find(|rule| rule.name() == Some(&FilterRuleName::Prefix))
        })
        .and_then(|rule| rule.value())
}

/// Whether `config` already delivers object-created events under `prefix`
/// to `queue_arn`.
pub fn routes_to(config: &QueueConfiguration, queue_arn: &str, prefix: &str) -> bool {
    let creates: bool = config
        .events()
        .iter()
        .any(|e| e.as_str().starts_with("s3:ObjectCreated:"));
    let expected: Option<&str> = if prefix.is_empty() { None } else { Some(prefix) };

    config.queue_arn() == queue_arn && creates && route_prefix(config).filter(|p| !p.is_empty()) == expected
}

/// Route for object-created events under `prefix` to `queue_arn`.
pub fn object_created_route(queue_arn: &str, prefix: &str) -> Result<QueueConfiguration, AwsError> {
    let filter: Option<NotificationConfigurationFilter> = if prefix.is_empty() {
        None
    } else {
        let rule: FilterRule = FilterRule::builder()
            .name(FilterRuleName::Prefix)
            .value(prefix)
            .build();
        Some(
            NotificationConfigurationFilter::builder()
                .key(S3KeyFilter::builder().filter_rules(rule).build())
                .build(),
        )
    };

    QueueConfiguration::builder()
        .id(ROUTE_ID)
        .queue_arn(queue_arn)
        .events(Event::from(OBJECT_CREATED))
        .set_filter(filter)
        .build()
        .map_err(|e| AwsError::ConfigError(e.to_string()))
}

/// Creates and wires up queue resources for a bucket.
#[derive(Debug, Clone)]
pub struct Provisioner {
    s3: aws_sdk_s3::Client,
    sqs: aws_sdk_sqs::Client,
}

impl Provisioner {
    /// Build provisioning clients from shared SDK configuration.
    pub fn new(sdk_config: &SdkConfig, settings: &StorageSettings) -> Self {
        Self {
            s3: s3_client(sdk_config, settings),
            sqs: aws_sdk_sqs::Client::new(sdk_config),
        }
    }

    /// Run every provisioning step and return the queue URL.
    pub async fn provision(
        &self,
        location: &S3Location,
        queue_name: &str,
    ) -> Result<String, StorageError> {
        let queue_url: String = self.ensure_queue(queue_name).await?;
        let queue_arn: String = self.queue_arn(&queue_url).await?;
        self.allow_bucket(&queue_url, &queue_arn, location).await?;
        self.route_bucket_events(location, &queue_arn).await?;
        Ok(queue_url)
    }

    /// Look up the queue, creating it when missing.
    pub async fn ensure_queue(&self, queue_name: &str) -> Result<String, StorageError> {
        match self.sqs.get_queue_url().queue_name(queue_name).send().await {
            Ok(output) => {
                if let Some(url) = output.queue_url() {
                    log::info!("Using existing queue {} ({})", queue_name, url);
                    return Ok(url.to_string());
                }
            }
            Err(err) => {
                if !err
                    .as_service_error()
                    .is_some_and(|e| e.is_queue_does_not_exist())
                {
                    return Err(storage_error(queue_name, &err));
                }
            }
        }

        let output = self
            .sqs
            .create_queue()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|err| storage_error(queue_name, &err))?;
        let url: String = output
            .queue_url()
            .map(|u| u.to_string())
            .ok_or_else(|| StorageError::QueueNotFound {
                queue: queue_name.to_string(),
            })?;
        log::info!("Created queue {} ({})", queue_name, url);
        Ok(url)
    }

    /// ARN of the queue at `queue_url`.
    pub async fn queue_arn(&self, queue_url: &str) -> Result<String, StorageError> {
        let output = self
            .sqs
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::QueueArn)
            .send()
            .await
            .map_err(|err| storage_error(queue_url, &err))?;

        output
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::QueueArn))
            .cloned()
            .ok_or_else(|| StorageError::Other {
                message: format!("queue {} has no ARN attribute", queue_url),
            })
    }

    /// Attach the access policy letting the bucket publish to the queue.
    pub async fn allow_bucket(
        &self,
        queue_url: &str,
        queue_arn: &str,
        location: &S3Location,
    ) -> Result<(), StorageError> {
        self.sqs
            .set_queue_attributes()
            .queue_url(queue_url)
            .attributes(
                QueueAttributeName::Policy,
                queue_policy(queue_arn, &location.bucket_arn()),
            )
            .send()
            .await
            .map_err(|err| storage_error(queue_url, &err))?;
        log::info!("Allowed {} to send to {}", location.bucket, queue_arn);
        Ok(())
    }

    /// Add the object-created route to the bucket's notification config.
    pub async fn route_bucket_events(
        &self,
        location: &S3Location,
        queue_arn: &str,
    ) -> Result<(), StorageError> {
        let resource: String = location.to_string();
        let existing = self
            .s3
            .get_bucket_notification_configuration()
            .bucket(&location.bucket)
            .send()
            .await
            .map_err(|err| storage_error(&resource, &err))?;

        let prefix: String = location.list_prefix();
        if existing
            .queue_configurations()
            .iter()
            .any(|c| routes_to(c, queue_arn, &prefix))
        {
            log::info!("Bucket {} already routes events to {}", location.bucket, queue_arn);
            return Ok(());
        }

        let mut queues: Vec<QueueConfiguration> = existing.queue_configurations().to_vec();
        queues.push(object_created_route(queue_arn, &prefix)?);

        let config: NotificationConfiguration = NotificationConfiguration::builder()
            .set_queue_configurations(Some(queues))
            .set_topic_configurations(Some(existing.topic_configurations().to_vec()))
            .set_lambda_function_configurations(Some(
                existing.lambda_function_configurations().to_vec(),
            ))
            .set_event_bridge_configuration(existing.event_bridge_configuration().cloned())
            .build();

        self.s3
            .put_bucket_notification_configuration()
            .bucket(&location.bucket)
            .notification_configuration(config)
            .send()
            .await
            .map_err(|err| storage_error(&resource, &err))?;
        log::info!("Routed {} object-created events to {}", location, queue_arn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUEUE_ARN: &str = "arn:aws:sqs:us-east-1:123456789012:watch-queue";

    #[test]
    fn test_queue_policy_names_bucket_and_queue() {
        let policy: serde_json::Value =
            serde_json::from_str(&queue_policy(QUEUE_ARN, "arn:aws:s3:::data")).unwrap();
        let statement = &policy["Statement"][0];
        assert_eq!(statement["Resource"], QUEUE_ARN);
        assert_eq!(statement["Principal"]["Service"], "s3.amazonaws.com");
        assert_eq!(statement["Condition"]["ArnLike"]["aws:SourceArn"], "arn:aws:s3:::data");
    }

    #[test]
    fn test_route_with_prefix_matches_itself() {
        let route = object_created_route(QUEUE_ARN, "level0/").unwrap();
        assert_eq!(route.id(), Some(ROUTE_ID));
        assert!(routes_to(&route, QUEUE_ARN, "level0/"));
        assert!(!routes_to(&route, QUEUE_ARN, ""));
        assert!(!routes_to(&route, QUEUE_ARN, "level1/"));
        assert!(!routes_to(&route, "arn:aws:sqs:us-east-1:123456789012:other", "level0/"));
    }

    #[test]
    fn test_route_without_prefix_has_no_filter() {
        let route = object_created_route(QUEUE_ARN, "").unwrap();
        assert!(route.filter().is_none());
        assert!(routes_to(&route, QUEUE_ARN, ""));
    }

    #[test]
    fn test_removal_route_does_not_count() {
        let route = QueueConfiguration::builder()
            .queue_arn(QUEUE_ARN)
            .events(Event::from("s3:ObjectRemoved:*"))
            .build()
            .unwrap();
        assert!(!routes_to(&route, QUEUE_ARN, ""));
    }
}
