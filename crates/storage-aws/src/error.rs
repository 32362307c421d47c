//! Error types for AWS SDK operations.

use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use s3watcher_storage::StorageError;
use thiserror::Error;

/// Error codes that mean the credentials are not allowed to do this.
const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "InvalidAccessKeyId",
    "InvalidClientTokenId",
    "ExpiredToken",
    "SignatureDoesNotMatch",
];

/// Errors specific to the AWS SDK backend.
#[derive(Error, Debug)]
pub enum AwsError {
    /// AWS SDK error.
    #[error("AWS SDK error: {message}")]
    SdkError { message: String, retryable: bool },

    /// The request was rejected for the current credentials.
    #[error("Access denied to {resource}: {message}")]
    AccessDenied { resource: String, message: String },

    /// A request could not be assembled.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AwsError {
    /// Classify an SDK failure for `resource`.
    ///
    /// Transport-level failures (timeouts, dispatch, unparseable responses) are
    /// retryable; rejected credentials are reported as access denied.
    pub fn from_sdk<E, R>(resource: &str, err: &SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        let message: String = error_chain(err);
        match err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
                AwsError::SdkError {
                    message,
                    retryable: true,
                }
            }
            SdkError::ConstructionFailure(_) => AwsError::ConfigError(message),
            _ => match err.code() {
                Some(code) if ACCESS_DENIED_CODES.contains(&code) => AwsError::AccessDenied {
                    resource: resource.to_string(),
                    message,
                },
                _ => AwsError::SdkError {
                    message,
                    retryable: true,
                },
            },
        }
    }
}

/// Render an error and all of its sources on one line.
///
/// SDK errors display only their category ("service error"); the useful
/// detail lives in the source chain.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message: String = err.to_string();
    let mut source: Option<&dyn std::error::Error> = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl From<AwsError> for StorageError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::SdkError { message, retryable } => {
                StorageError::NetworkError { message, retryable }
            }
            AwsError::AccessDenied { resource, message } => {
                StorageError::AccessDenied { resource, message }
            }
            AwsError::ConfigError(message) => StorageError::InvalidConfig { message },
            AwsError::IoError(e) => StorageError::IoError {
                path: String::new(),
                message: e.to_string(),
            },
        }
    }
}

/// Shorthand for classifying an SDK failure straight into a `StorageError`.
pub(crate) fn storage_error<E, R>(resource: &str, err: &SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    AwsError::from_sdk(resource, err).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_maps_to_storage_error() {
        let err: StorageError = AwsError::AccessDenied {
            resource: "s3://bucket".into(),
            message: "denied".into(),
        }
        .into();
        assert!(matches!(err, StorageError::AccessDenied { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let outer = AwsError::IoError(inner);
        assert_eq!(error_chain(&outer), "I/O error: reset by peer: reset by peer");
    }

    #[test]
    fn test_sdk_error_keeps_retryable_flag() {
        let err: StorageError = AwsError::SdkError {
            message: "throttled".into(),
            retryable: true,
        }
        .into();
        assert!(err.is_retryable());
    }
}
