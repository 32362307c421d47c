//! Top-level errors and their exit codes.

use s3watcher_filesystem::FileSystemError;
use s3watcher_storage::StorageError;
use s3watcher_watcher::WatcherError;
use thiserror::Error;

/// Exit code for bad or missing settings.
pub const EXIT_CONFIG: u8 = 2;
/// Exit code for provisioning and connectivity failures.
pub const EXIT_STARTUP: u8 = 1;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CliError {
    pub fn config(message: impl Into<String>) -> Self {
        CliError::Config {
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config { .. } => EXIT_CONFIG,
            CliError::Watcher(e) if e.is_config() => EXIT_CONFIG,
            CliError::Storage(StorageError::InvalidConfig { .. }) => EXIT_CONFIG,
            _ => EXIT_STARTUP,
        }
    }
}

impl From<FileSystemError> for CliError {
    fn from(err: FileSystemError) -> Self {
        CliError::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::config("missing bucket").exit_code(), EXIT_CONFIG);
        assert_eq!(
            CliError::from(WatcherError::Provisioning {
                message: "no queue".into()
            })
            .exit_code(),
            EXIT_STARTUP
        );
        assert_eq!(
            CliError::from(StorageError::network("unreachable")).exit_code(),
            EXIT_STARTUP
        );
        assert_eq!(
            CliError::from(FileSystemError::InvalidOwnership {
                spec: "x".into()
            })
            .exit_code(),
            EXIT_CONFIG
        );
    }
}
