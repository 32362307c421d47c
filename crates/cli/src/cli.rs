//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use s3watcher_common::{
    DEFAULT_AUDIT_DATABASE, DEFAULT_AUDIT_TABLE, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_HISTORY_LIMIT,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SESSION_REFRESH_MINS, DEFAULT_VISIBILITY_TIMEOUT_SECS,
};
use s3watcher_filesystem::Ownership;
use s3watcher_storage::{ReceiveSettings, S3Location, StorageSettings};
use s3watcher_watcher::WatcherConfig;

use crate::error::CliError;

/// Longest visibility lease the queue accepts (seconds).
const MAX_VISIBILITY_TIMEOUT_SECS: i32 = 43_200;

/// Mirror newly created S3 objects into a local directory.
///
/// Every option can also be given through the environment variable shown;
/// command-line values win.
#[derive(Parser, Debug, Clone)]
#[command(name = "s3watcher", version, about)]
pub struct Args {
    /// Local directory objects are mirrored into
    #[arg(short = 'd', long, env = "SDC_AWS_WATCH_PATH")]
    pub directory: Option<PathBuf>,

    /// Bucket to watch, optionally with a sub-prefix (bucket/prefix)
    #[arg(short = 'b', long, env = "SDC_AWS_S3_BUCKET")]
    pub bucket_name: Option<String>,

    /// Queue receiving the bucket's notifications
    #[arg(short = 'q', long, env = "SDC_AWS_SQS_QUEUE_NAME")]
    pub queue_name: Option<String>,

    /// Named AWS credential profile
    #[arg(short = 'p', long, env = "SDC_AWS_PROFILE")]
    pub profile: Option<String>,

    /// AWS region
    #[arg(short = 'r', long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Custom AWS endpoint (LocalStack and similar)
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Maximum concurrent downloads
    #[arg(short = 'c', long, env = "SDC_AWS_CONCURRENCY_LIMIT", default_value_t = DEFAULT_CONCURRENCY_LIMIT)]
    pub concurrency_limit: usize,

    /// Accept removal notifications (local files are never deleted)
    #[arg(short = 'a', long, env = "SDC_AWS_ALLOW_DELETE")]
    pub allow_delete: bool,

    /// Message ids remembered to suppress redeliveries
    #[arg(long, env = "SDC_AWS_HISTORY_LIMIT", default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,

    /// Seconds between queue polls
    #[arg(long, env = "SDC_AWS_POLL_INTERVAL", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,

    /// Visibility lease for received messages, in seconds
    #[arg(long, env = "SDC_AWS_VISIBILITY_TIMEOUT", default_value_t = DEFAULT_VISIBILITY_TIMEOUT_SECS)]
    pub visibility_timeout_secs: i32,

    /// Minutes after which AWS clients are rebuilt
    #[arg(long, env = "SDC_AWS_SESSION_REFRESH", default_value_t = DEFAULT_SESSION_REFRESH_MINS)]
    pub session_refresh_mins: u64,

    /// Slack bot token for transfer notifications
    #[arg(long, env = "SDC_AWS_SLACK_TOKEN", hide_env_values = true)]
    pub slack_token: Option<String>,

    /// Slack channel for transfer notifications
    #[arg(long, env = "SDC_AWS_SLACK_CHANNEL")]
    pub slack_channel: Option<String>,

    /// Timestream database for audit records
    #[arg(long, env = "SDC_AWS_TIMESTREAM_DB")]
    pub timestream_db: Option<String>,

    /// Timestream table for audit records
    #[arg(long, env = "SDC_AWS_TIMESTREAM_TABLE")]
    pub timestream_table: Option<String>,

    /// Owner of downloaded files as user:group (names or ids)
    #[arg(long, env = "SDC_AWS_FILE_OWNER")]
    pub owner: Option<String>,

    /// Download objects missing locally before processing notifications
    #[arg(long, env = "SDC_AWS_BACKTRACK")]
    pub backtrack: bool,

    /// Create the queue and bucket notification routing before starting
    #[arg(long)]
    pub setup: bool,
}

/// Slack delivery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackSettings {
    pub token: String,
    pub channel: String,
}

/// Timestream destination for audit records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSettings {
    pub database: String,
    pub table: String,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub watcher: WatcherConfig,
    pub storage: StorageSettings,
    pub session_refresh: Duration,
    pub slack: Option<SlackSettings>,
    pub audit: Option<AuditSettings>,
    pub setup: bool,
}

fn required(value: Option<String>, flag: &str, env: &str) -> Result<String, CliError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CliError::config(format!("{} (or {}) is required", flag, env)))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Args {
    /// Validate and convert into typed settings.
    pub fn into_settings(self) -> Result<Settings, CliError> {
        let root: PathBuf = self
            .directory
            .filter(|d| !d.as_os_str().is_empty())
            .ok_or_else(|| CliError::config("--directory (or SDC_AWS_WATCH_PATH) is required"))?;
        let bucket: String = required(self.bucket_name, "--bucket-name", "SDC_AWS_S3_BUCKET")?;
        let location: S3Location = S3Location::parse(&bucket)?;
        let queue_name: String =
            required(self.queue_name, "--queue-name", "SDC_AWS_SQS_QUEUE_NAME")?;

        if self.concurrency_limit == 0 {
            return Err(CliError::config("--concurrency-limit must be at least 1"));
        }
        if self.history_limit == 0 {
            return Err(CliError::config("--history-limit must be at least 1"));
        }
        if self.poll_interval_secs == 0 {
            return Err(CliError::config("--poll-interval-secs must be at least 1"));
        }
        if self.session_refresh_mins == 0 {
            return Err(CliError::config("--session-refresh-mins must be at least 1"));
        }
        if !(0..=MAX_VISIBILITY_TIMEOUT_SECS).contains(&self.visibility_timeout_secs) {
            return Err(CliError::config(format!(
                "--visibility-timeout-secs must be between 0 and {}",
                MAX_VISIBILITY_TIMEOUT_SECS
            )));
        }

        let slack: Option<SlackSettings> =
            match (non_blank(self.slack_token), non_blank(self.slack_channel)) {
                (Some(token), Some(channel)) => Some(SlackSettings { token, channel }),
                (None, None) => None,
                _ => {
                    return Err(CliError::config(
                        "--slack-token and --slack-channel must be given together",
                    ))
                }
            };

        let audit: Option<AuditSettings> =
            match (non_blank(self.timestream_db), non_blank(self.timestream_table)) {
                (None, None) => None,
                (database, table) => Some(AuditSettings {
                    database: database.unwrap_or_else(|| DEFAULT_AUDIT_DATABASE.to_string()),
                    table: table.unwrap_or_else(|| DEFAULT_AUDIT_TABLE.to_string()),
                }),
            };

        let owner: Option<Ownership> = non_blank(self.owner)
            .map(|spec| Ownership::parse(&spec))
            .transpose()?;

        let mut watcher: WatcherConfig = WatcherConfig::new(root, location, queue_name);
        watcher.history_limit = self.history_limit;
        watcher.poll_interval = Duration::from_secs(self.poll_interval_secs);
        watcher.receive =
            ReceiveSettings::default().with_visibility_timeout(self.visibility_timeout_secs);
        watcher.allow_delete = self.allow_delete;
        watcher.reconcile = self.backtrack;
        watcher.owner = owner;

        let storage = StorageSettings {
            region: non_blank(self.region),
            profile: non_blank(self.profile),
            endpoint_url: non_blank(self.endpoint_url),
            concurrency_limit: self.concurrency_limit,
        };

        Ok(Settings {
            watcher,
            storage,
            session_refresh: Duration::from_secs(self.session_refresh_mins.saturating_mul(60)),
            slack,
            audit,
            setup: self.setup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Settings, CliError> {
        let mut argv: Vec<&str> = vec![
            "s3watcher",
            "--directory",
            "/data/mirror",
            "--bucket-name",
            "science-bucket/level0/raw",
            "--queue-name",
            "science-queue",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap().into_settings()
    }

    #[test]
    fn test_defaults() {
        let settings: Settings = parse(&[]).unwrap();
        assert_eq!(settings.watcher.root, PathBuf::from("/data/mirror"));
        assert_eq!(settings.watcher.location.bucket, "science-bucket");
        assert_eq!(settings.watcher.location.prefix, "level0/raw");
        assert_eq!(settings.watcher.queue_name, "science-queue");
        assert_eq!(settings.watcher.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(settings.watcher.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.watcher.receive.visibility_timeout, 5);
        assert_eq!(settings.storage.concurrency_limit, 20);
        assert_eq!(settings.session_refresh, Duration::from_secs(15 * 60));
        assert!(!settings.watcher.reconcile);
        assert!(settings.slack.is_none());
        assert!(settings.audit.is_none());
        assert!(!settings.setup);
    }

    #[test]
    fn test_huge_session_refresh_saturates() {
        let max: String = u64::MAX.to_string();
        let settings: Settings = parse(&["--session-refresh-mins", &max]).unwrap();
        assert_eq!(settings.session_refresh, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_flags_are_applied() {
        let settings: Settings = parse(&[
            "--concurrency-limit",
            "4",
            "--history-limit",
            "10",
            "--backtrack",
            "--allow-delete",
            "--setup",
            "--owner",
            "0:0",
            "--session-refresh-mins",
            "5",
        ])
        .unwrap();
        assert_eq!(settings.storage.concurrency_limit, 4);
        assert_eq!(settings.watcher.history_limit, 10);
        assert!(settings.watcher.reconcile);
        assert!(settings.watcher.allow_delete);
        assert!(settings.setup);
        assert_eq!(settings.watcher.owner, Some(Ownership { uid: 0, gid: 0 }));
        assert_eq!(settings.session_refresh, Duration::from_secs(300));
    }

    #[test]
    fn test_slack_requires_token_and_channel() {
        let err = parse(&["--slack-token", "xoxb-1"]).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));

        let settings = parse(&["--slack-token", "xoxb-1", "--slack-channel", "#ops"]).unwrap();
        assert_eq!(
            settings.slack,
            Some(SlackSettings {
                token: "xoxb-1".into(),
                channel: "#ops".into()
            })
        );
    }

    #[test]
    fn test_audit_fills_default_names() {
        let settings = parse(&["--timestream-db", "logs"]).unwrap();
        assert_eq!(
            settings.audit,
            Some(AuditSettings {
                database: "logs".into(),
                table: DEFAULT_AUDIT_TABLE.into()
            })
        );
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for extra in [
            &["--concurrency-limit", "0"][..],
            &["--poll-interval-secs", "0"][..],
            &["--visibility-timeout-secs", "50000"][..],
            &["--owner", "nobody"][..],
        ] {
            let err = parse(extra).unwrap_err();
            assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG, "{:?}", extra);
        }
    }

    #[test]
    fn test_missing_bucket_is_reported() {
        let err = Args::try_parse_from(["s3watcher", "--directory", "/d", "--queue-name", "q"])
            .unwrap()
            .into_settings()
            .unwrap_err();
        assert!(err.to_string().contains("--bucket-name"));
    }
}
