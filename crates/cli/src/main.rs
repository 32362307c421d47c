//! s3watcher: mirror newly created S3 objects into a local directory.

mod cli;
mod error;
mod slack;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use s3watcher_storage::{AuditSink, NotificationSink, SessionManager};
use s3watcher_storage_aws::{load_sdk_config, Provisioner, SdkSessionFactory, TimestreamAuditSink};
use s3watcher_watcher::{Sinks, Watcher, WatcherHandle};
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Settings};
use crate::error::CliError;
use crate::slack::SlackNotifier;

/// Filter used when `RUST_LOG` is unset. AWS SDK crates stay at `warn`.
const DEFAULT_LOG_FILTER: &str = "warn,s3watcher=info";

fn init_logging() {
    let filter: EnvFilter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let settings: Settings = args.into_settings()?;
    let location = settings.watcher.location.clone();

    if settings.setup {
        let sdk_config = load_sdk_config(&settings.storage).await;
        let queue_url: String = Provisioner::new(&sdk_config, &settings.storage)
            .provision(&location, &settings.watcher.queue_name)
            .await?;
        tracing::info!("Provisioned queue {} for {}", queue_url, location);
    }

    let factory = Arc::new(SdkSessionFactory::new(
        settings.storage.clone(),
        location.bucket.clone(),
    ));
    let sessions = Arc::new(SessionManager::new(factory, settings.session_refresh).await?);

    let sinks: Sinks = build_sinks(&settings).await?;
    let handle: WatcherHandle = Watcher::new(settings.watcher, sessions)
        .with_sinks(sinks)
        .start()
        .await?;

    handle.run_until(shutdown_signal()).await?;
    Ok(())
}

async fn build_sinks(settings: &Settings) -> Result<Sinks, CliError> {
    let mut sinks = Sinks::default();

    if let Some(slack) = &settings.slack {
        let notifier = SlackNotifier::new(&slack.token, &slack.channel)?;
        tracing::info!("Slack notifications enabled for {}", notifier.channel());
        sinks.notifier = Some(Arc::new(notifier) as Arc<dyn NotificationSink>);
    }

    if let Some(audit) = &settings.audit {
        let sdk_config = load_sdk_config(&settings.storage).await;
        match TimestreamAuditSink::connect(&sdk_config, &audit.database, &audit.table).await {
            Ok(sink) => {
                tracing::info!("Audit records go to {}/{}", audit.database, audit.table);
                sinks.audit = Some(Arc::new(sink) as Arc<dyn AuditSink>);
            }
            Err(e) => tracing::warn!("Audit logging disabled: {}", e),
        }
    }

    Ok(sinks)
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
