//! Logging bootstrap for the `duet` binary.
//!
//! Everything goes to a daily log file; warnings and errors from the duet
//! crates are additionally forwarded to the REPL as notifications.

use std::path::Path;

use duet_application::{Notification, NotificationLayer};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const LOG_ENV: &str = "DUET_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

/// Installs the global subscriber.
///
/// The returned guard must live until shutdown so buffered lines are written.
pub fn init(logs_dir: &Path) -> anyhow::Result<(WorkerGuard, mpsc::UnboundedReceiver<Notification>)> {
    std::fs::create_dir_all(logs_dir)?;
    let appender = tracing_appender::rolling::daily(logs_dir, "duet.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter);

    let (notifications, receiver) = NotificationLayer::channel();

    tracing_subscriber::registry()
        .with(file_layer)
        .with(notifications)
        .try_init()?;

    Ok((guard, receiver))
}
