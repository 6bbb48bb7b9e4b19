//! Tracing setup for the daemon.
//!
//! Console logging is always on; the optional disk sink writes daily
//! rolling files and prunes anything older than the configured retention
//! window at startup.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("invalid log filter {0:?}")]
    InvalidFilter(String),
    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Rolling disk sink settings (`log.disk.*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskLogConfig {
    pub path: PathBuf,
    pub name: String,
    pub total_days_preserved: u32,
}

/// Top-level logging settings (`log.*`).
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG` when set.
    pub level: String,
    pub disk: Option<DiskLogConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            disk: None,
        }
    }
}

/// Install the global subscriber.
///
/// Returns the appender guard when a disk sink is active; the caller
/// must keep it alive for the process lifetime or buffered lines are
/// lost on shutdown.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(&config.level)
            .map_err(|_| LoggingError::InvalidFilter(config.level.clone()))
    })?;
    let console = fmt::layer().with_target(false);

    match &config.disk {
        Some(disk) => {
            prune_old_logs(disk);
            let appender = tracing_appender::rolling::daily(&disk.path, &disk.name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_writer(writer).with_ansi(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .try_init()
                .map_err(|err| LoggingError::Init(err.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()
                .map_err(|err| LoggingError::Init(err.to_string()))?;
            Ok(None)
        }
    }
}

/// Delete rotated files that have aged past the retention window.
/// A retention of zero days disables pruning.
fn prune_old_logs(disk: &DiskLogConfig) {
    if disk.total_days_preserved == 0 {
        return;
    }
    let cutoff = SystemTime::now() - Duration::from_secs(u64::from(disk.total_days_preserved) * 86_400);
    let entries = match fs::read_dir(&disk.path) {
        Ok(entries) => entries,
        // directory appears on first write; nothing to prune yet.
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let modified = entry.metadata().and_then(|meta| meta.modified());
        let Ok(modified) = modified else { continue };
        if should_prune(name, &disk.name, modified, cutoff) {
            if let Err(err) = fs::remove_file(entry.path()) {
                warn!("failed to prune old log file {:?}: {}", entry.path(), err);
            }
        }
    }
}

fn should_prune(file_name: &str, prefix: &str, modified: SystemTime, cutoff: SystemTime) -> bool {
    file_name.starts_with(prefix) && modified < cutoff
}
