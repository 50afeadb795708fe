//! Logging setup.
//!
//! Installs a `tracing` subscriber with two outputs: human-readable lines on
//! stderr and a daily-rolling log file. The filter comes from `RUST_LOG`
//! when set, otherwise from the configured level.

use std::path::PathBuf;

use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSection;
use crate::error::{DownloadError, DownloadResult};

/// Default log file name prefix; the appender adds the date.
pub const DEFAULT_LOG_FILE: &str = "shardline.log";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory the rolling log files are written to.
    pub directory: PathBuf,
    /// File name prefix of the rolling log files.
    pub file_prefix: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Also log to stderr.
    pub stderr: bool,
}

impl LoggingConfig {
    /// Create a configuration logging to `directory` at `level`.
    pub fn new(directory: impl Into<PathBuf>, level: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_prefix: DEFAULT_LOG_FILE.to_string(),
            level: level.into(),
            stderr: true,
        }
    }

    /// Build from the `[logging]` config section.
    pub fn from_section(section: &LoggingSection) -> Self {
        Self::new(section.directory.clone(), section.level.clone())
    }

    /// Enable or disable the stderr output.
    pub fn with_stderr(mut self, stderr: bool) -> Self {
        self.stderr = stderr;
        self
    }

    /// Path prefix of the rolling files.
    pub fn log_path(&self) -> PathBuf {
        self.directory.join(&self.file_prefix)
    }
}

/// Keeps the background log writer alive. Hold it until the process exits.
pub struct LoggingGuard {
    _file: WorkerGuard,
}

/// Install the global subscriber.
///
/// Fails if the log directory cannot be created, the filter is invalid, or
/// a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> DownloadResult<LoggingGuard> {
    std::fs::create_dir_all(&config.directory)
        .map_err(|e| DownloadError::io(&config.directory, e))?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            DownloadError::Config(format!("logging.level: invalid filter '{}': {}", config.level, e))
        })?,
    };

    let appender = tracing_appender::rolling::daily(&config.directory, &config.file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_timer(local_timer());

    let stderr_layer = config.stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_timer(local_timer())
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| DownloadError::Config(format!("logging already initialized: {}", e)))?;

    Ok(LoggingGuard { _file: guard })
}

/// Local-time RFC 3339 timestamps, falling back to UTC when the local
/// offset cannot be determined (e.g. in multi-threaded processes on Unix).
fn local_timer() -> OffsetTime<Rfc3339> {
    OffsetTime::local_rfc_3339().unwrap_or_else(|_| OffsetTime::new(time::UtcOffset::UTC, Rfc3339))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_section() {
        let section = LoggingSection {
            directory: PathBuf::from("/var/log/shardline"),
            level: "debug".to_string(),
        };
        let config = LoggingConfig::from_section(&section);
        assert_eq!(config.level, "debug");
        assert!(config.stderr);
        assert_eq!(
            config.log_path(),
            PathBuf::from("/var/log/shardline/shardline.log")
        );
    }

    #[test]
    fn test_with_stderr() {
        let config = LoggingConfig::new("/tmp", "info").with_stderr(false);
        assert!(!config.stderr);
    }

    #[test]
    fn test_local_timer_does_not_panic() {
        let _ = local_timer();
    }
}
