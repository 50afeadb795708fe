//! Shared setup for commands that talk to the download manager.

use std::future::Future;
use std::sync::Arc;

use shardline::config::ConfigFile;
use shardline::logging::{init_logging, LoggingConfig, LoggingGuard};
use shardline::manager::{Collaborators, DownloadGroupManager, ManagerConfig};
use shardline::notify::LogNotificationCenter;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// Loaded configuration, logging and the async runtime for one command.
pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Load the config file, install logging and build the runtime.
    ///
    /// Logs go to the rolling file only so they do not fight with the
    /// progress display.
    pub fn new() -> Result<Self, CliError> {
        let config = ConfigFile::load()?;
        let logging = init_logging(&LoggingConfig::from_section(&config.logging).with_stderr(false))?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| CliError::Config(format!("Failed to start async runtime: {}", e)))?;

        Ok(Self {
            config,
            runtime,
            _logging: logging,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log the command being run.
    pub fn log_startup(&self, command: &str) {
        tracing::info!(
            version = shardline::VERSION,
            command,
            models_dir = %self.config.downloads.directory.display(),
            "shardline starting"
        );
    }

    /// Build a manager from the loaded configuration.
    pub fn manager(&self) -> Result<DownloadGroupManager, CliError> {
        let config = ManagerConfig::from_config_file(&self.config);
        let collaborators = Collaborators::from_config(&config, Arc::new(LogNotificationCenter::new()))?;
        Ok(DownloadGroupManager::new(config, collaborators))
    }

    /// Token cancelled on Ctrl+C.
    pub fn interrupt_token(&self) -> Result<CancellationToken, CliError> {
        let token = CancellationToken::new();
        let handler_token = token.clone();
        ctrlc::set_handler(move || handler_token.cancel())
            .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;
        Ok(token)
    }

    /// Run a future to completion on the runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
