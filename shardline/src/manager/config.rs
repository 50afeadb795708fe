//! Configuration for the download group manager.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigFile;
use crate::notify::DEFAULT_NOTIFICATION_INTERVAL;
use crate::probe::DEFAULT_PROBE_TIMEOUT;
use crate::source::{DEFAULT_BASE_URL, DEFAULT_REVISION};
use crate::store::DEFAULT_NAMESPACE;
use crate::transfer::DEFAULT_CONNECT_TIMEOUT;

/// Runtime configuration of a `DownloadGroupManager` and its default
/// collaborators.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Directory completed files are placed in. Temporary files live beside
    /// them as `<filename>.tmp`.
    pub models_dir: PathBuf,

    /// Concurrency used when an enqueue request does not specify one.
    pub default_concurrency: usize,

    /// Transfer policy hint used when an enqueue request does not specify one.
    pub wifi_only: bool,

    /// Stop in-flight siblings when a file fails, and start no further files.
    pub halt_on_failure: bool,

    /// Minimum spacing between two notification renders of a group.
    pub notification_interval: Duration,

    /// Continue interrupted transfers from their partial offset.
    pub resume_partial: bool,

    /// Base URL of the file host.
    pub base_url: String,

    /// Revision files are resolved against.
    pub revision: String,

    /// Directory group state records are kept in.
    pub state_dir: PathBuf,

    /// Record namespace within the state directory.
    pub namespace: String,

    /// Timeout of a single size probe.
    pub probe_timeout: Duration,

    /// Connect timeout of transfer requests.
    pub connect_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("shardline");
        Self {
            models_dir: base.join("models"),
            default_concurrency: 1,
            wifi_only: false,
            halt_on_failure: false,
            notification_interval: DEFAULT_NOTIFICATION_INTERVAL,
            resume_partial: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            revision: DEFAULT_REVISION.to_string(),
            state_dir: base.join("state"),
            namespace: DEFAULT_NAMESPACE.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ManagerConfig {
    /// Create a configuration placing downloads in `models_dir`.
    pub fn new(models_dir: PathBuf) -> Self {
        Self {
            models_dir,
            ..Default::default()
        }
    }

    /// Build the configuration from the user's configuration file.
    pub fn from_config_file(config: &ConfigFile) -> Self {
        Self {
            models_dir: config.downloads.directory.clone(),
            default_concurrency: config.downloads.concurrency,
            wifi_only: config.downloads.wifi_only,
            halt_on_failure: config.downloads.halt_on_failure,
            notification_interval: Duration::from_millis(config.downloads.notification_interval_ms),
            resume_partial: config.downloads.resume_partial,
            base_url: config.source.base_url.clone(),
            revision: config.source.revision.clone(),
            state_dir: config.storage.state_dir.clone(),
            namespace: config.storage.namespace.clone(),
            probe_timeout: Duration::from_secs(config.network.probe_timeout_secs),
            connect_timeout: Duration::from_secs(config.network.connect_timeout_secs),
        }
    }

    /// Set the default concurrency.
    pub fn with_default_concurrency(mut self, concurrency: usize) -> Self {
        self.default_concurrency = concurrency;
        self
    }

    /// Set the default wifi-only hint.
    pub fn with_wifi_only(mut self, wifi_only: bool) -> Self {
        self.wifi_only = wifi_only;
        self
    }

    /// Enable or disable stopping siblings when a file fails.
    pub fn with_halt_on_failure(mut self, halt: bool) -> Self {
        self.halt_on_failure = halt;
        self
    }

    /// Set the notification throttle interval.
    pub fn with_notification_interval(mut self, interval: Duration) -> Self {
        self.notification_interval = interval;
        self
    }

    /// Enable or disable resuming partial files.
    pub fn with_resume_partial(mut self, resume: bool) -> Self {
        self.resume_partial = resume;
        self
    }

    /// Set the file host base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the state directory.
    pub fn with_state_dir(mut self, path: PathBuf) -> Self {
        self.state_dir = path;
        self
    }

    /// Set the probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}
