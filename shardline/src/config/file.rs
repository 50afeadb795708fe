//! INI configuration file.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::{Ini, Properties};

use crate::config::{config_directory, config_file_path, expand_tilde, path_to_display};
use crate::error::{DownloadError, DownloadResult};
use crate::source::{DEFAULT_BASE_URL, DEFAULT_REVISION};
use crate::store::DEFAULT_NAMESPACE;

/// `[downloads]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadsSection {
    /// Directory completed files are placed in.
    pub directory: PathBuf,
    /// Default per-group concurrency.
    pub concurrency: usize,
    /// Default transfer policy hint.
    pub wifi_only: bool,
    /// Stop in-flight siblings when a file of the group fails.
    pub halt_on_failure: bool,
    /// Minimum spacing between two notification renders of a group.
    pub notification_interval_ms: u64,
    /// Continue interrupted transfers from their partial offset.
    pub resume_partial: bool,
}

/// `[source]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSection {
    pub base_url: String,
    pub revision: String,
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSection {
    /// Directory group state records are kept in.
    pub state_dir: PathBuf,
    pub namespace: String,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSection {
    pub directory: PathBuf,
    /// Default filter directive, e.g. `info` or `shardline=debug`.
    pub level: String,
}

/// `[network]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSection {
    pub probe_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub downloads: DownloadsSection,
    pub source: SourceSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
    pub network: NetworkSection,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let base = config_directory();
        Self {
            downloads: DownloadsSection {
                directory: base.join("models"),
                concurrency: 1,
                wifi_only: false,
                halt_on_failure: false,
                notification_interval_ms: 750,
                resume_partial: true,
            },
            source: SourceSection {
                base_url: DEFAULT_BASE_URL.to_string(),
                revision: DEFAULT_REVISION.to_string(),
            },
            storage: StorageSection {
                state_dir: base.join("state"),
                namespace: DEFAULT_NAMESPACE.to_string(),
            },
            logging: LoggingSection {
                directory: base.join("logs"),
                level: "info".to_string(),
            },
            network: NetworkSection {
                probe_timeout_secs: 15,
                connect_timeout_secs: 30,
            },
        }
    }
}

impl ConfigFile {
    /// Load the user's configuration file, or defaults if it does not exist.
    pub fn load() -> DownloadResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load a configuration file, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> DownloadResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)
            .map_err(|e| DownloadError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_ini(&ini)
    }

    /// Parse configuration from INI text.
    pub fn parse(text: &str) -> DownloadResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| DownloadError::Config(e.to_string()))?;
        Self::from_ini(&ini)
    }

    /// Write the configuration to the user's configuration file.
    pub fn save(&self) -> DownloadResult<()> {
        self.save_to(&config_file_path())
    }

    /// Write the configuration to `path`, creating its directory.
    pub fn save_to(&self, path: &Path) -> DownloadResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DownloadError::io(parent, e))?;
        }
        self.to_ini()
            .write_to_file(path)
            .map_err(|e| DownloadError::io(path, e))
    }

    fn from_ini(ini: &Ini) -> DownloadResult<Self> {
        let defaults = Self::default();
        let reader = SectionReader { ini };

        let config = Self {
            downloads: DownloadsSection {
                directory: reader.path("downloads", "directory", defaults.downloads.directory),
                concurrency: reader.parsed(
                    "downloads",
                    "concurrency",
                    defaults.downloads.concurrency,
                )?,
                wifi_only: reader.parsed("downloads", "wifi_only", defaults.downloads.wifi_only)?,
                halt_on_failure: reader.parsed(
                    "downloads",
                    "halt_on_failure",
                    defaults.downloads.halt_on_failure,
                )?,
                notification_interval_ms: reader.parsed(
                    "downloads",
                    "notification_interval_ms",
                    defaults.downloads.notification_interval_ms,
                )?,
                resume_partial: reader.parsed(
                    "downloads",
                    "resume_partial",
                    defaults.downloads.resume_partial,
                )?,
            },
            source: SourceSection {
                base_url: reader.string("source", "base_url", defaults.source.base_url),
                revision: reader.string("source", "revision", defaults.source.revision),
            },
            storage: StorageSection {
                state_dir: reader.path("storage", "state_dir", defaults.storage.state_dir),
                namespace: reader.string("storage", "namespace", defaults.storage.namespace),
            },
            logging: LoggingSection {
                directory: reader.path("logging", "directory", defaults.logging.directory),
                level: reader.string("logging", "level", defaults.logging.level),
            },
            network: NetworkSection {
                probe_timeout_secs: reader.parsed(
                    "network",
                    "probe_timeout_secs",
                    defaults.network.probe_timeout_secs,
                )?,
                connect_timeout_secs: reader.parsed(
                    "network",
                    "connect_timeout_secs",
                    defaults.network.connect_timeout_secs,
                )?,
            },
        };

        if config.downloads.concurrency == 0 {
            return Err(DownloadError::Config(
                "downloads.concurrency: must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("downloads"))
            .set("directory", path_to_display(&self.downloads.directory))
            .set("concurrency", self.downloads.concurrency.to_string())
            .set("wifi_only", self.downloads.wifi_only.to_string())
            .set("halt_on_failure", self.downloads.halt_on_failure.to_string())
            .set(
                "notification_interval_ms",
                self.downloads.notification_interval_ms.to_string(),
            )
            .set("resume_partial", self.downloads.resume_partial.to_string());
        ini.with_section(Some("source"))
            .set("base_url", self.source.base_url.as_str())
            .set("revision", self.source.revision.as_str());
        ini.with_section(Some("storage"))
            .set("state_dir", path_to_display(&self.storage.state_dir))
            .set("namespace", self.storage.namespace.as_str());
        ini.with_section(Some("logging"))
            .set("directory", path_to_display(&self.logging.directory))
            .set("level", self.logging.level.as_str());
        ini.with_section(Some("network"))
            .set(
                "probe_timeout_secs",
                self.network.probe_timeout_secs.to_string(),
            )
            .set(
                "connect_timeout_secs",
                self.network.connect_timeout_secs.to_string(),
            );
        ini
    }
}

struct SectionReader<'a> {
    ini: &'a Ini,
}

impl SectionReader<'_> {
    fn raw(&self, section: &str, key: &str) -> Option<&str> {
        self.ini
            .section(Some(section))
            .and_then(|props: &Properties| props.get(key))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn string(&self, section: &str, key: &str, default: String) -> String {
        self.raw(section, key).map(str::to_string).unwrap_or(default)
    }

    fn path(&self, section: &str, key: &str, default: PathBuf) -> PathBuf {
        self.raw(section, key).map(expand_tilde).unwrap_or(default)
    }

    fn parsed<T: FromStr>(&self, section: &str, key: &str, default: T) -> DownloadResult<T> {
        match self.raw(section, key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| {
                DownloadError::Config(format!("{}.{}: invalid value '{}'", section, key, value))
            }),
        }
    }
}
