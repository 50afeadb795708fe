//! User configuration.
//!
//! Settings live in an INI file at `~/.shardline/config.ini`. Every key is
//! optional; missing keys take their defaults and an absent file behaves
//! like an empty one.
//!
//! ```ini
//! [downloads]
//! directory = ~/.shardline/models
//! concurrency = 1
//! wifi_only = false
//! halt_on_failure = false
//! notification_interval_ms = 750
//! resume_partial = true
//!
//! [source]
//! base_url = https://huggingface.co
//! revision = main
//!
//! [storage]
//! state_dir = ~/.shardline/state
//! namespace = downloads
//!
//! [logging]
//! directory = ~/.shardline/logs
//! level = info
//!
//! [network]
//! probe_timeout_secs = 15
//! connect_timeout_secs = 30
//! ```

mod file;

pub use file::{
    ConfigFile, DownloadsSection, LoggingSection, NetworkSection, SourceSection, StorageSection,
};

use std::path::{Path, PathBuf};

/// Name of the per-user configuration directory.
const CONFIG_DIR_NAME: &str = ".shardline";

/// Name of the configuration file.
const CONFIG_FILE_NAME: &str = "config.ini";

/// Directory holding configuration, state and logs: `~/.shardline`.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Location of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Render a path for the config file, abbreviating the home directory.
pub fn path_to_display(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            return format!("~/{}", rest.display());
        }
    }
    path.display().to_string()
}
