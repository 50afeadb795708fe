//! CLI error type.

use std::fmt;

use shardline::DownloadError;

/// Errors reported by CLI commands. Every variant exits with status 1.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded, saved or applied.
    Config(String),
    /// The download library rejected an operation.
    Download(DownloadError),
    /// A group ended in a failed state.
    Failed(String),
    /// No group with the given id exists.
    UnknownGroup(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Download(e) => write!(f, "{}", e),
            CliError::Failed(msg) => write!(f, "Download failed: {}", msg),
            CliError::UnknownGroup(id) => write!(
                f,
                "No download group '{}'. Use 'shardline list' to see known groups.",
                id
            ),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Download(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        match e {
            DownloadError::Config(msg) => CliError::Config(msg),
            other => CliError::Download(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Config(e.to_string())
    }
}
