//! Error types for download orchestration.
//!
//! Only store failures and argument validation surface as `Err` to callers.
//! Per-file transfer and integrity failures are recorded on the file state
//! and delivered through the normal progress channel instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while orchestrating group downloads.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A caller-supplied argument was rejected before any I/O happened.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The group state store failed to read or write a record.
    #[error("group store error for '{key}': {reason}")]
    Store { key: String, reason: String },

    /// A filesystem operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    /// A persisted record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP client could not be constructed or a request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DownloadError {
    /// Build an `InvalidArgument` error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Build a `Store` error for the given record key.
    pub fn store(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Store {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an `Io` error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}
