//! Shardline - background download orchestration for sharded model files
//!
//! This library manages grouped, multi-file downloads of large model
//! artifacts: split-file expansion, preflight size probing, low-storage
//! advisories, concurrency-bounded transfers, persisted progress,
//! pause/resume/cancel/retry, throttled notifications and recovery of
//! transfers that outlived the previous process.
//!
//! The entry point is [`manager::DownloadGroupManager`], constructed once per
//! process with its collaborators and shared by handle.

use std::future::Future;
use std::pin::Pin;

pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod notify;
pub mod probe;
pub mod progress;
pub mod scheduler;
pub mod source;
pub mod split;
pub mod state;
pub mod storage;
pub mod store;
pub mod transfer;

pub use error::{DownloadError, DownloadResult};
pub use manager::{Collaborators, DownloadGroupManager, EnqueueRequest, FileRequest};
pub use progress::{FileProgress, GroupProgress, Subscription};
pub use state::{DownloadFileState, DownloadGroupState, DownloadStatus};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Boxed future used by the dyn-compatible async traits in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
