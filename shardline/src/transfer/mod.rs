//! Transfer substrate.
//!
//! A transfer backend moves the bytes of one physical file to a temporary
//! path and reports its lifecycle as a stream of [`TransferEvent`]s. Both a
//! freshly started transfer and one recovered after a process restart are
//! exposed as the same [`TransferHandle`], so the manager consumes them
//! through a single code path.
//!
//! Event order per task is `Begin`, any number of `Progress`, then exactly
//! one terminal `Done` or `Error`. A stopped task emits nothing further.
//!
//! # Implementations
//!
//! - `HttpTransferBackend` - async HTTP with range-based resume
//! - `ManualTransferBackend` - events driven by the caller, for tests

mod http;
mod manual;

pub use http::{HttpTransferBackend, DEFAULT_CONNECT_TIMEOUT};
pub use manual::{ControlCall, ManualTransferBackend};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::state::DownloadGroupState;
use crate::BoxFuture;

/// Prefix of every task identifier issued by the manager.
pub const TASK_ID_PREFIX: &str = "bgdl-";

/// Lifecycle event reported by a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// The transfer connected; `expected_bytes` is the authoritative size
    /// (`0` when the server did not say).
    Begin { expected_bytes: u64 },
    /// Cumulative bytes written to the temporary file.
    Progress { written: u64, total: u64 },
    /// All bytes were written to the temporary file.
    Done,
    /// The transfer failed.
    Error { message: String },
}

impl TransferEvent {
    /// Whether this event ends the task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferEvent::Done | TransferEvent::Error { .. })
    }
}

/// Advisory policy hints forwarded to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Only transfer over unmetered networks, where the backend can tell.
    pub wifi_only: bool,
}

/// Everything a backend needs to start one file transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub task_id: String,
    pub url: String,
    /// Temporary path the bytes are written to.
    pub destination: PathBuf,
    pub policy: TransferPolicy,
}

/// Control surface of a live transfer.
pub trait TransferControl: Send + Sync {
    /// Suspend the transfer in place.
    fn pause(&self);

    /// Continue a paused transfer.
    fn resume(&self);

    /// Abort the transfer. No further events are emitted.
    fn stop(&self);
}

/// A live transfer: its id, its controls and its event stream.
pub struct TransferHandle {
    pub task_id: String,
    pub control: Arc<dyn TransferControl>,
    pub events: mpsc::UnboundedReceiver<TransferEvent>,
}

impl fmt::Debug for TransferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferHandle")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

/// Starts and recovers file transfers.
pub trait TransferBackend: Send + Sync {
    /// Start a transfer. Must be called from within a Tokio runtime.
    ///
    /// Starting a task id that is already live replaces the old task.
    fn start(&self, request: TransferRequest) -> TransferHandle;

    /// Hand back live transfers that no longer have an event consumer.
    ///
    /// A task already attached to a consumer is never returned, so calling
    /// this repeatedly does not attach a task twice.
    fn recover(&self) -> BoxFuture<'_, Vec<TransferHandle>>;

    /// Whether an interrupted transfer continues from its partial offset.
    fn supports_resume(&self) -> bool;
}

/// Build the task identifier for a file of a group.
pub fn task_id(group_id: &str, filename: &str) -> String {
    format!("{}{}-{}", TASK_ID_PREFIX, group_id, filename)
}

/// Resolve a task identifier to `(group_id, filename)`.
///
/// Group ids and filenames may both contain `-`, so the id is matched
/// against the known groups: the longest group id followed by `-` and a
/// filename present in that group's file map wins.
pub fn resolve_task_id<'a>(
    task_id: &str,
    groups: impl IntoIterator<Item = &'a DownloadGroupState>,
) -> Option<(String, String)> {
    let rest = task_id.strip_prefix(TASK_ID_PREFIX)?;

    groups
        .into_iter()
        .filter_map(|group| {
            let filename = rest.strip_prefix(group.id.as_str())?.strip_prefix('-')?;
            group
                .files
                .contains_key(filename)
                .then(|| (group.id.clone(), filename.to_string()))
        })
        .max_by_key(|(group_id, _)| group_id.len())
}
