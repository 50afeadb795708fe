//! Persistence of download group state.
//!
//! The store is the single source of truth across process restarts. Every
//! write is a full snapshot of one group keyed by its id (last writer wins,
//! no field merging). Records live under `<namespace>/<groupId>` and the set
//! of ids can be enumerated without loading the records themselves.
//!
//! # Implementations
//!
//! - `JsonGroupStore` - one JSON document per group on disk
//! - `MemoryGroupStore` - in-process map, for tests and embedding

mod json;
mod memory;

pub use json::JsonGroupStore;
pub use memory::MemoryGroupStore;

use crate::error::DownloadResult;
use crate::state::DownloadGroupState;
use crate::BoxFuture;

/// Default namespace for group records.
pub const DEFAULT_NAMESPACE: &str = "downloads";

/// Build the record key for a group: `<namespace>/<groupId>`.
pub fn record_key(namespace: &str, group_id: &str) -> String {
    format!("{}/{}", namespace, group_id)
}

/// Keyed snapshot storage for `DownloadGroupState` records.
///
/// Upserts to different groups must not interfere with each other. A single
/// upsert is atomic for its group; there are no cross-group transactions.
pub trait GroupStateStore: Send + Sync {
    /// Persist a full snapshot of `group`, replacing any previous record.
    fn upsert<'a>(&'a self, group: &'a DownloadGroupState) -> BoxFuture<'a, DownloadResult<()>>;

    /// Load one group, or `None` if it is unknown.
    fn load<'a>(&'a self, group_id: &'a str)
        -> BoxFuture<'a, DownloadResult<Option<DownloadGroupState>>>;

    /// Load every stored group.
    fn load_all(&self) -> BoxFuture<'_, DownloadResult<Vec<DownloadGroupState>>>;

    /// Enumerate stored group ids without loading the records.
    fn list_ids(&self) -> BoxFuture<'_, DownloadResult<Vec<String>>>;

    /// Delete a group record. Returns whether it existed.
    fn remove<'a>(&'a self, group_id: &'a str) -> BoxFuture<'a, DownloadResult<bool>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key() {
        assert_eq!(record_key("downloads", "g1"), "downloads/g1");
    }
}
