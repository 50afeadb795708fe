//! In-memory group store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::error::{DownloadError, DownloadResult};
use crate::state::DownloadGroupState;
use crate::store::{record_key, GroupStateStore, DEFAULT_NAMESPACE};
use crate::BoxFuture;

/// Group store backed by a concurrent map.
///
/// Useful for tests and for hosts that persist state elsewhere. Writes can
/// be made to fail on demand to exercise error propagation.
#[derive(Debug, Default)]
pub struct MemoryGroupStore {
    groups: DashMap<String, DownloadGroupState>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryGroupStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent upserts fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful upserts so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Insert a record directly, bypassing failure injection.
    pub fn seed(&self, group: DownloadGroupState) {
        self.groups.insert(group.id.clone(), group);
    }
}

impl GroupStateStore for MemoryGroupStore {
    fn upsert<'a>(&'a self, group: &'a DownloadGroupState) -> BoxFuture<'a, DownloadResult<()>> {
        Box::pin(async move {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(DownloadError::store(
                    record_key(DEFAULT_NAMESPACE, &group.id),
                    "writes disabled",
                ));
            }
            self.groups.insert(group.id.clone(), group.clone());
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn load<'a>(
        &'a self,
        group_id: &'a str,
    ) -> BoxFuture<'a, DownloadResult<Option<DownloadGroupState>>> {
        Box::pin(async move { Ok(self.groups.get(group_id).map(|g| g.clone())) })
    }

    fn load_all(&self) -> BoxFuture<'_, DownloadResult<Vec<DownloadGroupState>>> {
        Box::pin(async move {
            let mut groups: Vec<_> = self.groups.iter().map(|g| g.value().clone()).collect();
            groups.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(groups)
        })
    }

    fn list_ids(&self) -> BoxFuture<'_, DownloadResult<Vec<String>>> {
        Box::pin(async move {
            let mut ids: Vec<_> = self.groups.iter().map(|g| g.key().clone()).collect();
            ids.sort();
            Ok(ids)
        })
    }

    fn remove<'a>(&'a self, group_id: &'a str) -> BoxFuture<'a, DownloadResult<bool>> {
        Box::pin(async move { Ok(self.groups.remove(group_id).is_some()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DownloadFileState;

    fn group(id: &str) -> DownloadGroupState {
        DownloadGroupState::new(
            id,
            "Model",
            "org/repo",
            false,
            1,
            vec![DownloadFileState::new("a", None, 1)],
        )
    }

    #[tokio::test]
    async fn test_roundtrip_and_ids() {
        let store = MemoryGroupStore::new();
        store.upsert(&group("b")).await.unwrap();
        store.upsert(&group("a")).await.unwrap();

        assert_eq!(store.list_ids().await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.load("a").await.unwrap().unwrap().id, "a");
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryGroupStore::new();
        store.set_fail_writes(true);
        let err = store.upsert(&group("g1")).await.unwrap_err();
        assert!(matches!(err, DownloadError::Store { .. }));
        assert!(store.load("g1").await.unwrap().is_none());

        store.set_fail_writes(false);
        store.upsert(&group("g1")).await.unwrap();
        assert!(store.load("g1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryGroupStore::new();
        store.seed(group("g1"));
        assert!(store.remove("g1").await.unwrap());
        assert!(!store.remove("g1").await.unwrap());
    }
}
