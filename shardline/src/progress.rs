//! Progress aggregation and fan-out.
//!
//! Every state change of a group is rolled up into a [`GroupProgress`]
//! snapshot and delivered to the callbacks subscribed to that group.
//! Callbacks run synchronously on the updating task and must not block.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;

use crate::state::{DownloadGroupState, DownloadStatus};

/// Progress of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProgress {
    pub status: DownloadStatus,
    pub written: u64,
    pub total: u64,
    pub percentage: u8,
}

/// Aggregate progress of a group, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupProgress {
    pub group_id: String,
    pub status: DownloadStatus,
    pub written: u64,
    pub total: u64,
    pub percentage: u8,
    pub by_file: BTreeMap<String, FileProgress>,
}

impl GroupProgress {
    /// Snapshot the derived fields of `group`.
    ///
    /// The group is expected to be recomputed already.
    pub fn from_group(group: &DownloadGroupState) -> Self {
        Self {
            group_id: group.id.clone(),
            status: group.status,
            written: group.written_bytes,
            total: group.total_bytes,
            percentage: group.percentage,
            by_file: group
                .files
                .values()
                .map(|f| {
                    (
                        f.filename.clone(),
                        FileProgress {
                            status: f.status,
                            written: f.written,
                            total: f.total,
                            percentage: f.percentage,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Whether the group reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Recompute `group` and snapshot its progress.
pub fn aggregate(group: &mut DownloadGroupState) -> GroupProgress {
    group.recompute();
    GroupProgress::from_group(group)
}

/// Callback invoked with every aggregate update of a group.
pub type ProgressCallback = Arc<dyn Fn(&GroupProgress) + Send + Sync>;

/// Per-group subscriber lists.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<String, Vec<(u64, ProgressCallback)>>>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `callback` for `group_id`.
    pub fn subscribe(self: &Arc<Self>, group_id: &str, callback: ProgressCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .entry(group_id.to_string())
            .or_default()
            .push((id, callback));

        Subscription {
            registry: Arc::downgrade(self),
            group_id: group_id.to_string(),
            id,
            active: true,
        }
    }

    /// Deliver `progress` to every subscriber of its group.
    pub fn publish(&self, progress: &GroupProgress) {
        // Snapshot first so callbacks may unsubscribe without deadlocking
        let callbacks: Vec<ProgressCallback> = match self.subscribers.read().get(&progress.group_id)
        {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return,
        };
        for callback in callbacks {
            callback(progress);
        }
    }

    /// Number of subscribers for a group.
    pub fn count(&self, group_id: &str) -> usize {
        self.subscribers
            .read()
            .get(group_id)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    fn remove(&self, group_id: &str, id: u64) {
        let mut subscribers = self.subscribers.write();
        if let Some(list) = subscribers.get_mut(group_id) {
            list.retain(|(sub_id, _)| *sub_id != id);
            if list.is_empty() {
                subscribers.remove(group_id);
            }
        }
    }
}

/// Handle of a progress subscription.
///
/// Dropping the handle unsubscribes; call [`Subscription::detach`] to keep
/// the callback registered for the lifetime of the manager.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
    registry: Weak<SubscriberRegistry>,
    group_id: String,
    id: u64,
    active: bool,
}

impl Subscription {
    /// The group this subscription observes.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Stop receiving updates.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keep the callback registered without holding the handle.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.group_id, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DownloadFileState;
    use parking_lot::Mutex;

    fn group() -> DownloadGroupState {
        let mut a = DownloadFileState::new("a", None, 100);
        a.written = 40;
        let b = DownloadFileState::new("b", Some("mmproj".into()), 100);
        DownloadGroupState::new("g1", "Model", "org/repo", false, 1, vec![a, b])
    }

    #[test]
    fn test_aggregate_rolls_up_files() {
        let mut g = group();
        let progress = aggregate(&mut g);
        assert_eq!(progress.written, 40);
        assert_eq!(progress.total, 200);
        assert_eq!(progress.percentage, 20);
        assert_eq!(progress.by_file["a"].percentage, 40);
        assert_eq!(progress.by_file.len(), 2);
    }

    #[test]
    fn test_publish_reaches_only_group_subscribers() {
        let registry = SubscriberRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = registry.subscribe(
            "g1",
            Arc::new(move |p: &GroupProgress| sink.lock().push(p.percentage)),
        );
        let other = Arc::new(Mutex::new(0));
        let other_sink = Arc::clone(&other);
        let _sub2 = registry.subscribe("g2", Arc::new(move |_: &GroupProgress| *other_sink.lock() += 1));

        let mut g = group();
        registry.publish(&aggregate(&mut g));

        assert_eq!(*seen.lock(), vec![20]);
        assert_eq!(*other.lock(), 0);
    }

    #[test]
    fn test_unsubscribe_and_drop() {
        let registry = SubscriberRegistry::new();
        let sub = registry.subscribe("g1", Arc::new(|_: &GroupProgress| {}));
        let sub2 = registry.subscribe("g1", Arc::new(|_: &GroupProgress| {}));
        assert_eq!(registry.count("g1"), 2);

        sub.unsubscribe();
        assert_eq!(registry.count("g1"), 1);
        drop(sub2);
        assert_eq!(registry.count("g1"), 0);
    }

    #[test]
    fn test_detach_keeps_callback() {
        let registry = SubscriberRegistry::new();
        registry
            .subscribe("g1", Arc::new(|_: &GroupProgress| {}))
            .detach();
        assert_eq!(registry.count("g1"), 1);
    }

    #[test]
    fn test_subscription_outliving_registry() {
        let registry = SubscriberRegistry::new();
        let sub = registry.subscribe("g1", Arc::new(|_: &GroupProgress| {}));
        drop(registry);
        sub.unsubscribe();
    }
}
