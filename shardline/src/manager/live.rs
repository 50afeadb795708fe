//! Registry of live transfers per group.
//!
//! Every attached transfer gets a generation number. Event pumps carry the
//! generation they were started with and only act while it is still the
//! current entry for their file, so events from a replaced, stopped or
//! detached transfer are dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::transfer::TransferControl;

/// One attached transfer.
pub(crate) struct LiveTransfer {
    pub filename: String,
    pub generation: u64,
    pub control: Arc<dyn TransferControl>,
    pub pump: Option<JoinHandle<()>>,
}

impl LiveTransfer {
    /// Stop the transfer and its event pump.
    pub fn stop(self) {
        self.control.stop();
        self.detach();
    }

    /// Stop consuming events without touching the transfer.
    pub fn detach(self) {
        if let Some(pump) = self.pump {
            pump.abort();
        }
    }
}

#[derive(Default)]
pub(crate) struct LiveTransfers {
    next_generation: AtomicU64,
    groups: Mutex<HashMap<String, HashMap<String, LiveTransfer>>>,
}

impl LiveTransfers {
    /// Register a transfer, returning its generation and any entry it replaced.
    pub fn insert(
        &self,
        group_id: &str,
        filename: &str,
        control: Arc<dyn TransferControl>,
    ) -> (u64, Option<LiveTransfer>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self
            .groups
            .lock()
            .entry(group_id.to_string())
            .or_default()
            .insert(
                filename.to_string(),
                LiveTransfer {
                    filename: filename.to_string(),
                    generation,
                    control,
                    pump: None,
                },
            );
        (generation, previous)
    }

    /// Record the event pump of a transfer if it is still current.
    pub fn set_pump(&self, group_id: &str, filename: &str, generation: u64, pump: JoinHandle<()>) {
        let mut groups = self.groups.lock();
        if let Some(entry) = groups
            .get_mut(group_id)
            .and_then(|files| files.get_mut(filename))
            .filter(|entry| entry.generation == generation)
        {
            entry.pump = Some(pump);
        }
    }

    pub fn is_current(&self, group_id: &str, filename: &str, generation: u64) -> bool {
        self.groups
            .lock()
            .get(group_id)
            .and_then(|files| files.get(filename))
            .map(|entry| entry.generation == generation)
            .unwrap_or(false)
    }

    /// Remove the entry if `generation` is still current. The pump is not
    /// aborted, since the caller is usually that pump.
    pub fn remove_if_current(&self, group_id: &str, filename: &str, generation: u64) -> bool {
        let mut groups = self.groups.lock();
        let Some(files) = groups.get_mut(group_id) else {
            return false;
        };
        let current = files
            .get(filename)
            .map(|entry| entry.generation == generation)
            .unwrap_or(false);
        if current {
            files.remove(filename);
            if files.is_empty() {
                groups.remove(group_id);
            }
        }
        current
    }

    pub fn count(&self, group_id: &str) -> usize {
        self.groups
            .lock()
            .get(group_id)
            .map(|files| files.len())
            .unwrap_or(0)
    }

    pub fn contains(&self, group_id: &str, filename: &str) -> bool {
        self.groups
            .lock()
            .get(group_id)
            .map(|files| files.contains_key(filename))
            .unwrap_or(false)
    }

    pub fn control(&self, group_id: &str, filename: &str) -> Option<Arc<dyn TransferControl>> {
        self.groups
            .lock()
            .get(group_id)
            .and_then(|files| files.get(filename))
            .map(|entry| Arc::clone(&entry.control))
    }

    pub fn controls(&self, group_id: &str) -> Vec<Arc<dyn TransferControl>> {
        self.groups
            .lock()
            .get(group_id)
            .map(|files| files.values().map(|e| Arc::clone(&e.control)).collect())
            .unwrap_or_default()
    }

    /// Remove and return every transfer of a group.
    pub fn take_group(&self, group_id: &str) -> Vec<LiveTransfer> {
        self.groups
            .lock()
            .remove(group_id)
            .map(|files| files.into_values().collect())
            .unwrap_or_default()
    }

    /// Remove and return one transfer.
    pub fn take(&self, group_id: &str, filename: &str) -> Option<LiveTransfer> {
        let mut groups = self.groups.lock();
        let files = groups.get_mut(group_id)?;
        let taken = files.remove(filename);
        if files.is_empty() {
            groups.remove(group_id);
        }
        taken
    }

    /// Remove and return every transfer of a group other than `kept`.
    pub fn take_group_except(&self, group_id: &str, kept: &str) -> Vec<LiveTransfer> {
        let mut groups = self.groups.lock();
        let Some(files) = groups.get_mut(group_id) else {
            return Vec::new();
        };
        let names: Vec<String> = files.keys().filter(|name| *name != kept).cloned().collect();
        let taken = names
            .iter()
            .filter_map(|name| files.remove(name))
            .collect();
        if files.is_empty() {
            groups.remove(group_id);
        }
        taken
    }

    /// Remove and return every transfer.
    pub fn take_all(&self) -> Vec<LiveTransfer> {
        self.groups
            .lock()
            .drain()
            .flat_map(|(_, files)| files.into_values())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopControl;

    impl TransferControl for NoopControl {
        fn pause(&self) {}
        fn resume(&self) {}
        fn stop(&self) {}
    }

    fn control() -> Arc<dyn TransferControl> {
        Arc::new(NoopControl)
    }

    #[test]
    fn test_generations_supersede() {
        let live = LiveTransfers::default();
        let (first, previous) = live.insert("g1", "a", control());
        assert!(previous.is_none());
        let (second, previous) = live.insert("g1", "a", control());
        assert_eq!(previous.map(|p| p.generation), Some(first));

        assert!(!live.is_current("g1", "a", first));
        assert!(live.is_current("g1", "a", second));
        assert!(!live.remove_if_current("g1", "a", first));
        assert!(live.remove_if_current("g1", "a", second));
        assert_eq!(live.count("g1"), 0);
    }

    #[test]
    fn test_take_group() {
        let live = LiveTransfers::default();
        live.insert("g1", "a", control());
        live.insert("g1", "b", control());
        live.insert("g2", "a", control());

        let mut taken: Vec<_> = live.take_group("g1").into_iter().map(|t| t.filename).collect();
        taken.sort();
        assert_eq!(taken, vec!["a", "b"]);
        assert_eq!(live.count("g1"), 0);
        assert_eq!(live.count("g2"), 1);
        assert_eq!(live.take_all().len(), 1);
    }

    #[test]
    fn test_take_single_and_except() {
        let live = LiveTransfers::default();
        live.insert("g1", "a", control());
        live.insert("g1", "b", control());
        live.insert("g1", "c", control());

        assert_eq!(live.take("g1", "b").map(|t| t.filename), Some("b".to_string()));
        assert!(live.take("g1", "b").is_none());
        assert!(live.take("g2", "a").is_none());

        let taken: Vec<_> = live
            .take_group_except("g1", "a")
            .into_iter()
            .map(|t| t.filename)
            .collect();
        assert_eq!(taken, vec!["c"]);
        assert!(live.contains("g1", "a"));
        assert_eq!(live.count("g1"), 1);

        assert!(live.take("g1", "a").is_some());
        assert_eq!(live.count("g1"), 0);
    }
}
