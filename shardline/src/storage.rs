//! Free-space advisory.
//!
//! Compares the summed preflight sizes of a group against the free space on
//! the volume holding the model directory. The result is advisory only: a
//! warning is surfaced to the user and the enqueue proceeds regardless,
//! because probe sizes are estimates and refusing on an estimate is worse
//! than a possible mid-transfer failure.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sysinfo::Disks;

/// Reports free space for the volume containing a path.
pub trait FreeSpace: Send + Sync {
    /// Available bytes, or `None` when the volume cannot be determined.
    fn available_bytes(&self, path: &Path) -> Option<u64>;
}

/// Free-space lookup backed by the operating system's disk list.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFreeSpace;

impl FreeSpace for SystemFreeSpace {
    fn available_bytes(&self, path: &Path) -> Option<u64> {
        let target = nearest_existing_path(path);
        let target = std::fs::canonicalize(&target).unwrap_or(target);
        let disks = Disks::new_with_refreshed_list();

        // Longest mount point containing the target wins
        disks
            .list()
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Fixed free-space value, for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedFreeSpace(pub Option<u64>);

impl FreeSpace for FixedFreeSpace {
    fn available_bytes(&self, _path: &Path) -> Option<u64> {
        self.0
    }
}

fn nearest_existing_path(path: &Path) -> PathBuf {
    let mut candidate = path.to_path_buf();
    while !candidate.exists() {
        match candidate.parent() {
            Some(parent) => candidate = parent.to_path_buf(),
            None => break,
        }
    }
    candidate
}

/// Advisory produced when the expected download exceeds free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowStorageWarning {
    /// Sum of all probed sizes.
    pub expected_bytes: u64,
    /// Free bytes on the target volume.
    pub available_bytes: u64,
}

/// Checks expected download sizes against free space.
#[derive(Clone)]
pub struct StorageGate {
    free_space: Arc<dyn FreeSpace>,
}

impl Default for StorageGate {
    fn default() -> Self {
        Self::new(Arc::new(SystemFreeSpace))
    }
}

impl StorageGate {
    /// Create a gate using the given free-space source.
    pub fn new(free_space: Arc<dyn FreeSpace>) -> Self {
        Self { free_space }
    }

    /// Check whether `expected_bytes` fits in the free space at `dir`.
    ///
    /// Returns a warning only when free space is a known positive value
    /// smaller than a known positive expected total.
    pub fn check(&self, dir: &Path, expected_bytes: u64) -> Option<LowStorageWarning> {
        if expected_bytes == 0 {
            return None;
        }
        let available = self.free_space.available_bytes(dir)?;
        if available > 0 && available < expected_bytes {
            tracing::warn!(
                dir = %dir.display(),
                expected_bytes,
                available_bytes = available,
                "Expected download size exceeds free space"
            );
            Some(LowStorageWarning {
                expected_bytes,
                available_bytes: available,
            })
        } else {
            None
        }
    }
}

/// Sum probed sizes, treating unknown sizes as zero.
pub fn expected_total(sizes: &HashMap<String, u64>) -> u64 {
    sizes.values().copied().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(free: Option<u64>) -> StorageGate {
        StorageGate::new(Arc::new(FixedFreeSpace(free)))
    }

    #[test]
    fn test_warns_when_free_space_is_short() {
        let warning = gate(Some(100)).check(Path::new("/models"), 300).unwrap();
        assert_eq!(warning.expected_bytes, 300);
        assert_eq!(warning.available_bytes, 100);
    }

    #[test]
    fn test_no_warning_when_space_suffices() {
        assert!(gate(Some(1000)).check(Path::new("/models"), 300).is_none());
    }

    #[test]
    fn test_unknown_free_space_never_warns() {
        assert!(gate(None).check(Path::new("/models"), 300).is_none());
        assert!(gate(Some(0)).check(Path::new("/models"), 300).is_none());
    }

    #[test]
    fn test_unknown_expected_size_never_warns() {
        assert!(gate(Some(1)).check(Path::new("/models"), 0).is_none());
    }

    #[test]
    fn test_expected_total_sums_known_sizes() {
        let sizes: HashMap<String, u64> =
            [("a".to_string(), 100), ("b".to_string(), 0), ("c".to_string(), 50)]
                .into_iter()
                .collect();
        assert_eq!(expected_total(&sizes), 150);
    }

    #[test]
    fn test_nearest_existing_path_walks_up() {
        let temp = tempfile::TempDir::new().unwrap();
        let missing = temp.path().join("a").join("b");
        assert_eq!(nearest_existing_path(&missing), temp.path());
    }

    #[test]
    fn test_system_free_space_does_not_panic() {
        let temp = tempfile::TempDir::new().unwrap();
        let _ = SystemFreeSpace.available_bytes(temp.path());
    }
}
