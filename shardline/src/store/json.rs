//! JSON file store.
//!
//! Layout: `<state_dir>/<namespace>/<encoded groupId>.json`. Group ids are
//! percent-encoded so any id maps to a single safe filename. Writes go to a
//! hidden temporary sibling first and are renamed into place, so a reader
//! never observes a half-written record.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{DownloadError, DownloadResult};
use crate::state::DownloadGroupState;
use crate::store::{record_key, GroupStateStore};
use crate::BoxFuture;

const RECORD_EXTENSION: &str = ".json";

/// Group store persisting one JSON document per group.
#[derive(Debug)]
pub struct JsonGroupStore {
    dir: PathBuf,
    namespace: String,
    write_seq: AtomicU64,
}

impl JsonGroupStore {
    /// Create a store rooted at `state_dir/namespace`.
    ///
    /// The directory is created lazily on first write.
    pub fn new(state_dir: impl AsRef<Path>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            dir: state_dir.as_ref().join(&namespace),
            namespace,
            write_seq: AtomicU64::new(0),
        }
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key(&self, group_id: &str) -> String {
        record_key(&self.namespace, group_id)
    }

    fn record_path(&self, group_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}", urlencoding::encode(group_id), RECORD_EXTENSION))
    }

    async fn write_record(&self, group: &DownloadGroupState) -> DownloadResult<()> {
        let key = self.key(&group.id);
        let bytes = serde_json::to_vec_pretty(group)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DownloadError::store(&key, e))?;

        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let temp = self.dir.join(format!(
            ".{}.{}.tmp",
            urlencoding::encode(&group.id),
            seq
        ));
        let target = self.record_path(&group.id);

        if let Err(e) = tokio::fs::write(&temp, &bytes).await {
            return Err(DownloadError::store(&key, e));
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            tokio::fs::remove_file(&temp).await.ok();
            return Err(DownloadError::store(&key, e));
        }
        Ok(())
    }

    async fn read_record(&self, group_id: &str) -> DownloadResult<Option<DownloadGroupState>> {
        let key = self.key(group_id);
        let bytes = match tokio::fs::read(self.record_path(group_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DownloadError::store(&key, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| DownloadError::store(&key, format!("corrupt record: {}", e)))
    }

    async fn read_ids(&self) -> DownloadResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DownloadError::store(&self.namespace, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DownloadError::store(&self.namespace, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            let Some(encoded) = name.strip_suffix(RECORD_EXTENSION) else {
                continue;
            };
            match urlencoding::decode(encoded) {
                Ok(id) => ids.push(id.into_owned()),
                Err(_) => tracing::warn!(file = name, "Skipping undecodable record name"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl GroupStateStore for JsonGroupStore {
    fn upsert<'a>(&'a self, group: &'a DownloadGroupState) -> BoxFuture<'a, DownloadResult<()>> {
        Box::pin(self.write_record(group))
    }

    fn load<'a>(
        &'a self,
        group_id: &'a str,
    ) -> BoxFuture<'a, DownloadResult<Option<DownloadGroupState>>> {
        Box::pin(self.read_record(group_id))
    }

    fn load_all(&self) -> BoxFuture<'_, DownloadResult<Vec<DownloadGroupState>>> {
        Box::pin(async move {
            let mut groups = Vec::new();
            for id in self.read_ids().await? {
                match self.read_record(&id).await {
                    Ok(Some(group)) => groups.push(group),
                    Ok(None) => {}
                    // One unreadable record must not hide every other group
                    Err(e) => tracing::warn!(group_id = %id, error = %e, "Skipping unreadable group record"),
                }
            }
            Ok(groups)
        })
    }

    fn list_ids(&self) -> BoxFuture<'_, DownloadResult<Vec<String>>> {
        Box::pin(self.read_ids())
    }

    fn remove<'a>(&'a self, group_id: &'a str) -> BoxFuture<'a, DownloadResult<bool>> {
        Box::pin(async move {
            match tokio::fs::remove_file(self.record_path(group_id)).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(DownloadError::store(self.key(group_id), e)),
            }
        })
    }
}
