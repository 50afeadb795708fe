//! Transfer scheduling and event application.
//!
//! Scheduling is a bounded worker pool per group: the number of live
//! transfers never exceeds the clamped concurrency, and whenever a slot
//! frees the next queued file (in filename order) is started. This module
//! holds the pure parts of that pool; the manager owns the live handles.
//!
//! Event application turns one [`TransferEvent`] into a state change on the
//! group. The caller recomputes, persists and publishes afterwards.

use std::path::{Path, PathBuf};

use crate::state::{DownloadGroupState, DownloadStatus};
use crate::transfer::TransferEvent;

/// Upper bound on simultaneous transfers within one group.
pub const MAX_GROUP_CONCURRENCY: usize = 3;

/// Clamp a requested concurrency into `[1, MAX_GROUP_CONCURRENCY]`.
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_GROUP_CONCURRENCY)
}

/// Pick the queued files to start given `live` transfers already running.
pub fn next_batch(group: &DownloadGroupState, live: usize) -> Vec<String> {
    let free = clamp_concurrency(group.concurrency).saturating_sub(live);
    group
        .files
        .values()
        .filter(|f| f.status == DownloadStatus::Queued)
        .take(free)
        .map(|f| f.filename.clone())
        .collect()
}

/// Temporary download path of a file: `<dir>/<filename>.tmp`.
pub fn temp_path(models_dir: &Path, filename: &str) -> PathBuf {
    models_dir.join(format!("{}.tmp", filename))
}

/// Final path of a completed file.
pub fn final_path(models_dir: &Path, filename: &str) -> PathBuf {
    models_dir.join(filename)
}

/// What an applied event did to its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Counters or totals changed; the file is still in flight.
    Updated,
    /// The file was verified and moved into place.
    Completed,
    /// The file failed with the given message.
    Failed(String),
    /// The event was stale (unknown, finished or canceled file) and dropped.
    Ignored,
}

/// Apply one transfer event to a file of `group`.
///
/// `Done` verifies the temporary file against the expected size and either
/// renames it into place or discards it. The group status is settled
/// afterwards (fail-fast on any failed file, completed once all files are).
pub async fn apply_event(
    group: &mut DownloadGroupState,
    filename: &str,
    event: TransferEvent,
    models_dir: &Path,
) -> EventOutcome {
    if group.status == DownloadStatus::Canceled {
        return EventOutcome::Ignored;
    }
    let Some(file) = group.files.get_mut(filename) else {
        return EventOutcome::Ignored;
    };
    if matches!(
        file.status,
        DownloadStatus::Completed | DownloadStatus::Canceled
    ) {
        return EventOutcome::Ignored;
    }

    let outcome = match event {
        TransferEvent::Begin { expected_bytes } => {
            if expected_bytes > 0 {
                file.total = expected_bytes;
            }
            if file.status == DownloadStatus::Queued {
                file.set_status(DownloadStatus::Running);
            }
            EventOutcome::Updated
        }
        TransferEvent::Progress { written, total } => {
            if total > 0 {
                file.total = total;
            }
            file.written = written;
            EventOutcome::Updated
        }
        TransferEvent::Done => {
            let expected = file.total;
            match finalize_file(models_dir, filename, expected).await {
                Ok(actual) => {
                    file.total = if expected > 0 { expected } else { actual };
                    file.written = file.total;
                    file.set_status(DownloadStatus::Completed);
                    EventOutcome::Completed
                }
                Err(message) => {
                    file.fail(message.clone());
                    EventOutcome::Failed(message)
                }
            }
        }
        TransferEvent::Error { message } => {
            file.fail(message.clone());
            EventOutcome::Failed(message)
        }
    };

    match &outcome {
        EventOutcome::Completed => tracing::debug!(group_id = %group.id, filename, "File completed"),
        EventOutcome::Failed(message) => {
            tracing::warn!(group_id = %group.id, filename, error = %message, "File failed")
        }
        _ => {}
    }

    settle_group_status(group);
    outcome
}

/// Derive the group status from its files after a terminal file event.
///
/// A canceled group stays canceled. Any failed file fails the group; the
/// group completes only when every file has.
pub fn settle_group_status(group: &mut DownloadGroupState) {
    if group.status == DownloadStatus::Canceled {
        return;
    }
    if group.all_completed() {
        group.status = DownloadStatus::Completed;
    } else if group
        .files
        .values()
        .any(|f| f.status == DownloadStatus::Failed)
    {
        group.status = DownloadStatus::Failed;
    }
}

/// Verify the temporary file and move it to its final path.
///
/// Returns the verified size. A size mismatch against a known expected size
/// is treated as corruption: the temporary file is deleted.
async fn finalize_file(models_dir: &Path, filename: &str, expected: u64) -> Result<u64, String> {
    let temp = temp_path(models_dir, filename);
    let actual = tokio::fs::metadata(&temp)
        .await
        .map(|m| m.len())
        .unwrap_or(0);

    if expected > 0 && actual != expected {
        if let Err(e) = tokio::fs::remove_file(&temp).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %temp.display(), error = %e, "Failed to discard corrupt temp file");
            }
        }
        return Err(format!(
            "size mismatch: expected {} bytes, found {}",
            expected, actual
        ));
    }

    tokio::fs::rename(&temp, final_path(models_dir, filename))
        .await
        .map_err(|e| format!("failed to move {} into place: {}", temp.display(), e))?;
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DownloadFileState;
    use tempfile::TempDir;

    fn group(concurrency: usize, files: &[(&str, u64)]) -> DownloadGroupState {
        let mut g = DownloadGroupState::new(
            "g1",
            "Model",
            "org/repo",
            false,
            concurrency,
            files
                .iter()
                .map(|(name, total)| DownloadFileState::new(*name, None, *total)),
        );
        g.status = DownloadStatus::Running;
        g
    }

    #[test]
    fn test_clamp_concurrency() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(2), 2);
        assert_eq!(clamp_concurrency(10), 3);
    }

    #[test]
    fn test_next_batch_respects_cap_and_order() {
        let g = group(2, &[("c", 1), ("a", 1), ("b", 1)]);
        assert_eq!(next_batch(&g, 0), vec!["a", "b"]);
        assert_eq!(next_batch(&g, 1), vec!["a"]);
        assert!(next_batch(&g, 2).is_empty());
        assert!(next_batch(&g, 5).is_empty());
    }

    #[test]
    fn test_next_batch_clamps_configured_concurrency() {
        let g = group(50, &[("a", 1), ("b", 1), ("c", 1), ("d", 1)]);
        assert_eq!(next_batch(&g, 0).len(), MAX_GROUP_CONCURRENCY);
    }

    #[test]
    fn test_next_batch_skips_non_queued() {
        let mut g = group(3, &[("a", 1), ("b", 1), ("c", 1)]);
        g.files.get_mut("a").unwrap().set_status(DownloadStatus::Completed);
        g.files.get_mut("b").unwrap().set_status(DownloadStatus::Running);
        assert_eq!(next_batch(&g, 1), vec!["c"]);
    }

    #[tokio::test]
    async fn test_begin_overrides_estimate_but_never_zeroes() {
        let dir = TempDir::new().unwrap();
        let mut g = group(1, &[("a", 100)]);

        apply_event(&mut g, "a", TransferEvent::Begin { expected_bytes: 0 }, dir.path()).await;
        assert_eq!(g.files["a"].total, 100);
        assert_eq!(g.files["a"].status, DownloadStatus::Running);

        apply_event(&mut g, "a", TransferEvent::Begin { expected_bytes: 120 }, dir.path()).await;
        assert_eq!(g.files["a"].total, 120);
    }

    #[tokio::test]
    async fn test_progress_is_clamped() {
        let dir = TempDir::new().unwrap();
        let mut g = group(1, &[("a", 100)]);
        apply_event(
            &mut g,
            "a",
            TransferEvent::Progress {
                written: 150,
                total: 0,
            },
            dir.path(),
        )
        .await;
        g.recompute();
        assert_eq!(g.files["a"].written, 100);
        assert_eq!(g.percentage, 99);
    }

    #[tokio::test]
    async fn test_done_with_matching_size_moves_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(temp_path(dir.path(), "a"), vec![0u8; 100]).unwrap();
        let mut g = group(1, &[("a", 100)]);

        let outcome = apply_event(&mut g, "a", TransferEvent::Done, dir.path()).await;
        assert_eq!(outcome, EventOutcome::Completed);
        assert_eq!(g.status, DownloadStatus::Completed);
        assert_eq!(g.files["a"].written, 100);
        assert!(dir.path().join("a").exists());
        assert!(!temp_path(dir.path(), "a").exists());
    }

    #[tokio::test]
    async fn test_done_with_unknown_size_adopts_actual() {
        let dir = TempDir::new().unwrap();
        std::fs::write(temp_path(dir.path(), "a"), vec![0u8; 42]).unwrap();
        let mut g = group(1, &[("a", 0)]);

        apply_event(&mut g, "a", TransferEvent::Done, dir.path()).await;
        g.recompute();
        assert_eq!(g.files["a"].total, 42);
        assert_eq!(g.percentage, 100);
    }

    #[tokio::test]
    async fn test_size_mismatch_fails_file_and_group() {
        let dir = TempDir::new().unwrap();
        std::fs::write(temp_path(dir.path(), "a"), vec![0u8; 99]).unwrap();
        let mut g = group(2, &[("a", 100), ("b", 100)]);

        let outcome = apply_event(&mut g, "a", TransferEvent::Done, dir.path()).await;
        assert!(matches!(outcome, EventOutcome::Failed(ref m) if m.contains("size mismatch")));
        assert_eq!(g.status, DownloadStatus::Failed);
        assert!(g.files["a"].error_message.is_some());
        assert!(!temp_path(dir.path(), "a").exists());
        assert!(!dir.path().join("a").exists());
    }

    #[tokio::test]
    async fn test_error_fails_group_immediately() {
        let dir = TempDir::new().unwrap();
        let mut g = group(3, &[("a", 10), ("b", 10), ("c", 10)]);
        for f in ["a", "b", "c"] {
            apply_event(&mut g, f, TransferEvent::Begin { expected_bytes: 10 }, dir.path()).await;
        }

        apply_event(
            &mut g,
            "b",
            TransferEvent::Error {
                message: "network down".into(),
            },
            dir.path(),
        )
        .await;

        assert_eq!(g.status, DownloadStatus::Failed);
        assert_eq!(g.files["a"].status, DownloadStatus::Running);
        assert_eq!(g.files["c"].status, DownloadStatus::Running);
        assert_eq!(g.files["b"].error_message.as_deref(), Some("network down"));
    }

    #[tokio::test]
    async fn test_events_ignored_for_canceled_group() {
        let dir = TempDir::new().unwrap();
        let mut g = group(1, &[("a", 10)]);
        g.status = DownloadStatus::Canceled;
        let outcome = apply_event(
            &mut g,
            "a",
            TransferEvent::Progress {
                written: 5,
                total: 10,
            },
            dir.path(),
        )
        .await;
        assert_eq!(outcome, EventOutcome::Ignored);
        assert_eq!(g.files["a"].written, 0);
    }

    #[tokio::test]
    async fn test_unknown_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut g = group(1, &[("a", 10)]);
        let outcome = apply_event(&mut g, "zzz", TransferEvent::Done, dir.path()).await;
        assert_eq!(outcome, EventOutcome::Ignored);
    }
}
