//! Persisted download state.
//!
//! A `DownloadGroupState` describes one logical download request (for
//! example a model plus its projector file) and owns one
//! `DownloadFileState` per physical file after split expansion. The derived
//! byte totals and percentages are recomputed from the per-file counters on
//! every update and are never mutated independently.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status shared by groups and files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Waiting for a transfer slot.
    #[default]
    Queued,
    /// Transfer in flight.
    Running,
    /// Suspended by the user; resumable.
    Paused,
    /// All bytes received and verified.
    Completed,
    /// A transfer or integrity error occurred.
    Failed,
    /// Stopped by the user; must be re-enqueued.
    Canceled,
}

impl DownloadStatus {
    /// Get the lowercase name used in persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Running => "running",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Canceled => "canceled",
        }
    }

    /// Whether no further transitions happen without a new enqueue.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Canceled
        )
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of one physical file within a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFileState {
    /// Physical filename, unique within the group.
    pub filename: String,
    /// Optional display hint such as "mmproj" or "vocoder".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub status: DownloadStatus,
    /// Bytes written so far.
    pub written: u64,
    /// Expected size in bytes; `0` means unknown.
    pub total: u64,
    /// Derived from `written / total`, carried forward while `total` is unknown.
    pub percentage: u8,
    /// Present only while `status` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl DownloadFileState {
    /// Create a queued file with a preflight size estimate.
    pub fn new(filename: impl Into<String>, label: Option<String>, total: u64) -> Self {
        Self {
            filename: filename.into(),
            label,
            status: DownloadStatus::Queued,
            written: 0,
            total,
            percentage: 0,
            error_message: None,
        }
    }

    /// Clamp `written` to `total` and recompute the percentage.
    ///
    /// Only a completed file reports 100.
    pub fn recompute(&mut self) {
        if self.total > 0 {
            self.written = self.written.min(self.total);
        }
        if self.status == DownloadStatus::Completed {
            self.percentage = 100;
        } else if self.total > 0 {
            self.percentage = rounded_percent(self.written, self.total).min(99);
        }
    }

    /// Set the status, clearing any stale error message.
    pub fn set_status(&mut self, status: DownloadStatus) {
        self.status = status;
        if status != DownloadStatus::Failed {
            self.error_message = None;
        }
    }

    /// Drop partial progress before a transfer that starts over from byte 0.
    pub fn restart_progress(&mut self) {
        self.written = 0;
        self.percentage = 0;
    }

    /// Mark the file failed with a message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = DownloadStatus::Failed;
        self.error_message = Some(message.into());
    }
}

/// State of one logical multi-file download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadGroupState {
    /// Caller-supplied stable identifier.
    pub id: String,
    /// Display label.
    pub title: String,
    /// Remote collection the file URLs are derived from (e.g. a repository).
    pub source_root: String,
    /// Advisory transfer policy hint.
    #[serde(default)]
    pub wifi_only: bool,
    /// Requested cap on simultaneous transfers (clamped by the scheduler).
    pub concurrency: usize,
    pub status: DownloadStatus,
    /// Files keyed by physical filename.
    pub files: BTreeMap<String, DownloadFileState>,
    pub total_bytes: u64,
    pub written_bytes: u64,
    pub percentage: u8,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Milliseconds since the Unix epoch; never decreases.
    pub updated_at: i64,
}

impl DownloadGroupState {
    /// Create a queued group from its files.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source_root: impl Into<String>,
        wifi_only: bool,
        concurrency: usize,
        files: impl IntoIterator<Item = DownloadFileState>,
    ) -> Self {
        let now = now_millis();
        let mut group = Self {
            id: id.into(),
            title: title.into(),
            source_root: source_root.into(),
            wifi_only,
            concurrency,
            status: DownloadStatus::Queued,
            files: files
                .into_iter()
                .map(|f| (f.filename.clone(), f))
                .collect(),
            total_bytes: 0,
            written_bytes: 0,
            percentage: 0,
            created_at: now,
            updated_at: now,
        };
        group.recompute();
        group
    }

    /// Whether every file has completed.
    pub fn all_completed(&self) -> bool {
        !self.files.is_empty()
            && self
                .files
                .values()
                .all(|f| f.status == DownloadStatus::Completed)
    }

    /// Recompute every derived field from the per-file counters.
    ///
    /// The group reports 100 if and only if every file is completed.
    pub fn recompute(&mut self) {
        let mut written = 0u64;
        let mut total = 0u64;
        for file in self.files.values_mut() {
            file.recompute();
            written += file.written;
            total += file.total;
        }
        self.written_bytes = written;
        self.total_bytes = total;
        self.percentage = if self.all_completed() {
            100
        } else if total > 0 {
            rounded_percent(written, total).min(99)
        } else {
            0
        };
    }

    /// Refresh `updated_at`, keeping it monotonic.
    pub fn touch(&mut self) {
        self.updated_at = now_millis().max(self.updated_at);
    }

    /// Names of files in the given status, in filename order.
    pub fn files_with_status(&self, status: DownloadStatus) -> Vec<String> {
        self.files
            .values()
            .filter(|f| f.status == status)
            .map(|f| f.filename.clone())
            .collect()
    }
}

/// Integer percentage of `part / whole`, rounded to nearest.
pub(crate) fn rounded_percent(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    let pct = (part as f64 / whole as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_with(files: Vec<DownloadFileState>) -> DownloadGroupState {
        DownloadGroupState::new("g1", "Model", "org/repo", false, 1, files)
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&DownloadStatus::Canceled).unwrap();
        assert_eq!(json, "\"canceled\"");
        let back: DownloadStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(back, DownloadStatus::Paused);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(DownloadStatus::Completed.is_terminal());
        assert!(DownloadStatus::Failed.is_terminal());
        assert!(DownloadStatus::Canceled.is_terminal());
        assert!(!DownloadStatus::Paused.is_terminal());
        assert!(!DownloadStatus::Queued.is_terminal());
    }

    #[test]
    fn test_file_written_clamped_to_total() {
        let mut file = DownloadFileState::new("a.gguf", None, 100);
        file.written = 150;
        file.recompute();
        assert_eq!(file.written, 100);
        assert_eq!(file.percentage, 99);
    }

    #[test]
    fn test_file_percentage_carried_forward_when_total_unknown() {
        let mut file = DownloadFileState::new("a.gguf", None, 0);
        file.percentage = 42;
        file.written = 1000;
        file.recompute();
        assert_eq!(file.percentage, 42);
        assert_eq!(file.written, 1000);
    }

    #[test]
    fn test_group_aggregates_bytes() {
        let mut a = DownloadFileState::new("a", None, 100);
        a.written = 50;
        let b = DownloadFileState::new("b", None, 300);
        let mut group = group_with(vec![a, b]);
        group.recompute();

        assert_eq!(group.total_bytes, 400);
        assert_eq!(group.written_bytes, 50);
        assert_eq!(group.percentage, 13);
    }

    #[test]
    fn test_group_never_reports_100_before_completion() {
        let mut a = DownloadFileState::new("a", None, 1000);
        a.written = 999;
        let mut group = group_with(vec![a]);
        group.recompute();
        assert_eq!(group.percentage, 99);
    }

    #[test]
    fn test_group_reports_100_when_all_completed_with_unknown_sizes() {
        let mut a = DownloadFileState::new("a", None, 0);
        a.set_status(DownloadStatus::Completed);
        let mut group = group_with(vec![a]);
        group.recompute();
        assert_eq!(group.percentage, 100);
    }

    #[test]
    fn test_set_status_clears_error() {
        let mut file = DownloadFileState::new("a", None, 10);
        file.fail("boom");
        assert_eq!(file.error_message.as_deref(), Some("boom"));
        file.set_status(DownloadStatus::Queued);
        assert!(file.error_message.is_none());
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut group = group_with(vec![DownloadFileState::new("a", None, 1)]);
        group.updated_at = i64::MAX - 1;
        group.touch();
        assert_eq!(group.updated_at, i64::MAX - 1);
    }

    #[test]
    fn test_group_json_layout() {
        let group = group_with(vec![DownloadFileState::new(
            "a.gguf",
            Some("mmproj".to_string()),
            10,
        )]);
        let value = serde_json::to_value(&group).unwrap();
        assert_eq!(value["sourceRoot"], "org/repo");
        assert_eq!(value["status"], "queued");
        assert_eq!(value["files"]["a.gguf"]["label"], "mmproj");
        assert!(value["files"]["a.gguf"].get("errorMessage").is_none());

        let back: DownloadGroupState = serde_json::from_value(value).unwrap();
        assert_eq!(back, group);
    }

    #[test]
    fn test_files_with_status() {
        let mut a = DownloadFileState::new("a", None, 1);
        a.set_status(DownloadStatus::Running);
        let b = DownloadFileState::new("b", None, 1);
        let group = group_with(vec![a, b]);
        assert_eq!(group.files_with_status(DownloadStatus::Queued), vec!["b"]);
        assert_eq!(group.files_with_status(DownloadStatus::Running), vec!["a"]);
    }
}
