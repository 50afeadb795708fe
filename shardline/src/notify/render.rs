//! Rendering of group state into notifications.

use crate::notify::{Notification, NotificationAction, ProgressHint, DOWNLOAD_CHANNEL_ID};
use crate::state::{DownloadGroupState, DownloadStatus};
use crate::storage::LowStorageWarning;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count in binary units with at most two decimals.
///
/// `0` renders as `0 B`; `1536` as `1.5 KB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    let text = format!("{:.2}", rounded);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", text, UNITS[unit])
}

/// Render the notification for a group's current state.
///
/// The group must be recomputed already.
pub fn render_group(group: &DownloadGroupState) -> Notification {
    let bytes = format!(
        "{} / {}",
        format_bytes(group.written_bytes),
        format_bytes(group.total_bytes)
    );
    let with_actions = |actions: &[NotificationAction]| -> Vec<(NotificationAction, String)> {
        actions
            .iter()
            .map(|a| (*a, a.action_id(&group.id)))
            .collect()
    };

    let (title, body, progress, ongoing, actions) = match group.status {
        DownloadStatus::Completed => (
            format!("{} ready", group.title),
            "Download complete".to_string(),
            None,
            false,
            Vec::new(),
        ),
        DownloadStatus::Failed => (
            format!("{} failed", group.title),
            bytes,
            None,
            false,
            with_actions(&[NotificationAction::Retry]),
        ),
        DownloadStatus::Canceled => (
            format!("{} canceled", group.title),
            bytes,
            None,
            false,
            with_actions(&[NotificationAction::Retry]),
        ),
        DownloadStatus::Queued | DownloadStatus::Running | DownloadStatus::Paused => (
            format!("Downloading {}", group.title),
            bytes,
            Some(ProgressHint {
                max: 100,
                current: group.percentage,
                indeterminate: group.total_bytes == 0,
            }),
            true,
            with_actions(&[
                NotificationAction::Pause,
                NotificationAction::Resume,
                NotificationAction::Cancel,
            ]),
        ),
    };

    Notification {
        id: group.id.clone(),
        channel_id: DOWNLOAD_CHANNEL_ID.to_string(),
        title,
        body,
        progress,
        ongoing,
        actions,
    }
}

/// Id of the low-storage advisory for a group.
pub fn low_storage_id(group_id: &str) -> String {
    format!("low-storage-{}", group_id)
}

/// Render the low-storage advisory.
pub fn low_storage_notification(group_id: &str, warning: &LowStorageWarning) -> Notification {
    Notification {
        id: low_storage_id(group_id),
        channel_id: DOWNLOAD_CHANNEL_ID.to_string(),
        title: "Low storage warning".to_string(),
        body: format!(
            "Expected {} but only {} free. Download may fail.",
            format_bytes(warning.expected_bytes),
            format_bytes(warning.available_bytes)
        ),
        progress: None,
        ongoing: false,
        actions: Vec::new(),
    }
}
