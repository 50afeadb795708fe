//! Notification bridge.
//!
//! Group progress is mirrored into a user-facing notification, one per
//! group, rendered from the latest state and throttled so that a group is
//! rendered at most once per interval. User presses on the notification's
//! actions come back as [`NotificationActionEvent`]s and are dispatched to
//! the manager.
//!
//! The notification surface itself is an external collaborator behind
//! [`NotificationCenter`].

mod bridge;
mod render;
mod throttle;

pub use bridge::NotificationBridge;
pub use render::{format_bytes, low_storage_id, low_storage_notification, render_group};
pub use throttle::Coalescer;

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::broadcast;

/// Default minimum interval between two renders of the same group.
pub const DEFAULT_NOTIFICATION_INTERVAL: Duration = Duration::from_millis(750);

/// Channel every download notification is posted to.
pub const DOWNLOAD_CHANNEL_ID: &str = "model-downloads";

/// Capacity of the action event broadcast.
const ACTION_BUFFER: usize = 64;

/// Description of a notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub id: String,
    pub name: String,
}

impl Default for ChannelSpec {
    fn default() -> Self {
        Self {
            id: DOWNLOAD_CHANNEL_ID.to_string(),
            name: "Model downloads".to_string(),
        }
    }
}

/// Progress bar shown on a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressHint {
    pub max: u8,
    pub current: u8,
    /// Set while the total size is unknown.
    pub indeterminate: bool,
}

/// A user action offered on a group notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationAction {
    Pause,
    Resume,
    Cancel,
    Retry,
}

impl NotificationAction {
    /// Lowercase verb used in action ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationAction::Pause => "pause",
            NotificationAction::Resume => "resume",
            NotificationAction::Cancel => "cancel",
            NotificationAction::Retry => "retry",
        }
    }

    /// Button label.
    pub fn label(&self) -> &'static str {
        match self {
            NotificationAction::Pause => "Pause",
            NotificationAction::Resume => "Resume",
            NotificationAction::Cancel => "Cancel",
            NotificationAction::Retry => "Retry",
        }
    }

    /// Action id for a group: `<action>-<groupId>`.
    pub fn action_id(&self, group_id: &str) -> String {
        format!("{}-{}", self.as_str(), group_id)
    }

    /// Parse an action id into the action and its group id.
    pub fn parse(action_id: &str) -> Option<(Self, String)> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"^(pause|resume|cancel|retry)-(.+)$").expect("action id pattern is valid")
        });

        let caps = pattern.captures(action_id)?;
        let action = match &caps[1] {
            "pause" => NotificationAction::Pause,
            "resume" => NotificationAction::Resume,
            "cancel" => NotificationAction::Cancel,
            _ => NotificationAction::Retry,
        };
        Some((action, caps[2].to_string()))
    }
}

impl fmt::Display for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification as handed to the notification center.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub body: String,
    pub progress: Option<ProgressHint>,
    /// Whether the notification stays until dismissed by the system.
    pub ongoing: bool,
    /// Offered actions with their ids.
    pub actions: Vec<(NotificationAction, String)>,
}

/// A user pressed a notification action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationActionEvent {
    pub action_id: String,
    /// Notification the action belonged to, when known.
    pub notification_id: Option<String>,
}

/// The host's notification surface.
pub trait NotificationCenter: Send + Sync {
    /// Create the channel if it does not exist yet.
    fn ensure_channel(&self, channel: &ChannelSpec);

    /// Show or replace the notification with `notification.id`.
    fn display(&self, notification: Notification);

    /// Remove a notification.
    fn dismiss(&self, notification_id: &str);

    /// Stream of user action presses.
    fn subscribe_actions(&self) -> broadcast::Receiver<NotificationActionEvent>;
}

/// Notification center that writes notifications to the log.
///
/// It never produces action events.
pub struct LogNotificationCenter {
    actions: broadcast::Sender<NotificationActionEvent>,
}

impl Default for LogNotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl LogNotificationCenter {
    pub fn new() -> Self {
        let (actions, _) = broadcast::channel(ACTION_BUFFER);
        Self { actions }
    }
}

impl NotificationCenter for LogNotificationCenter {
    fn ensure_channel(&self, channel: &ChannelSpec) {
        tracing::debug!(channel = %channel.id, "Notification channel ready");
    }

    fn display(&self, notification: Notification) {
        tracing::info!(
            id = %notification.id,
            title = %notification.title,
            body = %notification.body,
            "Notification"
        );
    }

    fn dismiss(&self, notification_id: &str) {
        tracing::debug!(id = notification_id, "Notification dismissed");
    }

    fn subscribe_actions(&self) -> broadcast::Receiver<NotificationActionEvent> {
        self.actions.subscribe()
    }
}

/// Notification center that records everything, for tests.
///
/// Action presses are injected with [`RecordingNotificationCenter::press`].
pub struct RecordingNotificationCenter {
    displayed: Mutex<Vec<Notification>>,
    dismissed: Mutex<Vec<String>>,
    channels: Mutex<Vec<ChannelSpec>>,
    actions: broadcast::Sender<NotificationActionEvent>,
}

impl Default for RecordingNotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingNotificationCenter {
    pub fn new() -> Self {
        let (actions, _) = broadcast::channel(ACTION_BUFFER);
        Self {
            displayed: Mutex::new(Vec::new()),
            dismissed: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            actions,
        }
    }

    /// Every displayed notification, oldest first.
    pub fn displayed(&self) -> Vec<Notification> {
        self.displayed.lock().clone()
    }

    /// The most recent notification displayed under `id`.
    pub fn latest(&self, id: &str) -> Option<Notification> {
        self.displayed
            .lock()
            .iter()
            .rev()
            .find(|n| n.id == id)
            .cloned()
    }

    /// Number of renders for `id`.
    pub fn render_count(&self, id: &str) -> usize {
        self.displayed.lock().iter().filter(|n| n.id == id).count()
    }

    /// Dismissed notification ids.
    pub fn dismissed(&self) -> Vec<String> {
        self.dismissed.lock().clone()
    }

    /// Number of `ensure_channel` calls.
    pub fn channel_requests(&self) -> usize {
        self.channels.lock().len()
    }

    /// Number of live action subscribers.
    pub fn action_listeners(&self) -> usize {
        self.actions.receiver_count()
    }

    /// Simulate the user pressing an action. Returns the number of listeners
    /// that received it.
    pub fn press(&self, action_id: &str) -> usize {
        self.actions
            .send(NotificationActionEvent {
                action_id: action_id.to_string(),
                notification_id: None,
            })
            .unwrap_or(0)
    }
}

impl NotificationCenter for RecordingNotificationCenter {
    fn ensure_channel(&self, channel: &ChannelSpec) {
        self.channels.lock().push(channel.clone());
    }

    fn display(&self, notification: Notification) {
        self.displayed.lock().push(notification);
    }

    fn dismiss(&self, notification_id: &str) {
        self.dismissed.lock().push(notification_id.to_string());
    }

    fn subscribe_actions(&self) -> broadcast::Receiver<NotificationActionEvent> {
        self.actions.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_id_roundtrip() {
        let id = NotificationAction::Cancel.action_id("org-model-q4");
        assert_eq!(id, "cancel-org-model-q4");
        assert_eq!(
            NotificationAction::parse(&id),
            Some((NotificationAction::Cancel, "org-model-q4".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_unknown_actions() {
        assert_eq!(NotificationAction::parse("delete-g1"), None);
        assert_eq!(NotificationAction::parse("pause-"), None);
        assert_eq!(NotificationAction::parse("pause"), None);
    }

    #[test]
    fn test_recording_center_press_reaches_subscribers() {
        let center = RecordingNotificationCenter::new();
        assert_eq!(center.press("pause-g1"), 0);

        let mut rx = center.subscribe_actions();
        assert_eq!(center.action_listeners(), 1);
        assert_eq!(center.press("pause-g1"), 1);
        assert_eq!(rx.try_recv().unwrap().action_id, "pause-g1");
    }
}
