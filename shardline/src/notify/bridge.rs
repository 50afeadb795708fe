//! Throttled adapter between group state and the notification center.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::notify::render::{low_storage_notification, render_group};
use crate::notify::{
    ChannelSpec, Coalescer, Notification, NotificationActionEvent, NotificationCenter,
};
use crate::state::DownloadGroupState;
use crate::storage::LowStorageWarning;

/// Renders group state into throttled notifications.
pub struct NotificationBridge {
    center: Arc<dyn NotificationCenter>,
    coalescer: Coalescer<Notification>,
    channel: ChannelSpec,
}

impl NotificationBridge {
    /// Create a bridge rendering each group at most once per `interval`.
    pub fn new(center: Arc<dyn NotificationCenter>, interval: Duration) -> Self {
        let sink_center = Arc::clone(&center);
        let coalescer = Coalescer::new(interval, move |notification: Notification| {
            sink_center.display(notification);
        });
        Self {
            center,
            coalescer,
            channel: ChannelSpec::default(),
        }
    }

    /// Make sure the download channel exists.
    pub fn ensure_channel(&self) {
        self.center.ensure_channel(&self.channel);
    }

    /// Queue a render of the group's current state.
    pub fn submit(&self, group: &DownloadGroupState) {
        self.coalescer.submit(&group.id, render_group(group));
    }

    /// Show the low-storage advisory for a group. Not throttled.
    pub fn warn_low_storage(&self, group_id: &str, warning: &LowStorageWarning) {
        self.center
            .display(low_storage_notification(group_id, warning));
    }

    /// Remove a group's notification and drop any pending render.
    pub fn dismiss(&self, group_id: &str) {
        self.coalescer.forget(group_id);
        self.center.dismiss(group_id);
    }

    /// Stream of user action presses.
    pub fn subscribe_actions(&self) -> broadcast::Receiver<NotificationActionEvent> {
        self.center.subscribe_actions()
    }
}
