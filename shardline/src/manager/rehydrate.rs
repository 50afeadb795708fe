//! Recovery after a process restart and the notification action listener.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::error::{DownloadError, DownloadResult};
use crate::manager::ManagerInner;
use crate::notify::NotificationAction;
use crate::state::DownloadStatus;
use crate::transfer::{resolve_task_id, TransferHandle};

/// What a rehydration pass found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RehydrateReport {
    /// Persisted groups examined.
    pub groups: usize,
    /// Recovered transfers attached to their file.
    pub reattached: usize,
    /// Recovered transfers stopped because their file no longer wants them.
    pub stopped: usize,
    /// Recovered transfers whose id matched no persisted group.
    pub unmatched: usize,
    /// Running groups found without any live transfer and marked paused.
    pub paused: usize,
}

impl ManagerInner {
    pub(super) async fn rehydrate(self: &Arc<Self>) -> DownloadResult<RehydrateReport> {
        self.notifier.ensure_channel();
        let models_dir = &self.config.models_dir;
        tokio::fs::create_dir_all(models_dir)
            .await
            .map_err(|e| DownloadError::io(models_dir, e))?;

        let handles = self.backend.recover().await;
        let groups = self.store.load_all().await?;
        let mut report = RehydrateReport {
            groups: groups.len(),
            ..Default::default()
        };

        let mut recovered: HashMap<String, Vec<(String, TransferHandle)>> = HashMap::new();
        for handle in handles {
            match resolve_task_id(&handle.task_id, &groups) {
                Some((group_id, filename)) => {
                    recovered.entry(group_id).or_default().push((filename, handle))
                }
                None => {
                    debug!(task_id = %handle.task_id, "Recovered transfer matches no group");
                    report.unmatched += 1;
                }
            }
        }

        for snapshot in &groups {
            let group_id = snapshot.id.as_str();
            let handles = recovered.remove(group_id).unwrap_or_default();

            let _guard = self.lock_group(group_id).await;
            let Some(mut group) = self.store.load(group_id).await? else {
                for (_, handle) in handles {
                    handle.control.stop();
                    report.stopped += 1;
                }
                continue;
            };
            let mut changed = false;

            for (filename, handle) in handles {
                let wanted = group.status != DownloadStatus::Canceled
                    && group.files.get(&filename).is_some_and(|f| {
                        !matches!(f.status, DownloadStatus::Completed | DownloadStatus::Canceled)
                    });
                if !wanted {
                    debug!(group_id, filename = %filename, "Stopping unwanted recovered transfer");
                    handle.control.stop();
                    report.stopped += 1;
                    continue;
                }

                let paused = group.status == DownloadStatus::Paused;
                if paused {
                    handle.control.pause();
                }
                self.attach(group_id, &filename, handle);
                if let Some(file) = group.files.get_mut(&filename) {
                    if !paused {
                        file.set_status(DownloadStatus::Running);
                    }
                }
                report.reattached += 1;
                changed = true;
            }

            // Running files without a transfer have nothing feeding them. In a
            // group that is still moving they go back to the queue.
            let requeue = group.status == DownloadStatus::Running && self.live.count(group_id) > 0;
            for (filename, file) in group.files.iter_mut() {
                if file.status == DownloadStatus::Running && !self.live.contains(group_id, filename) {
                    if requeue {
                        self.requeue(file);
                    } else {
                        file.set_status(DownloadStatus::Paused);
                    }
                    changed = true;
                }
            }
            if group.status == DownloadStatus::Running && self.live.count(group_id) == 0 {
                group.status = DownloadStatus::Paused;
                report.paused += 1;
                changed = true;
            }

            let started = if group.status == DownloadStatus::Running {
                self.fill_slots(&mut group)
            } else {
                Vec::new()
            };
            changed |= !started.is_empty();

            if changed {
                self.commit_started(&mut group, started).await?;
            } else if !group.status.is_terminal() {
                self.notifier.submit(&group);
            }
        }

        self.install_action_listener();

        info!(
            groups = report.groups,
            reattached = report.reattached,
            stopped = report.stopped,
            unmatched = report.unmatched,
            paused = report.paused,
            "Rehydrated download groups"
        );
        Ok(report)
    }

    /// Dispatch notification action presses to the manager. Installed once.
    fn install_action_listener(self: &Arc<Self>) {
        if self.listener_installed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut actions = self.notifier.subscribe_actions();
        let weak = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = actions.recv() => received,
                };
                match received {
                    Ok(event) => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        inner.dispatch_action(&event.action_id).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notification actions dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    async fn dispatch_action(self: &Arc<Self>, action_id: &str) {
        let Some((action, group_id)) = NotificationAction::parse(action_id) else {
            debug!(action_id, "Ignoring unknown notification action");
            return;
        };
        debug!(group_id = %group_id, %action, "Notification action");

        let result = match action {
            NotificationAction::Pause => self.pause(&group_id).await,
            NotificationAction::Resume => self.resume(&group_id).await,
            NotificationAction::Cancel => self.cancel(&group_id).await,
            NotificationAction::Retry => self.retry(&group_id).await,
        };
        if let Err(e) = result {
            warn!(group_id = %group_id, %action, error = %e, "Notification action failed");
        }
    }
}
