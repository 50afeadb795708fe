//! Progress display and group formatting shared across commands.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use shardline::notify::format_bytes;
use shardline::{DownloadGroupManager, DownloadGroupState, DownloadStatus, GroupProgress, Subscription};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// Follows one group's progress on a terminal progress bar.
///
/// Attach before starting the group so no update is missed.
pub struct ProgressFollower {
    group_id: String,
    updates: mpsc::UnboundedReceiver<GroupProgress>,
    _subscription: Subscription,
}

impl ProgressFollower {
    pub fn attach(manager: &DownloadGroupManager, group_id: &str) -> Self {
        let (tx, updates) = mpsc::unbounded_channel();
        let subscription = manager.subscribe(group_id, move |progress| {
            let _ = tx.send(progress.clone());
        });
        Self {
            group_id: group_id.to_string(),
            updates,
            _subscription: subscription,
        }
    }

    /// Show progress until the group stops running.
    ///
    /// Ctrl+C pauses the group and returns `Paused`.
    pub async fn run(
        mut self,
        manager: &DownloadGroupManager,
        interrupt: CancellationToken,
    ) -> Result<DownloadStatus, CliError> {
        let bar = progress_bar();

        if let Some(group) = manager.group(&self.group_id).await? {
            update_bar(&bar, &GroupProgress::from_group(&group));
            if group.status.is_terminal() || group.status == DownloadStatus::Paused {
                bar.finish_and_clear();
                return Ok(group.status);
            }
        }

        loop {
            tokio::select! {
                _ = interrupt.cancelled() => {
                    manager.pause(&self.group_id).await?;
                    bar.abandon_with_message("paused");
                    return Ok(DownloadStatus::Paused);
                }
                update = self.updates.recv() => {
                    let Some(progress) = update else {
                        bar.abandon();
                        return Ok(manager.status(&self.group_id).await?);
                    };
                    update_bar(&bar, &progress);
                    if progress.is_terminal() || progress.status == DownloadStatus::Paused {
                        bar.finish_and_clear();
                        return Ok(progress.status);
                    }
                }
            }
        }
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar
}

fn update_bar(bar: &ProgressBar, progress: &GroupProgress) {
    bar.set_length(progress.total.max(progress.written));
    bar.set_position(progress.written);
    let running = progress
        .by_file
        .values()
        .filter(|f| f.status == DownloadStatus::Running)
        .count();
    bar.set_message(format!("{} file(s) active", running));
}

/// Print the outcome of a followed group. A failed group is an error.
pub fn report_outcome(group: Option<&DownloadGroupState>, status: DownloadStatus) -> Result<(), CliError> {
    let Some(group) = group else {
        return Ok(());
    };
    match status {
        DownloadStatus::Completed => {
            println!("{} {} ready", style("✓").green(), group.title);
            Ok(())
        }
        DownloadStatus::Paused => {
            println!(
                "{} paused. Continue with: shardline resume {}",
                group.title, group.id
            );
            Ok(())
        }
        DownloadStatus::Failed => {
            for file in group.files.values() {
                if let Some(message) = &file.error_message {
                    eprintln!("  {}: {}", file.filename, message);
                }
            }
            Err(CliError::Failed(format!(
                "{}. Retry with: shardline retry {}",
                group.title, group.id
            )))
        }
        other => {
            println!("{} {}", group.title, other);
            Ok(())
        }
    }
}

/// Styled status word.
pub fn styled_status(status: DownloadStatus) -> String {
    let text = status.as_str();
    match status {
        DownloadStatus::Completed => style(text).green().to_string(),
        DownloadStatus::Failed => style(text).red().to_string(),
        DownloadStatus::Canceled => style(text).dim().to_string(),
        DownloadStatus::Paused => style(text).yellow().to_string(),
        DownloadStatus::Queued | DownloadStatus::Running => style(text).cyan().to_string(),
    }
}

/// `<written> / <total>`, or just the written bytes when the total is unknown.
pub fn byte_summary(written: u64, total: u64) -> String {
    if total == 0 {
        format_bytes(written)
    } else {
        format!("{} / {}", format_bytes(written), format_bytes(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_summary() {
        assert_eq!(byte_summary(0, 0), "0 B");
        assert_eq!(byte_summary(512, 2048), "512 B / 2 KB");
    }

    #[test]
    fn test_styled_status_keeps_word() {
        console::set_colors_enabled(false);
        assert_eq!(styled_status(DownloadStatus::Paused), "paused");
    }

    #[test]
    fn test_report_failed_group_is_error() {
        let mut group = DownloadGroupState::new("g1", "Model", "org/repo", false, 1, vec![]);
        group.status = DownloadStatus::Failed;
        assert!(report_outcome(Some(&group), DownloadStatus::Failed).is_err());
        assert!(report_outcome(Some(&group), DownloadStatus::Completed).is_ok());
        assert!(report_outcome(None, DownloadStatus::Failed).is_ok());
    }
}
