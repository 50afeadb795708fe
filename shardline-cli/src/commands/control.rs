//! Lifecycle commands for existing groups.
//!
//! Transfers run inside the process that started them. `resume` and `retry`
//! therefore stay in the foreground and follow the group; `pause`, `cancel`
//! and `remove` only update the persisted group.

use shardline::DownloadGroupManager;
use tokio_util::sync::CancellationToken;

use super::common::{report_outcome, ProgressFollower};
use crate::error::CliError;
use crate::runner::CliRunner;

/// A lifecycle action on one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Pause,
    Resume,
    Cancel,
    Retry,
    Remove,
}

impl Control {
    fn name(&self) -> &'static str {
        match self {
            Control::Pause => "pause",
            Control::Resume => "resume",
            Control::Cancel => "cancel",
            Control::Retry => "retry",
            Control::Remove => "remove",
        }
    }

    fn follows(&self) -> bool {
        matches!(self, Control::Resume | Control::Retry)
    }
}

/// Run a lifecycle command.
pub fn run(control: Control, group_id: &str) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup(control.name());
    let interrupt = if control.follows() {
        Some(runner.interrupt_token()?)
    } else {
        None
    };
    runner.block_on(apply(&runner, control, group_id, interrupt))
}

async fn apply(
    runner: &CliRunner,
    control: Control,
    group_id: &str,
    interrupt: Option<CancellationToken>,
) -> Result<(), CliError> {
    let manager = runner.manager()?;
    manager.rehydrate().await?;

    let Some(group) = manager.group(group_id).await? else {
        return Err(CliError::UnknownGroup(group_id.to_string()));
    };

    match (control, interrupt) {
        (Control::Resume | Control::Retry, Some(interrupt)) => {
            let follower = ProgressFollower::attach(&manager, group_id);
            if control == Control::Resume {
                manager.resume(group_id).await?;
            } else {
                manager.retry(group_id).await?;
            }
            println!("{} {}, press Ctrl+C to pause", verb(control), group.title);
            follow(&manager, follower, group_id, interrupt).await
        }
        (Control::Pause, _) => {
            manager.pause(group_id).await?;
            println!("Paused {}", group.title);
            Ok(())
        }
        (Control::Cancel, _) => {
            manager.cancel(group_id).await?;
            println!("Canceled {}", group.title);
            Ok(())
        }
        (Control::Remove, _) => {
            manager.remove(group_id).await?;
            println!("Removed {}", group.title);
            Ok(())
        }
        (Control::Resume | Control::Retry, None) => Ok(()),
    }
}

async fn follow(
    manager: &DownloadGroupManager,
    follower: ProgressFollower,
    group_id: &str,
    interrupt: CancellationToken,
) -> Result<(), CliError> {
    let status = follower.run(manager, interrupt).await?;
    let group = manager.group(group_id).await?;
    manager.shutdown().await;
    report_outcome(group.as_ref(), status)
}

fn verb(control: Control) -> &'static str {
    match control {
        Control::Retry => "Retrying",
        _ => "Resuming",
    }
}
