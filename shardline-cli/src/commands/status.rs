//! Status and list commands.

use shardline::store::{GroupStateStore, JsonGroupStore};
use shardline::{DownloadGroupState, DownloadResult};

use super::common::{byte_summary, styled_status};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Show one group in detail.
pub fn run_status(group_id: &str) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    let store = open_store(&runner);
    let group = runner
        .block_on(store.load(group_id))?
        .ok_or_else(|| CliError::UnknownGroup(group_id.to_string()))?;

    print!("{}", describe_group(&group));
    for file in group.files.values() {
        print!("{}", describe_file(file));
    }
    Ok(())
}

/// List every known group.
pub fn run_list() -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    let store = open_store(&runner);
    let groups: DownloadResult<Vec<DownloadGroupState>> = runner.block_on(store.load_all());
    let groups = groups?;

    if groups.is_empty() {
        println!("No downloads.");
        return Ok(());
    }
    for group in &groups {
        println!(
            "{:<32} {:<10} {:>3}%  {}",
            group.id,
            styled_status(group.status),
            group.percentage,
            byte_summary(group.written_bytes, group.total_bytes)
        );
    }
    Ok(())
}

/// Status reads go straight to the record store; nothing is started.
fn open_store(runner: &CliRunner) -> JsonGroupStore {
    let storage = &runner.config().storage;
    JsonGroupStore::new(&storage.state_dir, storage.namespace.clone())
}

fn describe_group(group: &DownloadGroupState) -> String {
    format!(
        "Group:    {}\nTitle:    {}\nSource:   {}\nStatus:   {}\nProgress: {}% ({})\nFiles:\n",
        group.id,
        group.title,
        group.source_root,
        styled_status(group.status),
        group.percentage,
        byte_summary(group.written_bytes, group.total_bytes)
    )
}

fn describe_file(file: &shardline::DownloadFileState) -> String {
    let mut line = format!(
        "  {:<48} {:<10} {:>3}%  {}",
        file.filename,
        styled_status(file.status),
        file.percentage,
        byte_summary(file.written, file.total)
    );
    if let Some(label) = &file.label {
        line.push_str(&format!("  [{}]", label));
    }
    line.push('\n');
    if let Some(message) = &file.error_message {
        line.push_str(&format!("    error: {}\n", message));
    }
    line
}
