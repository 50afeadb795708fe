//! Fetch command - enqueue a group and follow it to completion.

use clap::Args;
use shardline::config::ConfigFile;
use shardline::manager::{EnqueueRequest, FileRequest};
use tokio_util::sync::CancellationToken;

use super::common::{report_outcome, ProgressFollower};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the fetch command.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Repository to download from, e.g. org/model-GGUF
    pub repo: String,

    /// Files to download. A shard name such as
    /// model-00001-of-00004.gguf pulls every shard of the set.
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Group id (defaults to the first file name without extension)
    #[arg(long)]
    pub id: Option<String>,

    /// Display title (defaults to the group id)
    #[arg(long)]
    pub title: Option<String>,

    /// Label attached to every file
    #[arg(long)]
    pub label: Option<String>,

    /// Simultaneous transfers, 1 to 3
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Only transfer over unmetered networks where supported
    #[arg(long)]
    pub wifi_only: bool,
}

impl FetchArgs {
    /// Build the enqueue request, falling back to config defaults.
    pub fn into_request(self, config: &ConfigFile) -> EnqueueRequest {
        let id = self.id.unwrap_or_else(|| {
            self.files
                .first()
                .map(|f| default_group_id(f))
                .unwrap_or_else(|| self.repo.replace('/', "-"))
        });
        let title = self.title.unwrap_or_else(|| id.clone());

        let mut request = EnqueueRequest::new(id, title, self.repo)
            .with_concurrency(self.concurrency.unwrap_or(config.downloads.concurrency))
            .with_wifi_only(self.wifi_only || config.downloads.wifi_only);
        for filename in self.files {
            let file = match &self.label {
                Some(label) => FileRequest::new(filename).with_label(label.clone()),
                None => FileRequest::new(filename),
            };
            request = request.with_file_request(file);
        }
        request
    }
}

/// Group id derived from a file name: its last path segment without the
/// extension and without a shard suffix.
fn default_group_id(filename: &str) -> String {
    let name = filename.rsplit('/').next().unwrap_or(filename);
    let name = match shardline::split::detect_split_file(name) {
        Some(info) => info.base_name,
        None => name.to_string(),
    };
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Run the fetch command.
pub fn run(args: FetchArgs) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("fetch");
    let request = args.into_request(runner.config());
    let interrupt = runner.interrupt_token()?;

    println!("Fetching {} from {}", request.title, request.source_root);
    println!(
        "Saving to {}",
        runner.config().downloads.directory.display()
    );
    println!("Press Ctrl+C to pause");
    println!();

    runner.block_on(fetch(&runner, request, interrupt))
}

async fn fetch(
    runner: &CliRunner,
    request: EnqueueRequest,
    interrupt: CancellationToken,
) -> Result<(), CliError> {
    let group_id = request.id.clone();
    let manager = runner.manager()?;
    manager.rehydrate().await?;

    let follower = ProgressFollower::attach(&manager, &group_id);
    manager.enqueue_group(request).await?;
    let status = follower.run(&manager, interrupt).await?;
    let group = manager.group(&group_id).await?;
    manager.shutdown().await;

    report_outcome(group.as_ref(), status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(files: &[&str]) -> FetchArgs {
        FetchArgs {
            repo: "org/repo".to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
            id: None,
            title: None,
            label: None,
            concurrency: None,
            wifi_only: false,
        }
    }

    #[test]
    fn test_default_group_id() {
        assert_eq!(default_group_id("llama-q4.gguf"), "llama-q4");
        assert_eq!(default_group_id("llama-00001-of-00003.gguf"), "llama");
        assert_eq!(default_group_id("sub/dir/model.bin"), "model");
        assert_eq!(default_group_id("README"), "README");
    }

    #[test]
    fn test_request_uses_config_defaults() {
        let mut config = ConfigFile::default();
        config.downloads.concurrency = 2;

        let request = args(&["a.gguf", "b.gguf"]).into_request(&config);
        assert_eq!(request.id, "a");
        assert_eq!(request.title, "a");
        assert_eq!(request.concurrency, Some(2));
        assert_eq!(request.wifi_only, Some(false));
        assert_eq!(request.files.len(), 2);
    }

    #[test]
    fn test_request_overrides() {
        let mut a = args(&["a.gguf"]);
        a.id = Some("custom".to_string());
        a.title = Some("Custom Model".to_string());
        a.label = Some("Q4".to_string());
        a.concurrency = Some(3);
        a.wifi_only = true;

        let request = a.into_request(&ConfigFile::default());
        assert_eq!(request.id, "custom");
        assert_eq!(request.title, "Custom Model");
        assert_eq!(request.concurrency, Some(3));
        assert_eq!(request.wifi_only, Some(true));
        assert_eq!(request.files[0].label.as_deref(), Some("Q4"));
    }
}
