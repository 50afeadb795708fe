//! End-to-end tests over HTTP.
//!
//! A mock file host serves a repository; the manager runs with its
//! production collaborators (range probes, HTTP transfers, JSON records).
//! Verifies:
//! - sharded groups download, verify and land at their final paths
//! - probe failures leave sizes unknown without blocking the group
//! - server errors fail the group with the HTTP status
//! - partial files are resumed with a range request
//! - group records survive a manager restart
//!
//! Run with: `cargo test --test http_transfer`

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shardline::manager::{Collaborators, DownloadGroupManager, EnqueueRequest, ManagerConfig};
use shardline::notify::RecordingNotificationCenter;
use shardline::scheduler::{final_path, temp_path};
use shardline::{DownloadGroupState, DownloadStatus};

const REPO: &str = "org/model-GGUF";

// ============================================================================
// Helper Functions
// ============================================================================

struct Host {
    server: MockServer,
    models: TempDir,
    state: TempDir,
}

impl Host {
    async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            models: TempDir::new().unwrap(),
            state: TempDir::new().unwrap(),
        }
    }

    fn file_path(filename: &str) -> String {
        format!("/{}/resolve/main/{}", REPO, filename)
    }

    /// Serve `body` for `filename`, answering size probes with a range reply.
    async fn serve(&self, filename: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(Self::file_path(filename)))
            .and(header("range", "bytes=0-0"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("content-range", format!("bytes 0-0/{}", body.len()).as_str())
                    .set_body_bytes(body[..1].to_vec()),
            )
            .with_priority(1)
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(Self::file_path(filename)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    async fn serve_status(&self, filename: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(Self::file_path(filename)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    fn config(&self) -> ManagerConfig {
        ManagerConfig::new(self.models.path().to_path_buf())
            .with_base_url(self.server.uri())
            .with_state_dir(self.state.path().to_path_buf())
            .with_notification_interval(Duration::from_millis(10))
            .with_probe_timeout(Duration::from_secs(5))
            .with_resume_partial(true)
    }

    fn manager(&self) -> DownloadGroupManager {
        let center = Arc::new(RecordingNotificationCenter::new());
        let config = self.config();
        let collaborators = Collaborators::from_config(&config, center).unwrap();
        DownloadGroupManager::new(config, collaborators)
    }
}

async fn wait_for_status(
    manager: &DownloadGroupManager,
    group_id: &str,
    wanted: DownloadStatus,
) -> DownloadGroupState {
    for _ in 0..500 {
        if let Some(group) = manager.group(group_id).await.unwrap() {
            if group.status == wanted {
                return group;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("group {} never reached {}", group_id, wanted);
}

// ============================================================================
// Downloads
// ============================================================================

#[tokio::test]
async fn test_sharded_group_downloads_over_http() {
    let host = Host::start().await;
    host.serve("llama-00001-of-00002.gguf", vec![1u8; 3000]).await;
    host.serve("llama-00002-of-00002.gguf", vec![2u8; 1200]).await;
    let manager = host.manager();

    manager
        .enqueue_group(
            EnqueueRequest::new("llama", "Llama", REPO)
                .with_file("llama-00002-of-00002.gguf")
                .with_concurrency(2),
        )
        .await
        .unwrap();

    let enqueued = manager.group("llama").await.unwrap().unwrap();
    assert_eq!(enqueued.files.len(), 2);
    assert_eq!(enqueued.total_bytes, 4200);

    let group = wait_for_status(&manager, "llama", DownloadStatus::Completed).await;
    assert_eq!(group.percentage, 100);
    assert_eq!(group.written_bytes, 4200);

    let dir = host.models.path();
    assert_eq!(
        std::fs::read(final_path(dir, "llama-00001-of-00002.gguf")).unwrap(),
        vec![1u8; 3000]
    );
    assert_eq!(
        std::fs::read(final_path(dir, "llama-00002-of-00002.gguf")).unwrap(),
        vec![2u8; 1200]
    );
    assert!(!temp_path(dir, "llama-00001-of-00002.gguf").exists());
}

#[tokio::test]
async fn test_probe_failure_leaves_size_unknown() {
    let host = Host::start().await;
    Mock::given(method("GET"))
        .and(path(Host::file_path("a.gguf")))
        .and(header("range", "bytes=0-0"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .mount(&host.server)
        .await;
    Mock::given(method("GET"))
        .and(path(Host::file_path("a.gguf")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 512]))
        .mount(&host.server)
        .await;
    let manager = host.manager();

    manager
        .enqueue_group(EnqueueRequest::new("a", "A", REPO).with_file("a.gguf"))
        .await
        .unwrap();
    assert_eq!(manager.group("a").await.unwrap().unwrap().total_bytes, 0);

    let group = wait_for_status(&manager, "a", DownloadStatus::Completed).await;
    assert_eq!(group.total_bytes, 512);
    assert_eq!(group.percentage, 100);
}

#[tokio::test]
async fn test_server_error_fails_group() {
    let host = Host::start().await;
    host.serve("good.gguf", vec![0u8; 64]).await;
    host.serve_status("missing.gguf", 404).await;
    let manager = host.manager();

    manager
        .enqueue_group(
            EnqueueRequest::new("g1", "Model", REPO)
                .with_file("good.gguf")
                .with_file("missing.gguf")
                .with_concurrency(1),
        )
        .await
        .unwrap();

    let group = wait_for_status(&manager, "g1", DownloadStatus::Failed).await;
    let missing = &group.files["missing.gguf"];
    assert_eq!(missing.status, DownloadStatus::Failed);
    assert!(missing.error_message.as_deref().unwrap().contains("404"));
    assert_eq!(group.files["good.gguf"].status, DownloadStatus::Completed);
    assert!(group.percentage < 100);
}

#[tokio::test]
async fn test_partial_file_is_resumed() {
    let host = Host::start().await;
    let filename = "big.gguf";
    Mock::given(method("GET"))
        .and(path(Host::file_path(filename)))
        .and(header("range", "bytes=0-0"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 0-0/10")
                .set_body_bytes(vec![1u8]),
        )
        .with_priority(1)
        .mount(&host.server)
        .await;
    Mock::given(method("GET"))
        .and(path(Host::file_path(filename)))
        .and(header("range", "bytes=4-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 4-9/10")
                .set_body_bytes(vec![2u8; 6]),
        )
        .with_priority(1)
        .expect(1)
        .mount(&host.server)
        .await;

    std::fs::write(temp_path(host.models.path(), filename), [1u8; 4]).unwrap();
    let manager = host.manager();
    manager
        .enqueue_group(EnqueueRequest::new("big", "Big", REPO).with_file(filename))
        .await
        .unwrap();

    let group = wait_for_status(&manager, "big", DownloadStatus::Completed).await;
    assert_eq!(group.total_bytes, 10);
    assert_eq!(
        std::fs::read(final_path(host.models.path(), filename)).unwrap(),
        vec![1, 1, 1, 1, 2, 2, 2, 2, 2, 2]
    );
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_records_survive_restart() {
    let host = Host::start().await;
    host.serve("a.gguf", vec![9u8; 256]).await;

    let first = host.manager();
    first
        .enqueue_group(EnqueueRequest::new("a", "A", REPO).with_file("a.gguf"))
        .await
        .unwrap();
    wait_for_status(&first, "a", DownloadStatus::Completed).await;
    first.shutdown().await;
    drop(first);

    let second = host.manager();
    let report = second.rehydrate().await.unwrap();
    assert_eq!(report.groups, 1);
    assert_eq!(report.reattached, 0);

    let groups = second.list().await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].status, DownloadStatus::Completed);
    assert_eq!(second.status("a").await.unwrap(), DownloadStatus::Completed);

    assert!(second.remove("a").await.unwrap());
    assert!(second.list().await.unwrap().is_empty());
    assert!(final_path(host.models.path(), "a.gguf").exists());
}
