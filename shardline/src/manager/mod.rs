//! Download group manager.
//!
//! [`DownloadGroupManager`] is the facade hosts talk to. It turns an enqueue
//! request into a persisted group, starts transfers within the group's
//! concurrency cap, folds transfer events back into the group and exposes
//! the lifecycle controls.
//!
//! # State updates
//!
//! Every mutation of a group (control calls and transfer events alike) runs
//! under that group's lock and ends in the same commit step: derived fields
//! are recomputed, the record is persisted, subscribers get the new
//! progress and a notification render is submitted. The persisted record
//! is the source of truth; nothing else caches group state.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use shardline::manager::{Collaborators, DownloadGroupManager, EnqueueRequest, ManagerConfig};
//! use shardline::notify::LogNotificationCenter;
//!
//! let config = ManagerConfig::new("/data/models".into());
//! let collaborators = Collaborators::from_config(&config, Arc::new(LogNotificationCenter::new()))?;
//! let manager = DownloadGroupManager::new(config, collaborators);
//! manager.rehydrate().await?;
//!
//! let request = EnqueueRequest::new("llama-8b", "Llama 8B", "org/llama-gguf")
//!     .with_file("llama-8b-q4-00001-of-00002.gguf");
//! manager.enqueue_group(request).await?;
//! ```

mod config;
mod live;
mod rehydrate;

pub use config::ManagerConfig;
pub use rehydrate::RehydrateReport;

use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DownloadError, DownloadResult};
use crate::notify::{NotificationBridge, NotificationCenter};
use crate::probe::{HttpSizeProber, SizeProber};
use crate::progress::{aggregate, GroupProgress, SubscriberRegistry, Subscription};
use crate::scheduler::{self, EventOutcome};
use crate::source::{HubResolver, UrlResolver};
use crate::split::{detect_split_file, expand_split_filename, MAX_SPLIT_PARTS};
use crate::state::{DownloadFileState, DownloadGroupState, DownloadStatus};
use crate::storage::{expected_total, FreeSpace, StorageGate, SystemFreeSpace};
use crate::store::{GroupStateStore, JsonGroupStore};
use crate::transfer::{
    self, HttpTransferBackend, TransferBackend, TransferEvent, TransferHandle, TransferPolicy,
    TransferRequest,
};
use live::LiveTransfers;

/// One logical file of an enqueue request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    /// Filename relative to the source root. A split filename expands to
    /// every part.
    pub filename: String,
    /// Display label, applied to every part.
    pub label: Option<String>,
}

impl FileRequest {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Request to download a group of files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueRequest {
    /// Stable group identifier. Re-enqueueing an id restarts that group.
    pub id: String,
    pub title: String,
    /// Repository the files are resolved against, e.g. `org/repo`.
    pub source_root: String,
    pub files: Vec<FileRequest>,
    /// Falls back to `ManagerConfig::wifi_only`.
    pub wifi_only: Option<bool>,
    /// Falls back to `ManagerConfig::default_concurrency`; clamped to
    /// `[1, MAX_GROUP_CONCURRENCY]`.
    pub concurrency: Option<usize>,
}

impl EnqueueRequest {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source_root: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source_root: source_root.into(),
            files: Vec::new(),
            wifi_only: None,
            concurrency: None,
        }
    }

    pub fn with_file(mut self, filename: impl Into<String>) -> Self {
        self.files.push(FileRequest::new(filename));
        self
    }

    pub fn with_file_request(mut self, file: FileRequest) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_wifi_only(mut self, wifi_only: bool) -> Self {
        self.wifi_only = Some(wifi_only);
        self
    }

    /// Reject requests that cannot describe a group.
    pub fn validate(&self) -> DownloadResult<()> {
        if self.id.trim().is_empty() {
            return Err(DownloadError::invalid("group id must not be empty"));
        }
        if self.title.trim().is_empty() {
            return Err(DownloadError::invalid("title must not be empty"));
        }
        if self.source_root.trim().is_empty() {
            return Err(DownloadError::invalid("source root must not be empty"));
        }
        if self.files.is_empty() {
            return Err(DownloadError::invalid("a group needs at least one file"));
        }
        if self.concurrency == Some(0) {
            return Err(DownloadError::invalid("concurrency must be at least 1"));
        }
        for file in &self.files {
            if !is_safe_filename(&file.filename) {
                return Err(DownloadError::invalid(format!(
                    "invalid filename '{}'",
                    file.filename
                )));
            }
            if let Some(info) = detect_split_file(&file.filename) {
                if info.total_parts > MAX_SPLIT_PARTS {
                    return Err(DownloadError::invalid(format!(
                        "'{}' names {} shards, at most {} are supported",
                        file.filename, info.total_parts, MAX_SPLIT_PARTS
                    )));
                }
            }
        }
        Ok(())
    }

    /// Physical filenames with their labels, split files expanded.
    ///
    /// The first occurrence of a physical name wins.
    pub fn physical_files(&self) -> BTreeMap<String, Option<String>> {
        let mut files = BTreeMap::new();
        for file in &self.files {
            for name in expand_split_filename(&file.filename) {
                files.entry(name).or_insert_with(|| file.label.clone());
            }
        }
        files
    }
}

/// Relative, non-empty, and never escaping the models directory.
fn is_safe_filename(filename: &str) -> bool {
    let path = Path::new(filename);
    !filename.trim().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Everything the manager delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn GroupStateStore>,
    pub backend: Arc<dyn TransferBackend>,
    pub prober: Arc<dyn SizeProber>,
    pub resolver: Arc<dyn UrlResolver>,
    pub notifications: Arc<dyn NotificationCenter>,
    pub free_space: Arc<dyn FreeSpace>,
}

impl Collaborators {
    /// Production collaborators: JSON records, HTTP transfers and probes
    /// against the configured host, and system free-space queries.
    pub fn from_config(
        config: &ManagerConfig,
        notifications: Arc<dyn NotificationCenter>,
    ) -> DownloadResult<Self> {
        let resolver: Arc<dyn UrlResolver> =
            Arc::new(HubResolver::new(config.base_url.clone(), config.revision.clone()));
        let prober = HttpSizeProber::new(Arc::clone(&resolver), config.probe_timeout)?;
        let backend = HttpTransferBackend::new(config.connect_timeout, config.resume_partial)?;

        Ok(Self {
            store: Arc::new(JsonGroupStore::new(&config.state_dir, config.namespace.clone())),
            backend: Arc::new(backend),
            prober: Arc::new(prober),
            resolver,
            notifications,
            free_space: Arc::new(SystemFreeSpace),
        })
    }
}

/// Shared state behind every `DownloadGroupManager` clone.
struct ManagerInner {
    config: ManagerConfig,
    store: Arc<dyn GroupStateStore>,
    backend: Arc<dyn TransferBackend>,
    prober: Arc<dyn SizeProber>,
    resolver: Arc<dyn UrlResolver>,
    storage: StorageGate,
    notifier: NotificationBridge,
    subscribers: Arc<SubscriberRegistry>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
    live: LiveTransfers,
    shutdown: CancellationToken,
    listener_installed: AtomicBool,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Orchestrates grouped downloads. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DownloadGroupManager {
    inner: Arc<ManagerInner>,
}

impl DownloadGroupManager {
    /// Create a manager. Call [`rehydrate`](Self::rehydrate) once before use
    /// to pick up transfers from a previous process.
    pub fn new(config: ManagerConfig, collaborators: Collaborators) -> Self {
        let notifier =
            NotificationBridge::new(collaborators.notifications, config.notification_interval);
        Self {
            inner: Arc::new(ManagerInner {
                storage: StorageGate::new(collaborators.free_space),
                store: collaborators.store,
                backend: collaborators.backend,
                prober: collaborators.prober,
                resolver: collaborators.resolver,
                notifier,
                subscribers: SubscriberRegistry::new(),
                locks: DashMap::new(),
                live: LiveTransfers::default(),
                shutdown: CancellationToken::new(),
                listener_installed: AtomicBool::new(false),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Create or restart a group and start its first transfers.
    ///
    /// Returns once the group is persisted and its first batch started.
    /// Only validation and store failures are errors; a failed probe means
    /// an unknown size, and low free space only raises an advisory.
    pub async fn enqueue_group(&self, request: EnqueueRequest) -> DownloadResult<String> {
        self.inner.enqueue_group(request).await
    }

    /// Pause a group's live transfers in place.
    pub async fn pause(&self, group_id: &str) -> DownloadResult<()> {
        self.inner.pause(group_id).await
    }

    /// Resume a paused group.
    pub async fn resume(&self, group_id: &str) -> DownloadResult<()> {
        self.inner.resume(group_id).await
    }

    /// Stop a group and discard its temporary files.
    pub async fn cancel(&self, group_id: &str) -> DownloadResult<()> {
        self.inner.cancel(group_id).await
    }

    /// Restart a group from its persisted description.
    pub async fn retry(&self, group_id: &str) -> DownloadResult<()> {
        self.inner.retry(group_id).await
    }

    /// Persisted status of a group; `Queued` for an unknown id.
    pub async fn status(&self, group_id: &str) -> DownloadResult<DownloadStatus> {
        Ok(self
            .inner
            .store
            .load(group_id)
            .await?
            .map(|g| g.status)
            .unwrap_or(DownloadStatus::Queued))
    }

    /// Snapshot of a group.
    pub async fn group(&self, group_id: &str) -> DownloadResult<Option<DownloadGroupState>> {
        self.inner.store.load(group_id).await
    }

    /// Snapshots of every persisted group.
    pub async fn list(&self) -> DownloadResult<Vec<DownloadGroupState>> {
        self.inner.store.load_all().await
    }

    /// Receive every progress update of a group until the subscription is
    /// dropped or released.
    pub fn subscribe<F>(&self, group_id: &str, callback: F) -> Subscription
    where
        F: Fn(&GroupProgress) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(group_id, Arc::new(callback))
    }

    /// Stop a group, delete its temporary files, its record and its
    /// notification. Returns whether a record existed.
    pub async fn remove(&self, group_id: &str) -> DownloadResult<bool> {
        self.inner.remove(group_id).await
    }

    /// Reattach transfers that outlived the previous process and install
    /// the notification action listener. Safe to call repeatedly.
    pub async fn rehydrate(&self) -> DownloadResult<RehydrateReport> {
        self.inner.rehydrate().await
    }

    /// Stop consuming transfer events without stopping the transfers, so a
    /// later process can recover them.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let pumps: Vec<JoinHandle<()>> = self
            .inner
            .live
            .take_all()
            .into_iter()
            .filter_map(|t| t.pump)
            .collect();
        for pump in pumps {
            let _ = pump.await;
        }
        info!("Download manager shut down");
    }
}

impl ManagerInner {
    async fn lock_group(&self, group_id: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.entry(group_id.to_string()).or_default().value());
        lock.lock_owned().await
    }

    /// Recompute, persist, publish, notify.
    async fn commit(&self, group: &mut DownloadGroupState) -> DownloadResult<()> {
        let progress = aggregate(group);
        group.touch();
        self.store.upsert(group).await?;
        self.subscribers.publish(&progress);
        self.notifier.submit(group);
        Ok(())
    }

    /// Commit a group whose transfers were just started. The new transfers
    /// are stopped again when the record cannot be written, so nothing runs
    /// that the store does not know about.
    async fn commit_started(
        &self,
        group: &mut DownloadGroupState,
        started: Vec<String>,
    ) -> DownloadResult<()> {
        let result = self.commit(group).await;
        if result.is_err() {
            for filename in started {
                if let Some(transfer) = self.live.take(&group.id, &filename) {
                    debug!(group_id = %group.id, filename = %filename, "Stopping unrecorded transfer");
                    transfer.stop();
                }
            }
        }
        result
    }

    /// Persist a timestamp refresh only.
    async fn refresh(&self, group: &mut DownloadGroupState) -> DownloadResult<()> {
        group.touch();
        self.store.upsert(group).await
    }

    async fn enqueue_group(self: &Arc<Self>, request: EnqueueRequest) -> DownloadResult<String> {
        request.validate()?;
        let files = request.physical_files();
        let filenames: Vec<String> = files.keys().cloned().collect();

        let sizes = self
            .prober
            .probe_sizes(&request.source_root, &filenames)
            .await;
        if let Some(warning) = self
            .storage
            .check(&self.config.models_dir, expected_total(&sizes))
        {
            self.notifier.warn_low_storage(&request.id, &warning);
        }

        let models_dir = &self.config.models_dir;
        tokio::fs::create_dir_all(models_dir)
            .await
            .map_err(|e| DownloadError::io(models_dir, e))?;

        let _guard = self.lock_group(&request.id).await;
        let replaced = self.stop_transfers(&request.id);
        if replaced > 0 {
            debug!(group_id = %request.id, replaced, "Stopped transfers of re-enqueued group");
        }

        let concurrency = scheduler::clamp_concurrency(
            request
                .concurrency
                .unwrap_or(self.config.default_concurrency),
        );
        let mut group = DownloadGroupState::new(
            request.id.clone(),
            request.title.clone(),
            request.source_root.clone(),
            request.wifi_only.unwrap_or(self.config.wifi_only),
            concurrency,
            files.into_iter().map(|(name, label)| {
                let total = sizes.get(&name).copied().unwrap_or(0);
                DownloadFileState::new(name, label, total)
            }),
        );
        if let Some(previous) = self.store.load(&request.id).await? {
            group.created_at = previous.created_at;
            group.updated_at = group.updated_at.max(previous.updated_at);
        }

        self.commit(&mut group).await?;

        group.status = DownloadStatus::Running;
        let started = self.fill_slots(&mut group);
        self.commit_started(&mut group, started).await?;

        info!(
            group_id = %group.id,
            files = group.files.len(),
            bytes = group.total_bytes,
            concurrency,
            "Enqueued download group"
        );
        Ok(group.id)
    }

    async fn pause(self: &Arc<Self>, group_id: &str) -> DownloadResult<()> {
        let _guard = self.lock_group(group_id).await;
        let Some(mut group) = self.store.load(group_id).await? else {
            debug!(group_id, "Pause of unknown group ignored");
            return Ok(());
        };
        match group.status {
            DownloadStatus::Paused => return self.refresh(&mut group).await,
            status if status.is_terminal() => return Ok(()),
            _ => {}
        }

        for control in self.live.controls(group_id) {
            control.pause();
        }
        for file in group.files.values_mut() {
            if matches!(file.status, DownloadStatus::Queued | DownloadStatus::Running) {
                file.set_status(DownloadStatus::Paused);
            }
        }
        group.status = DownloadStatus::Paused;
        self.commit(&mut group).await?;

        info!(group_id, "Paused download group");
        Ok(())
    }

    async fn resume(self: &Arc<Self>, group_id: &str) -> DownloadResult<()> {
        let _guard = self.lock_group(group_id).await;
        let Some(mut group) = self.store.load(group_id).await? else {
            debug!(group_id, "Resume of unknown group ignored");
            return Ok(());
        };
        if !matches!(group.status, DownloadStatus::Paused | DownloadStatus::Queued) {
            return Ok(());
        }

        let mut resumed = 0usize;
        for (filename, file) in group.files.iter_mut() {
            if file.status == DownloadStatus::Completed {
                continue;
            }
            match self.live.control(group_id, filename) {
                Some(control) => {
                    control.resume();
                    file.set_status(DownloadStatus::Running);
                    resumed += 1;
                }
                None => self.requeue(file),
            }
        }
        group.status = DownloadStatus::Running;
        let started = self.fill_slots(&mut group);
        self.commit_started(&mut group, started).await?;

        info!(group_id, resumed_in_place = resumed, "Resumed download group");
        Ok(())
    }

    async fn cancel(self: &Arc<Self>, group_id: &str) -> DownloadResult<()> {
        let _guard = self.lock_group(group_id).await;
        let Some(mut group) = self.store.load(group_id).await? else {
            debug!(group_id, "Cancel of unknown group ignored");
            return Ok(());
        };
        match group.status {
            DownloadStatus::Canceled => return self.refresh(&mut group).await,
            DownloadStatus::Completed => return Ok(()),
            _ => {}
        }

        self.stop_transfers(group_id);
        for file in group.files.values_mut() {
            file.set_status(DownloadStatus::Canceled);
        }
        group.status = DownloadStatus::Canceled;
        self.commit(&mut group).await?;
        self.discard_temp_files(&group).await;

        info!(group_id, "Canceled download group");
        Ok(())
    }

    async fn retry(self: &Arc<Self>, group_id: &str) -> DownloadResult<()> {
        let Some(group) = self.store.load(group_id).await? else {
            debug!(group_id, "Retry of unknown group ignored");
            return Ok(());
        };
        let request = EnqueueRequest {
            id: group.id.clone(),
            title: group.title.clone(),
            source_root: group.source_root.clone(),
            files: group
                .files
                .values()
                .map(|f| FileRequest {
                    filename: f.filename.clone(),
                    label: f.label.clone(),
                })
                .collect(),
            wifi_only: Some(group.wifi_only),
            concurrency: Some(group.concurrency),
        };
        info!(group_id, "Retrying download group");
        self.enqueue_group(request).await.map(|_| ())
    }

    async fn remove(self: &Arc<Self>, group_id: &str) -> DownloadResult<bool> {
        let _guard = self.lock_group(group_id).await;
        self.stop_transfers(group_id);
        if let Some(group) = self.store.load(group_id).await? {
            self.discard_temp_files(&group).await;
        }
        let removed = self.store.remove(group_id).await?;
        self.notifier.dismiss(group_id);
        if removed {
            info!(group_id, "Removed download group");
        }
        Ok(removed)
    }

    /// Start queued files while the group has free slots. Returns the files
    /// that were started.
    ///
    /// A running group always accepts new transfers. A failed group keeps
    /// draining its queue unless `halt_on_failure` is set.
    fn fill_slots(self: &Arc<Self>, group: &mut DownloadGroupState) -> Vec<String> {
        self.start_queued(group, None)
    }

    /// Like [`fill_slots`](Self::fill_slots), with `finishing` naming a
    /// transfer that just ended but is still registered.
    ///
    /// Running files that have no live transfer (left behind when an
    /// earlier update could not be recorded) are queued again first.
    fn start_queued(
        self: &Arc<Self>,
        group: &mut DownloadGroupState,
        finishing: Option<&str>,
    ) -> Vec<String> {
        let accepting = match group.status {
            DownloadStatus::Running => true,
            DownloadStatus::Failed => !self.config.halt_on_failure,
            _ => false,
        };
        if !accepting {
            return Vec::new();
        }

        for (filename, file) in group.files.iter_mut() {
            if file.status == DownloadStatus::Running && !self.live.contains(&group.id, filename) {
                debug!(group_id = %group.id, filename = %filename, "Requeueing orphaned file");
                self.requeue(file);
            }
        }

        let mut live = self.live.count(&group.id);
        if finishing.is_some_and(|f| self.live.contains(&group.id, f)) {
            live = live.saturating_sub(1);
        }
        let batch = scheduler::next_batch(group, live);
        for filename in &batch {
            self.start_file(group, filename);
        }
        batch
    }

    /// Queue a file for a fresh transfer. Its byte count only survives when
    /// the backend picks up from the partial file.
    fn requeue(&self, file: &mut DownloadFileState) {
        file.set_status(DownloadStatus::Queued);
        if !self.backend.supports_resume() {
            file.restart_progress();
        }
    }

    fn start_file(self: &Arc<Self>, group: &mut DownloadGroupState, filename: &str) {
        let request = TransferRequest {
            task_id: transfer::task_id(&group.id, filename),
            url: self.resolver.resolve(&group.source_root, filename),
            destination: scheduler::temp_path(&self.config.models_dir, filename),
            policy: TransferPolicy {
                wifi_only: group.wifi_only,
            },
        };
        debug!(group_id = %group.id, filename, url = %request.url, "Starting transfer");

        let handle = self.backend.start(request);
        self.attach(&group.id, filename, handle);
        if let Some(file) = group.files.get_mut(filename) {
            file.set_status(DownloadStatus::Running);
        }
    }

    /// Register a transfer and start consuming its events.
    fn attach(self: &Arc<Self>, group_id: &str, filename: &str, handle: TransferHandle) {
        let TransferHandle {
            control, events, ..
        } = handle;
        let (generation, previous) = self.live.insert(group_id, filename, control);
        if let Some(previous) = previous {
            previous.stop();
        }
        let pump = self.spawn_pump(group_id.to_string(), filename.to_string(), generation, events);
        self.live.set_pump(group_id, filename, generation, pump);
    }

    /// Forward a transfer's events into the group until it ends.
    ///
    /// A channel closing without a terminal event counts as a failure.
    fn spawn_pump(
        self: &Arc<Self>,
        group_id: String,
        filename: String,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<TransferEvent>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = events.recv() => next,
                };
                let terminal = next.as_ref().map(TransferEvent::is_terminal).unwrap_or(true);
                let event = next.unwrap_or_else(|| TransferEvent::Error {
                    message: "transfer ended without reporting a result".to_string(),
                });

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = inner
                    .handle_event(&group_id, &filename, generation, event)
                    .await
                {
                    warn!(group_id = %group_id, filename = %filename, error = %e, "Failed to record transfer event");
                }
                if terminal {
                    break;
                }
            }
        })
    }

    /// Record one transfer event. A terminal event keeps its transfer
    /// registered until the record is written, so the file cannot be left
    /// marked running with nothing behind it unless the write itself fails.
    async fn handle_event(
        self: &Arc<Self>,
        group_id: &str,
        filename: &str,
        generation: u64,
        event: TransferEvent,
    ) -> DownloadResult<()> {
        let _guard = self.lock_group(group_id).await;
        if !self.live.is_current(group_id, filename, generation) {
            debug!(group_id, filename, "Dropping event of detached transfer");
            return Ok(());
        }
        let terminal = event.is_terminal();
        let result = self.record_event(group_id, filename, event).await;
        if terminal {
            self.live.remove_if_current(group_id, filename, generation);
        }
        result
    }

    async fn record_event(
        self: &Arc<Self>,
        group_id: &str,
        filename: &str,
        event: TransferEvent,
    ) -> DownloadResult<()> {
        let Some(mut group) = self.store.load(group_id).await? else {
            return Ok(());
        };
        let outcome =
            scheduler::apply_event(&mut group, filename, event, &self.config.models_dir).await;
        let started = match outcome {
            EventOutcome::Ignored => return Ok(()),
            EventOutcome::Updated => Vec::new(),
            EventOutcome::Completed => self.start_queued(&mut group, Some(filename)),
            EventOutcome::Failed(_) => {
                if self.config.halt_on_failure {
                    self.halt_siblings(&mut group, filename);
                }
                self.start_queued(&mut group, Some(filename))
            }
        };
        self.commit_started(&mut group, started).await
    }

    /// Stop every live transfer of a failed group except `failed`, marking
    /// their files paused.
    fn halt_siblings(&self, group: &mut DownloadGroupState, failed: &str) {
        for transfer in self.live.take_group_except(&group.id, failed) {
            if let Some(file) = group.files.get_mut(&transfer.filename) {
                file.set_status(DownloadStatus::Paused);
            }
            debug!(group_id = %group.id, filename = %transfer.filename, "Halting sibling transfer");
            transfer.stop();
        }
    }

    /// Stop every live transfer of a group. Returns how many were stopped.
    fn stop_transfers(&self, group_id: &str) -> usize {
        let transfers = self.live.take_group(group_id);
        let count = transfers.len();
        for transfer in transfers {
            transfer.stop();
        }
        count
    }

    async fn discard_temp_files(&self, group: &DownloadGroupState) {
        for filename in group.files.keys() {
            let path = scheduler::temp_path(&self.config.models_dir, filename);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Deleted temp file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete temp file")
                }
            }
        }
    }
}
