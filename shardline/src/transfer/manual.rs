//! Caller-driven transfer backend.
//!
//! Nothing is downloaded. The caller pushes events for a task id and
//! inspects which transfers were started and which controls were invoked.
//! Tasks outlive their consumers just like real background transfers, so a
//! second manager sharing the backend can recover them.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::transfer::{
    TransferBackend, TransferControl, TransferEvent, TransferHandle, TransferRequest,
};
use crate::BoxFuture;

/// A control call recorded by [`ManualTransferBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCall {
    Pause,
    Resume,
    Stop,
}

#[derive(Default)]
struct ManualControl {
    calls: Mutex<Vec<ControlCall>>,
}

impl TransferControl for ManualControl {
    fn pause(&self) {
        self.calls.lock().push(ControlCall::Pause);
    }

    fn resume(&self) {
        self.calls.lock().push(ControlCall::Resume);
    }

    fn stop(&self) {
        self.calls.lock().push(ControlCall::Stop);
    }
}

impl ManualControl {
    fn stopped(&self) -> bool {
        self.calls.lock().contains(&ControlCall::Stop)
    }
}

struct ManualTask {
    destination: PathBuf,
    control: Arc<ManualControl>,
    sink: mpsc::UnboundedSender<TransferEvent>,
    finished: bool,
}

/// Transfer backend whose events are driven by the caller.
#[derive(Default)]
pub struct ManualTransferBackend {
    tasks: DashMap<String, ManualTask>,
    started: Mutex<Vec<TransferRequest>>,
    resume_support: bool,
}

impl ManualTransferBackend {
    /// Create a backend without resume support.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reported resume capability.
    pub fn with_resume_support(mut self, supported: bool) -> Self {
        self.resume_support = supported;
        self
    }

    /// Register a live task with no consumer, as if it survived a restart.
    pub fn add_survivor(&self, task_id: impl Into<String>, destination: impl Into<PathBuf>) {
        let (tx, _) = mpsc::unbounded_channel();
        self.tasks.insert(
            task_id.into(),
            ManualTask {
                destination: destination.into(),
                control: Arc::new(ManualControl::default()),
                sink: tx,
                finished: false,
            },
        );
    }

    /// Push an event to a task's current consumer.
    ///
    /// Returns `false` when the task is unknown, finished, stopped or has no
    /// consumer. A terminal event finishes the task.
    pub fn emit(&self, task_id: &str, event: TransferEvent) -> bool {
        let Some(mut task) = self.tasks.get_mut(task_id) else {
            return false;
        };
        if task.finished || task.control.stopped() {
            return false;
        }
        if event.is_terminal() {
            task.finished = true;
        }
        task.sink.send(event).is_ok()
    }

    /// Emit `Begin`.
    pub fn begin(&self, task_id: &str, expected_bytes: u64) -> bool {
        self.emit(task_id, TransferEvent::Begin { expected_bytes })
    }

    /// Emit `Progress`.
    pub fn progress(&self, task_id: &str, written: u64, total: u64) -> bool {
        self.emit(task_id, TransferEvent::Progress { written, total })
    }

    /// Write `bytes` bytes to the task's destination, then emit `Done`.
    pub fn complete(&self, task_id: &str, bytes: usize) -> std::io::Result<bool> {
        let destination = match self.tasks.get(task_id) {
            Some(task) => task.destination.clone(),
            None => return Ok(false),
        };
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&destination, vec![0u8; bytes])?;
        Ok(self.emit(task_id, TransferEvent::Done))
    }

    /// Emit `Error`.
    pub fn fail(&self, task_id: &str, message: &str) -> bool {
        self.emit(
            task_id,
            TransferEvent::Error {
                message: message.to_string(),
            },
        )
    }

    /// Every start request so far, in order.
    pub fn started(&self) -> Vec<TransferRequest> {
        self.started.lock().clone()
    }

    /// Task ids started so far, in order.
    pub fn started_ids(&self) -> Vec<String> {
        self.started.lock().iter().map(|r| r.task_id.clone()).collect()
    }

    /// Control calls made on a task.
    pub fn control_calls(&self, task_id: &str) -> Vec<ControlCall> {
        self.tasks
            .get(task_id)
            .map(|t| t.control.calls.lock().clone())
            .unwrap_or_default()
    }

    /// Tasks that are neither finished nor stopped.
    pub fn live_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .tasks
            .iter()
            .filter(|t| !t.finished && !t.control.stopped())
            .map(|t| t.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Whether the task currently has an attached consumer.
    pub fn is_attached(&self, task_id: &str) -> bool {
        self.tasks
            .get(task_id)
            .map(|t| !t.sink.is_closed())
            .unwrap_or(false)
    }
}

impl TransferBackend for ManualTransferBackend {
    fn start(&self, request: TransferRequest) -> TransferHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let control = Arc::new(ManualControl::default());

        self.started.lock().push(request.clone());
        if let Some(previous) = self.tasks.insert(
            request.task_id.clone(),
            ManualTask {
                destination: request.destination.clone(),
                control: Arc::clone(&control),
                sink: tx,
                finished: false,
            },
        ) {
            previous.control.stop();
        }

        TransferHandle {
            task_id: request.task_id,
            control,
            events: rx,
        }
    }

    fn recover(&self) -> BoxFuture<'_, Vec<TransferHandle>> {
        Box::pin(async move {
            let mut handles = Vec::new();
            for mut task in self.tasks.iter_mut() {
                if task.finished || task.control.stopped() || !task.sink.is_closed() {
                    continue;
                }
                let (tx, rx) = mpsc::unbounded_channel();
                task.sink = tx;
                handles.push(TransferHandle {
                    task_id: task.key().clone(),
                    control: Arc::clone(&task.control) as Arc<dyn TransferControl>,
                    events: rx,
                });
            }
            handles.sort_by(|a, b| a.task_id.cmp(&b.task_id));
            handles
        })
    }

    fn supports_resume(&self) -> bool {
        self.resume_support
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::TransferPolicy;

    fn request(id: &str) -> TransferRequest {
        TransferRequest {
            task_id: id.to_string(),
            url: format!("http://example.invalid/{}", id),
            destination: PathBuf::from(format!("/tmp/{}.tmp", id)),
            policy: TransferPolicy::default(),
        }
    }

    #[tokio::test]
    async fn test_events_reach_consumer() {
        let backend = ManualTransferBackend::new();
        let mut handle = backend.start(request("t1"));

        assert!(backend.begin("t1", 10));
        assert!(backend.progress("t1", 5, 10));
        assert!(backend.fail("t1", "boom"));
        assert!(!backend.progress("t1", 6, 10));

        assert_eq!(
            handle.events.recv().await,
            Some(TransferEvent::Begin { expected_bytes: 10 })
        );
        assert_eq!(
            handle.events.recv().await,
            Some(TransferEvent::Progress {
                written: 5,
                total: 10
            })
        );
        assert!(matches!(
            handle.events.recv().await,
            Some(TransferEvent::Error { .. })
        ));
    }

    #[tokio::test]
    async fn test_controls_are_recorded() {
        let backend = ManualTransferBackend::new();
        let handle = backend.start(request("t1"));
        handle.control.pause();
        handle.control.resume();
        handle.control.stop();

        assert_eq!(
            backend.control_calls("t1"),
            vec![ControlCall::Pause, ControlCall::Resume, ControlCall::Stop]
        );
        assert!(backend.live_ids().is_empty());
        assert!(!backend.begin("t1", 1));
    }

    #[tokio::test]
    async fn test_recover_detached_tasks_once() {
        let backend = ManualTransferBackend::new();
        let handle = backend.start(request("t1"));
        let _kept = backend.start(request("t2"));
        backend.add_survivor("t3", "/tmp/t3.tmp");

        drop(handle);
        let recovered = backend.recover().await;
        let ids: Vec<_> = recovered.iter().map(|h| h.task_id.clone()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);
        assert!(backend.recover().await.is_empty());
        assert!(backend.is_attached("t1"));
    }

    #[tokio::test]
    async fn test_restart_replaces_and_stops_previous() {
        let backend = ManualTransferBackend::new();
        let first = backend.start(request("t1"));
        let _second = backend.start(request("t1"));

        drop(first);
        assert_eq!(backend.started_ids(), vec!["t1", "t1"]);
        assert_eq!(backend.live_ids(), vec!["t1"]);
    }
}
