//! HTTP transfer backend with range-based resume.
//!
//! Each transfer runs as its own Tokio task that streams the response body
//! into the temporary path. When a partial file exists and resume is
//! enabled, the request carries `Range: bytes=<len>-`:
//!
//! - `206 Partial Content` appends to the partial file
//! - `200 OK` means the server ignored the range; the file is rewritten
//! - `416 Range Not Satisfiable` on a non-empty partial file means the
//!   partial file already holds every byte
//!
//! Transfers are owned by the backend, not by whoever consumes the events.
//! When a consumer goes away the task keeps running and can be handed to a
//! new consumer through [`TransferBackend::recover`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::DownloadResult;
use crate::probe::parse_content_range_total;
use crate::transfer::{
    TransferBackend, TransferControl, TransferEvent, TransferHandle, TransferRequest,
};
use crate::BoxFuture;

/// Default connect timeout for transfer requests.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bytes written between two progress events.
const PROGRESS_STEP: u64 = 1024 * 1024;

/// Pause/stop signals of one transfer task.
struct HttpControl {
    paused: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl TransferControl for HttpControl {
    fn pause(&self) {
        self.paused.send_replace(true);
    }

    fn resume(&self) {
        self.paused.send_replace(false);
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

/// A running transfer and the current consumer of its events.
struct TaskEntry {
    control: Arc<HttpControl>,
    sink: Mutex<mpsc::UnboundedSender<TransferEvent>>,
}

impl TaskEntry {
    fn emit(&self, event: TransferEvent) {
        // A detached task keeps running; its events are dropped until recovered
        let _ = self.sink.lock().send(event);
    }
}

/// Transfer backend streaming files over HTTP.
#[derive(Clone)]
pub struct HttpTransferBackend {
    client: Client,
    resume_partial: bool,
    tasks: Arc<DashMap<String, Arc<TaskEntry>>>,
}

impl HttpTransferBackend {
    /// Create a backend.
    ///
    /// Only the connect phase is bounded by `connect_timeout`; body
    /// streaming of multi-gigabyte files has no overall deadline.
    pub fn new(connect_timeout: Duration, resume_partial: bool) -> DownloadResult<Self> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self::with_client(client, resume_partial))
    }

    /// Create a backend sharing an existing HTTP client.
    pub fn with_client(client: Client, resume_partial: bool) -> Self {
        Self {
            client,
            resume_partial,
            tasks: Arc::new(DashMap::new()),
        }
    }

    /// Number of transfers currently running.
    pub fn live_count(&self) -> usize {
        self.tasks.len()
    }
}

impl TransferBackend for HttpTransferBackend {
    fn start(&self, request: TransferRequest) -> TransferHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (paused, _) = watch::channel(false);
        let control = Arc::new(HttpControl {
            paused,
            cancel: CancellationToken::new(),
        });
        let entry = Arc::new(TaskEntry {
            control: Arc::clone(&control),
            sink: Mutex::new(tx),
        });

        if let Some(previous) = self
            .tasks
            .insert(request.task_id.clone(), Arc::clone(&entry))
        {
            tracing::debug!(task_id = %request.task_id, "Replacing live transfer");
            previous.control.stop();
        }

        let task_id = request.task_id.clone();
        tokio::spawn(run_transfer(
            self.client.clone(),
            request,
            entry,
            Arc::clone(&self.tasks),
            self.resume_partial,
        ));

        TransferHandle {
            task_id,
            control,
            events: rx,
        }
    }

    fn recover(&self) -> BoxFuture<'_, Vec<TransferHandle>> {
        Box::pin(async move {
            let mut handles = Vec::new();
            for item in self.tasks.iter() {
                let entry = item.value();
                let mut sink = entry.sink.lock();
                if !sink.is_closed() {
                    continue;
                }
                let (tx, rx) = mpsc::unbounded_channel();
                *sink = tx;
                handles.push(TransferHandle {
                    task_id: item.key().clone(),
                    control: Arc::clone(&entry.control) as Arc<dyn TransferControl>,
                    events: rx,
                });
            }
            handles
        })
    }

    fn supports_resume(&self) -> bool {
        self.resume_partial
    }
}

async fn run_transfer(
    client: Client,
    request: TransferRequest,
    entry: Arc<TaskEntry>,
    tasks: Arc<DashMap<String, Arc<TaskEntry>>>,
    resume_partial: bool,
) {
    let cancel = entry.control.cancel.clone();
    let outcome = tokio::select! {
        _ = cancel.cancelled() => None,
        result = transfer(&client, &request, &entry, resume_partial) => Some(result),
    };

    match outcome {
        None => tracing::debug!(task_id = %request.task_id, "Transfer stopped"),
        Some(Ok(written)) => {
            tracing::debug!(task_id = %request.task_id, bytes = written, "Transfer finished");
            entry.emit(TransferEvent::Done);
        }
        Some(Err(message)) => {
            tracing::warn!(task_id = %request.task_id, error = %message, "Transfer failed");
            entry.emit(TransferEvent::Error { message });
        }
    }

    tasks.remove_if(&request.task_id, |_, current| Arc::ptr_eq(current, &entry));
}

/// Stream one file to its temporary path. Returns the final byte count.
async fn transfer(
    client: &Client,
    request: &TransferRequest,
    entry: &TaskEntry,
    resume_partial: bool,
) -> Result<u64, String> {
    let dest = &request.destination;
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
    }

    let mut existing = if resume_partial {
        partial_len(dest).await
    } else {
        0
    };

    // At most two rounds: a partial file that cannot belong to the remote
    // file is discarded and the request repeated without a range.
    let (response, resuming) = loop {
        let mut builder = client.get(&request.url);
        if existing > 0 {
            tracing::debug!(task_id = %request.task_id, offset = existing, "Resuming partial file");
            builder = builder.header(RANGE, format!("bytes={}-", existing));
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE && existing > 0 {
            let total = content_range_total(&response).unwrap_or(existing);
            if total == existing {
                entry.emit(TransferEvent::Begin {
                    expected_bytes: total,
                });
                entry.emit(TransferEvent::Progress {
                    written: existing,
                    total,
                });
                return Ok(existing);
            }
            tracing::warn!(
                task_id = %request.task_id,
                partial = existing,
                remote = total,
                "Partial file does not match remote size, restarting from zero"
            );
            discard_partial(dest).await?;
            existing = 0;
            continue;
        }

        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        let resuming = existing > 0 && status == StatusCode::PARTIAL_CONTENT;
        if resuming {
            if let Some(total) = content_range_total(&response).filter(|t| *t < existing) {
                tracing::warn!(
                    task_id = %request.task_id,
                    partial = existing,
                    remote = total,
                    "Partial file is larger than remote file, restarting from zero"
                );
                discard_partial(dest).await?;
                existing = 0;
                continue;
            }
        }
        if existing > 0 && !resuming {
            tracing::warn!(task_id = %request.task_id, "Server ignored range request, restarting from zero");
        }
        break (response, resuming);
    };

    let total = if resuming {
        content_range_total(&response)
            .or_else(|| response.content_length().map(|len| existing + len))
            .unwrap_or(0)
    } else {
        response.content_length().unwrap_or(0)
    };

    let mut file = if resuming {
        tokio::fs::OpenOptions::new().append(true).open(dest).await
    } else {
        tokio::fs::File::create(dest).await
    }
    .map_err(|e| format!("failed to open {}: {}", dest.display(), e))?;

    let mut written = if resuming { existing } else { 0 };
    entry.emit(TransferEvent::Begin {
        expected_bytes: total,
    });
    if written > 0 {
        entry.emit(TransferEvent::Progress { written, total });
    }

    let mut paused = entry.control.paused.subscribe();
    let mut last_reported = written;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        wait_while_paused(&mut paused).await;

        let chunk = chunk.map_err(|e| format!("download stream error: {}", e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("failed to write {}: {}", dest.display(), e))?;
        written += chunk.len() as u64;

        if written - last_reported >= PROGRESS_STEP {
            tracing::trace!(task_id = %request.task_id, bytes = written, "Transfer progress");
            entry.emit(TransferEvent::Progress { written, total });
            last_reported = written;
        }
    }

    file.flush()
        .await
        .map_err(|e| format!("failed to flush {}: {}", dest.display(), e))?;

    if written != last_reported {
        entry.emit(TransferEvent::Progress { written, total });
    }
    Ok(written)
}

fn content_range_total(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
}

async fn discard_partial(path: &Path) -> Result<(), String> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(format!("failed to discard {}: {}", path.display(), e)),
    }
}

async fn partial_len(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .unwrap_or(0)
}

async fn wait_while_paused(paused: &mut watch::Receiver<bool>) {
    loop {
        let is_paused = *paused.borrow_and_update();
        if !is_paused {
            return;
        }
        if paused.changed().await.is_err() {
            return;
        }
    }
}
