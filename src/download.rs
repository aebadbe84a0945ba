//! Single-flight download queue
//!
//! [`DownloadQueue`] runs one transfer at a time. Requests wait in FIFO
//! order; a request whose destination is already queued or downloading is
//! ignored. All queue state lives in one worker task that consumes a command
//! channel, and transfer backends report back on that same channel, so the
//! queue only advances when the active transfer reaches a terminal state.
//!
//! Callers observe a transfer through the [`DownloadEvent`] channel attached
//! to its [`DownloadTask`].
//!
//! # Examples
//!
//! ```no_run
//! use sessionmm::download::{DownloadEvent, DownloadQueue, DownloadTask, HttpBackend};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = DownloadQueue::spawn(Arc::new(HttpBackend::new()));
//!
//! let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let task = DownloadTask::new("https://example.com/map.zip", "/tmp/map.zip").with_events(events_tx);
//! queue.enqueue(task).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

pub type TaskId = u64;

/// Minimum time between two speed recalculations
pub const SPEED_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

const CHUNK_SIZE: usize = 64 * 1024;

/// A transfer waiting in, or running at the head of, the queue
#[derive(Debug)]
pub struct DownloadTask {
    pub url: String,
    pub destination: PathBuf,
    events: Option<mpsc::UnboundedSender<DownloadEvent>>,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            events: None,
        }
    }

    /// Send this task's progress and terminal events to `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<DownloadEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(events) = &self.events {
            // Receiver gone means nobody is listening
            let _ = events.send(event);
        }
    }
}

/// Notifications delivered to a task's event channel
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Started(TaskId),
    Progress {
        received: u64,
        total: Option<u64>,
        speed_kbps: f64,
    },
    Completed(PathBuf),
    Failed(String),
    Cancelled,
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        self.final_state().is_some()
    }

    /// State a task ends in after this event, if the event is terminal
    pub fn final_state(&self) -> Option<TaskState> {
        match self {
            DownloadEvent::Completed(_) => Some(TaskState::Complete),
            DownloadEvent::Failed(_) => Some(TaskState::Error),
            DownloadEvent::Cancelled => Some(TaskState::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Active,
    Complete,
    Error,
    Cancelled,
}

/// Point-in-time view of one queued task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub url: String,
    pub destination: PathBuf,
    pub state: TaskState,
    pub received: u64,
    pub total: Option<u64>,
}

/// Cooperative cancellation flag shared with a running transfer
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a backend needs to perform one transfer
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub id: TaskId,
    pub url: String,
    pub destination: PathBuf,
}

/// Reports raised by a transfer backend
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    Progress { received: u64, total: Option<u64> },
    Completed,
    Failed(String),
    Cancelled,
}

/// Channel a backend reports through. [`TransferSink::finish`] consumes the
/// sink, so a transfer raises exactly one terminal event.
#[derive(Debug)]
pub struct TransferSink {
    id: TaskId,
    commands: mpsc::UnboundedSender<QueueCommand>,
}

impl TransferSink {
    pub fn progress(&self, received: u64, total: Option<u64>) {
        self.send(TransferEvent::Progress { received, total });
    }

    pub fn finish(self, event: TransferEvent) {
        self.send(event);
    }

    fn send(&self, event: TransferEvent) {
        let _ = self.commands.send(QueueCommand::Transfer { id: self.id, event });
    }
}

/// Performs the actual byte transfer for a queued task
pub trait TransferBackend: Send + Sync + 'static {
    /// Begin the transfer and return its cancel hook. The backend must
    /// eventually call [`TransferSink::finish`], including after a cancel.
    fn start(&self, request: TransferRequest, sink: TransferSink) -> CancelHandle;
}

/// Throttled transfer speed in KB/s
#[derive(Debug, Clone)]
pub struct SpeedMeter {
    last_bytes: u64,
    last_sample: Instant,
    speed_kbps: f64,
}

impl SpeedMeter {
    pub fn new(now: Instant) -> Self {
        Self {
            last_bytes: 0,
            last_sample: now,
            speed_kbps: 0.0,
        }
    }

    /// Current speed, recomputed only once [`SPEED_SAMPLE_INTERVAL`] has passed
    /// since the previous recomputation
    pub fn sample(&mut self, received: u64, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_sample);
        if elapsed >= SPEED_SAMPLE_INTERVAL {
            let delta = received.saturating_sub(self.last_bytes) as f64;
            self.speed_kbps = delta / 1024.0 / elapsed.as_secs_f64();
            self.last_bytes = received;
            self.last_sample = now;
        }
        self.speed_kbps
    }

    pub fn speed_kbps(&self) -> f64 {
        self.speed_kbps
    }
}

#[derive(Debug)]
pub enum QueueCommand {
    Enqueue {
        task: DownloadTask,
        reply: oneshot::Sender<Option<TaskId>>,
    },
    Cancel {
        id: TaskId,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<TaskSnapshot>>,
    },
    Transfer {
        id: TaskId,
        event: TransferEvent,
    },
}

/// Handle to the queue worker. Cheap to clone; the worker stops once every
/// handle is dropped and no transfer is running.
#[derive(Debug, Clone)]
pub struct DownloadQueue {
    commands: mpsc::UnboundedSender<QueueCommand>,
}

impl DownloadQueue {
    /// Start the worker on the current tokio runtime
    pub fn spawn(backend: Arc<dyn TransferBackend>) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let worker = QueueWorker {
            backend,
            entries: VecDeque::new(),
            next_id: 1,
            commands: commands.downgrade(),
        };
        tokio::spawn(worker.run(receiver));
        Self { commands }
    }

    /// Add `task` to the queue. Returns `None` when a task for the same
    /// destination is already queued or running.
    pub async fn enqueue(&self, task: DownloadTask) -> Result<Option<TaskId>> {
        let (reply, response) = oneshot::channel();
        self.send(QueueCommand::Enqueue { task, reply })?;
        response.await.map_err(|_| worker_gone())
    }

    /// Cancel a task. A queued task is dropped at once; the running task is
    /// asked to stop and leaves the queue when its backend confirms.
    pub async fn cancel(&self, id: TaskId) -> Result<bool> {
        let (reply, response) = oneshot::channel();
        self.send(QueueCommand::Cancel { id, reply })?;
        response.await.map_err(|_| worker_gone())
    }

    pub async fn snapshot(&self) -> Result<Vec<TaskSnapshot>> {
        let (reply, response) = oneshot::channel();
        self.send(QueueCommand::Snapshot { reply })?;
        response.await.map_err(|_| worker_gone())
    }

    fn send(&self, command: QueueCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| worker_gone())
    }
}

fn worker_gone() -> Error {
    Error::Other("Download queue is no longer running".to_string())
}

struct QueueEntry {
    id: TaskId,
    task: DownloadTask,
    state: TaskState,
    cancel: Option<CancelHandle>,
    received: u64,
    total: Option<u64>,
    meter: SpeedMeter,
}

struct QueueWorker {
    backend: Arc<dyn TransferBackend>,
    /// Head is the only entry that can be active
    entries: VecDeque<QueueEntry>,
    next_id: TaskId,
    commands: mpsc::WeakUnboundedSender<QueueCommand>,
}

impl QueueWorker {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<QueueCommand>) {
        while let Some(command) = receiver.recv().await {
            match command {
                QueueCommand::Enqueue { task, reply } => {
                    let id = self.enqueue(task);
                    let _ = reply.send(id);
                }
                QueueCommand::Cancel { id, reply } => {
                    let found = self.cancel(id);
                    let _ = reply.send(found);
                }
                QueueCommand::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                QueueCommand::Transfer { id, event } => self.on_transfer_event(id, event),
            }
        }
        tracing::debug!("Download queue worker stopped");
    }

    fn enqueue(&mut self, task: DownloadTask) -> Option<TaskId> {
        if self
            .entries
            .iter()
            .any(|e| e.task.destination == task.destination)
        {
            tracing::debug!(
                "Ignoring duplicate download for {}",
                task.destination.display()
            );
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;

        let was_empty = self.entries.is_empty();
        self.entries.push_back(QueueEntry {
            id,
            task,
            state: TaskState::Queued,
            cancel: None,
            received: 0,
            total: None,
            meter: SpeedMeter::new(Instant::now()),
        });

        if was_empty {
            self.start_head();
        }
        Some(id)
    }

    fn start_head(&mut self) {
        let Some(commands) = self.commands.upgrade() else {
            // Every handle is gone; nothing will observe further transfers
            while let Some(entry) = self.entries.pop_front() {
                entry.task.emit(DownloadEvent::Cancelled);
            }
            return;
        };

        let Some(head) = self.entries.front_mut() else {
            return;
        };

        let request = TransferRequest {
            id: head.id,
            url: head.task.url.clone(),
            destination: head.task.destination.clone(),
        };
        let sink = TransferSink {
            id: head.id,
            commands,
        };

        tracing::info!("Starting download {} -> {}", request.url, request.destination.display());
        head.state = TaskState::Active;
        head.meter = SpeedMeter::new(Instant::now());
        head.task.emit(DownloadEvent::Started(head.id));
        head.cancel = Some(self.backend.start(request, sink));
    }

    fn cancel(&mut self, id: TaskId) -> bool {
        let Some(index) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };

        let entry = &self.entries[index];
        if entry.state == TaskState::Active {
            if let Some(handle) = &entry.cancel {
                handle.cancel();
            }
        } else if let Some(entry) = self.entries.remove(index) {
            tracing::info!("Cancelled queued download {}", entry.task.url);
            entry.task.emit(DownloadEvent::Cancelled);
        }
        true
    }

    fn on_transfer_event(&mut self, id: TaskId, event: TransferEvent) {
        let Some(head) = self.entries.front_mut() else {
            return;
        };
        if head.id != id || head.state != TaskState::Active {
            tracing::debug!("Ignoring event for inactive download {}", id);
            return;
        }

        let terminal = match event {
            TransferEvent::Progress { received, total } => {
                head.received = received;
                head.total = total;
                let speed_kbps = head.meter.sample(received, Instant::now());
                head.task.emit(DownloadEvent::Progress {
                    received,
                    total,
                    speed_kbps,
                });
                return;
            }
            TransferEvent::Completed => {
                tracing::info!("Download complete: {}", head.task.destination.display());
                DownloadEvent::Completed(head.task.destination.clone())
            }
            TransferEvent::Failed(message) => {
                tracing::warn!("Download failed for {}: {}", head.task.url, message);
                DownloadEvent::Failed(message)
            }
            TransferEvent::Cancelled => {
                tracing::info!("Download cancelled: {}", head.task.url);
                DownloadEvent::Cancelled
            }
        };

        if let Some(entry) = self.entries.pop_front() {
            entry.task.emit(terminal);
        }

        if !self.entries.is_empty() {
            self.start_head();
        }
    }

    fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.entries
            .iter()
            .map(|e| TaskSnapshot {
                id: e.id,
                url: e.task.url.clone(),
                destination: e.task.destination.clone(),
                state: e.state,
                received: e.received,
                total: e.total,
            })
            .collect()
    }
}

// ============================================================================
// HTTP backend
// ============================================================================

/// Streams `http(s)` URLs to disk on the blocking thread pool.
///
/// Bytes go to a `.part` sibling that replaces the destination only once the
/// transfer completes, so a failed transfer leaves an existing file alone.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    user_agent: String,
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpBackend {
    pub fn new() -> Self {
        Self {
            user_agent: format!("sessionmm/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransferBackend for HttpBackend {
    fn start(&self, request: TransferRequest, sink: TransferSink) -> CancelHandle {
        let cancel = CancelHandle::new();
        let flag = cancel.clone();
        let user_agent = self.user_agent.clone();

        tokio::task::spawn_blocking(move || {
            let result = download_blocking(&request, &user_agent, &flag, &sink);

            let outcome = match result {
                Ok(()) => TransferEvent::Completed,
                Err(_) if flag.is_cancelled() => TransferEvent::Cancelled,
                Err(e) => TransferEvent::Failed(e.to_string()),
            };

            let partial = partial_path(&request.destination);
            if outcome != TransferEvent::Completed && partial.exists() {
                if let Err(e) = fs::remove_file(&partial) {
                    tracing::warn!(
                        "Failed to remove partial download {}: {}",
                        partial.display(),
                        e
                    );
                }
            }

            sink.finish(outcome);
        });

        cancel
    }
}

/// Check that `url` is an absolute http(s) URL
pub fn validate_url(url: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url)?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(Error::Other(format!(
            "Unsupported URL scheme '{}' (expected http or https)",
            scheme
        ))),
    }
}

fn download_blocking(
    request: &TransferRequest,
    user_agent: &str,
    cancel: &CancelHandle,
    sink: &TransferSink,
) -> Result<()> {
    let url = validate_url(&request.url)?;

    if let Some(parent) = request.destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let client = reqwest::blocking::Client::builder()
        .user_agent(user_agent)
        .build()?;

    let mut response = client.get(url).send().map_err(|e| {
        if e.is_connect() {
            Error::Other(format!("Cannot connect to {}", request.url))
        } else if e.is_timeout() {
            Error::Other("Download timed out. Please try again.".to_string())
        } else {
            Error::Other(format!("Failed to download: {}", e))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Other(format!(
            "Download failed: HTTP {}",
            status.as_u16()
        )));
    }

    let total = response.content_length();
    let partial = partial_path(&request.destination);
    let mut file = File::create(&partial)?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut received: u64 = 0;
    sink.progress(0, total);

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Other("Download cancelled".to_string()));
        }

        let read = response.read(&mut buffer)?;
        if read == 0 {
            break;
        }

        file.write_all(&buffer[..read])?;
        received += read as u64;
        sink.progress(received, total);
    }

    file.flush()?;
    drop(file);
    fs::rename(&partial, &request.destination)?;
    Ok(())
}

/// Sibling file a transfer streams into until it completes
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}
