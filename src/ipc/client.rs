//! RPC client for the document worker process.
//!
//! `RpcClient` owns the worker's lifecycle and the table of pending
//! requests. Requests are queued to a writer task and never block the
//! caller; responses are read by a background task, framed, and matched to
//! their pending entry by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::Child;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::ipc::framing::{read_messages, write_message};
use crate::ipc::protocol::{RpcRequest, RpcResponse};
use crate::ipc::worker::{WorkerLocator, WorkerState};

/// Default timeout for [`RpcClient::call_sync`] in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Outcome of a single request.
pub type RpcResult = Result<Value, RpcError>;

/// Completion callback registered for a pending request.
pub type RpcCallback = Box<dyn FnOnce(RpcResult) + Send + 'static>;

/// Transport, process and RPC-level errors.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The worker script or executable could not be located.
    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    /// Spawning the worker failed.
    #[error("Failed to launch worker: {0}")]
    LaunchFailed(#[source] std::io::Error),

    /// The worker is not running and the request could not be sent.
    #[error("Worker is not running")]
    WorkerNotRunning,

    /// The worker exited or was stopped before answering.
    #[error("Worker exited before responding")]
    WorkerExited { exit_code: Option<i32> },

    /// No response arrived in time.
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// The worker sent something that is not a valid response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The response carried an `error` object.
    #[error("Worker error: {message}")]
    Server { code: Option<i64>, message: String },

    /// Writing to the worker failed.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

/// Anything that can carry worker requests.
///
/// The sync controller depends on this trait rather than on [`RpcClient`]
/// so tests can substitute a scripted implementation.
pub trait RpcService: Send + Sync {
    /// Send `method` with `params`; `callback` receives exactly one result.
    fn call(&self, method: &str, params: Value, callback: RpcCallback);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pending requests keyed by id.
#[derive(Default)]
struct PendingTable {
    entries: HashMap<u64, RpcCallback>,
}

impl PendingTable {
    fn insert(&mut self, id: u64, callback: RpcCallback) {
        self.entries.insert(id, callback);
    }

    fn remove(&mut self, id: u64) -> Option<RpcCallback> {
        self.entries.remove(&id)
    }

    fn drain(&mut self) -> Vec<RpcCallback> {
        self.entries.drain().map(|(_, cb)| cb).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Mutable worker bookkeeping shared with the supervisor task.
#[derive(Default)]
struct WorkerSlot {
    state: WorkerState,
    /// Bumped on every launch so a stale exit event is ignored.
    generation: u64,
    writer: Option<mpsc::UnboundedSender<RpcRequest>>,
    kill: Option<oneshot::Sender<()>>,
}

type ExitListener = Arc<dyn Fn(Option<i32>) + Send + Sync>;

/// Client for the document worker.
///
/// # Example
///
/// ```ignore
/// let client = RpcClient::new(WorkerLocator::new(None, "python3"), Handle::current());
/// let reply = client.call_sync("revision", json!({"doc_id": "abc"})).await?;
/// ```
pub struct RpcClient {
    locator: WorkerLocator,
    runtime: Handle,
    /// Monotonically increasing request ID counter, never reset.
    next_id: AtomicU64,
    timeout: Duration,
    pending: Arc<Mutex<PendingTable>>,
    worker: Arc<Mutex<WorkerSlot>>,
    exit_listener: Arc<Mutex<Option<ExitListener>>>,
}

impl RpcClient {
    /// Create a client. The worker is started lazily on the first call.
    ///
    /// `runtime` hosts the reader, writer and supervisor tasks, so the
    /// client can be driven from a thread that is not itself async.
    pub fn new(locator: WorkerLocator, runtime: Handle) -> Self {
        Self {
            locator,
            runtime,
            next_id: AtomicU64::new(1),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            pending: Arc::new(Mutex::new(PendingTable::default())),
            worker: Arc::new(Mutex::new(WorkerSlot::default())),
            exit_listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Set the default timeout used by [`RpcClient::call_sync`].
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Register a listener for abnormal worker exits (non-zero or signalled).
    pub fn set_exit_listener(&self, listener: impl Fn(Option<i32>) + Send + Sync + 'static) {
        *lock(&self.exit_listener) = Some(Arc::new(listener));
    }

    /// Current lifecycle state of the worker.
    pub fn worker_state(&self) -> WorkerState {
        lock(&self.worker).state
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Start the worker unless it is already running.
    pub fn ensure_worker_running(&self) -> Result<(), RpcError> {
        let mut slot = lock(&self.worker);
        if slot.state.is_running() {
            return Ok(());
        }

        let command = self.locator.resolve()?;
        let mut child = {
            // Process pipes register with the reactor of the current runtime.
            let _guard = self.runtime.enter();
            command.to_command().spawn().map_err(RpcError::LaunchFailed)?
        };

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(RpcError::LaunchFailed(std::io::Error::other(
                "worker stdio was not captured",
            )));
        };

        let pid = child.id();
        let generation = self.install(&mut slot, pid, stdout, stdin, false);
        let kill_rx = {
            let (kill_tx, kill_rx) = oneshot::channel();
            slot.kill = Some(kill_tx);
            kill_rx
        };
        drop(slot);

        self.runtime.spawn(forward_stderr(stderr));
        self.runtime.spawn(supervise(
            child,
            kill_rx,
            generation,
            Arc::clone(&self.worker),
            Arc::clone(&self.pending),
            Arc::clone(&self.exit_listener),
        ));

        info!("Started worker `{}` (pid {:?})", command.display(), pid);
        Ok(())
    }

    /// Wire a transport into the slot and spawn its reader and writer tasks.
    ///
    /// With `exit_on_eof` the end of the read side counts as a worker exit;
    /// process-backed transports leave that to the supervisor so the exit
    /// code is known.
    fn install<R, W>(
        &self,
        slot: &mut WorkerSlot,
        pid: Option<u32>,
        reader: R,
        writer: W,
        exit_on_eof: bool,
    ) -> u64
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        slot.generation += 1;
        let generation = slot.generation;
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        slot.state = WorkerState::Running { pid };
        slot.writer = Some(writer_tx);

        self.runtime
            .spawn(pump_requests(writer, writer_rx, Arc::clone(&self.pending)));

        let pending = Arc::clone(&self.pending);
        let worker = Arc::clone(&self.worker);
        let listener = Arc::clone(&self.exit_listener);
        self.runtime.spawn(async move {
            let result = read_messages(reader, |message| dispatch(&pending, message)).await;
            match result {
                Ok(()) => debug!("Worker output closed"),
                Err(e) => warn!("Failed to read worker output: {}", e),
            }
            if exit_on_eof {
                handle_exit(&worker, &pending, &listener, generation, None);
            }
        });

        generation
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request without waiting.
    ///
    /// If the worker cannot be started the callback runs immediately with
    /// the launch error and nothing is written.
    pub fn call(&self, method: &str, params: Value, callback: RpcCallback) {
        self.send_request(method, params, callback);
    }

    /// Like [`RpcClient::call`], returning the id the request was sent under.
    fn send_request(&self, method: &str, params: Value, callback: RpcCallback) -> Option<u64> {
        if let Err(e) = self.ensure_worker_running() {
            warn!("Cannot send `{}`: {}", method, e);
            callback(Err(e));
            return None;
        }

        let id = self.next_id();
        let request = RpcRequest::new(id, method, params);
        debug!("-> {} `{}`", id, method);

        lock(&self.pending).insert(id, callback);

        let writer = lock(&self.worker).writer.clone();
        let sent = match writer {
            Some(writer) => writer.send(request).is_ok(),
            None => false,
        };

        if !sent {
            // The worker went away between the liveness check and the send.
            if let Some(callback) = lock(&self.pending).remove(id) {
                callback(Err(RpcError::WorkerNotRunning));
            }
            return None;
        }

        Some(id)
    }

    /// Send a request and wait for its response using the default timeout.
    pub async fn call_sync(&self, method: &str, params: Value) -> RpcResult {
        self.call_sync_with_timeout(method, params, self.timeout).await
    }

    /// Send a request and wait at most `timeout` for its response.
    ///
    /// On timeout the pending entry is removed, so a response that arrives
    /// later is discarded as unknown.
    pub async fn call_sync_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> RpcResult {
        let (tx, rx) = oneshot::channel();
        let id = self.send_request(
            method,
            params,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::WorkerExited { exit_code: None }),
            Err(_) => {
                if let Some(id) = id {
                    lock(&self.pending).remove(id);
                }
                let ms = timeout.as_millis() as u64;
                warn!("`{}` timed out after {}ms", method, ms);
                Err(RpcError::Timeout(ms))
            }
        }
    }

    /// Round-trip a `ping` and report the latency.
    pub async fn ping(&self) -> Result<Duration, RpcError> {
        let start = Instant::now();
        let reply = self.call_sync("ping", json!({})).await?;

        if reply.get("pong").and_then(Value::as_bool) != Some(true) {
            return Err(RpcError::Protocol(format!("Unexpected ping reply: {}", reply)));
        }
        Ok(start.elapsed())
    }

    /// Terminate the worker without waiting for outstanding requests.
    ///
    /// Pending requests are abandoned: their callbacks receive
    /// [`RpcError::WorkerExited`] and the worker never answers them.
    pub fn stop_server(&self) {
        let abandoned = {
            let mut slot = lock(&self.worker);
            if let Some(kill) = slot.kill.take() {
                let _ = kill.send(());
            }
            slot.writer = None;
            if slot.state.is_running() {
                slot.state = WorkerState::Stopped { exit_code: None };
            }
            lock(&self.pending).drain()
        };

        info!("Worker stopped ({} pending requests abandoned)", abandoned.len());
        for callback in abandoned {
            callback(Err(RpcError::WorkerExited { exit_code: None }));
        }
    }

    /// Build a client over an in-memory transport for tests.
    #[cfg(test)]
    pub(crate) fn with_transport<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let client = Self::new(WorkerLocator::default(), Handle::current());
        {
            let mut slot = lock(&client.worker);
            client.install(&mut slot, None, reader, writer, true);
        }
        client
    }
}

impl RpcService for RpcClient {
    fn call(&self, method: &str, params: Value, callback: RpcCallback) {
        RpcClient::call(self, method, params, callback)
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        if self.worker_state().is_running() {
            self.stop_server();
        }
    }
}

/// Route one incoming message to its pending request.
///
/// Messages without a matching entry (late replies after a timeout,
/// duplicates, unsolicited output) are dropped.
fn dispatch(pending: &Mutex<PendingTable>, message: Value) {
    let response: RpcResponse = match serde_json::from_value(message) {
        Ok(response) => response,
        Err(e) => {
            warn!("Ignoring unrecognized worker message: {}", e);
            return;
        }
    };

    let Some(id) = response.id else {
        if let Some(err) = response.error {
            warn!("Worker reported an uncorrelated error: {}", err.message);
        }
        return;
    };

    let Some(callback) = lock(pending).remove(id) else {
        debug!("Dropping response for unknown request {}", id);
        return;
    };

    debug!("<- {}", id);
    callback(into_result(response));
}

fn into_result(response: RpcResponse) -> RpcResult {
    match (response.result, response.error) {
        (_, Some(err)) => Err(RpcError::Server {
            code: err.code,
            message: err.message,
        }),
        (Some(result), None) => Ok(result),
        (None, None) => Err(RpcError::Protocol(
            "Response missing both result and error".to_string(),
        )),
    }
}

/// Write queued requests to the worker in order.
async fn pump_requests<W>(
    mut writer: W,
    mut requests: mpsc::UnboundedReceiver<RpcRequest>,
    pending: Arc<Mutex<PendingTable>>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = requests.recv().await {
        if let Err(e) = write_message(&mut writer, &request).await {
            warn!("Failed to write request {}: {}", request.id, e);
            if let Some(callback) = lock(&pending).remove(request.id) {
                callback(Err(RpcError::Io(e)));
            }
            break;
        }
    }
}

/// Re-emit the worker's stderr through tracing.
async fn forward_stderr<R>(stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!(target: "gdocs_sync::worker", "{}", line);
    }
}

/// Wait for the worker to exit, or kill it when asked (or when the client
/// is dropped and the kill sender goes with it).
async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    generation: u64,
    worker: Arc<Mutex<WorkerSlot>>,
    pending: Arc<Mutex<PendingTable>>,
    listener: Arc<Mutex<Option<ExitListener>>>,
) {
    let exit_code = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => status.code(),
            Err(e) => {
                warn!("Failed to wait for worker: {}", e);
                None
            }
        },
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill worker: {}", e);
            }
            debug!("Worker generation {} killed", generation);
            return;
        }
    };

    handle_exit(&worker, &pending, &listener, generation, exit_code);
}

/// Mark the worker stopped and resolve everything still pending.
fn handle_exit(
    worker: &Mutex<WorkerSlot>,
    pending: &Mutex<PendingTable>,
    listener: &Mutex<Option<ExitListener>>,
    generation: u64,
    exit_code: Option<i32>,
) {
    let abandoned = {
        let mut slot = lock(worker);
        if slot.generation != generation || !slot.state.is_running() {
            return;
        }
        slot.state = WorkerState::Stopped { exit_code };
        slot.writer = None;
        slot.kill = None;
        lock(pending).drain()
    };

    match exit_code {
        Some(0) => info!("Worker exited"),
        Some(code) => warn!("Worker exited with code {}", code),
        None => error!("Worker terminated without an exit code"),
    }

    if exit_code != Some(0) {
        let listener = lock(listener).clone();
        if let Some(listener) = listener {
            listener(exit_code);
        }
    }

    if !abandoned.is_empty() {
        warn!("{} requests were pending when the worker exited", abandoned.len());
    }
    for callback in abandoned {
        callback(Err(RpcError::WorkerExited { exit_code }));
    }
}
