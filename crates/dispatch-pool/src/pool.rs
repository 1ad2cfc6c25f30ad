use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex as SyncMutex;
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use dispatch_codec::Codec;
use dispatch_monitor::SystemMonitor;
use dispatch_shared::{DispatchError, EventResult, TaskMessage};

use crate::framing::{read_frame, write_frame};
use crate::proxy::{ProxyPhase, ProxyTask};

pub struct PoolConfig {
    /// Path to the `dispatch-worker-bin` executable, spawned once per task.
    pub worker_binary_path: String,
    /// Shared with `dispatch-codec`'s HMAC key so the manager and the
    /// isolated worker process agree on signing.
    pub secret_key: Vec<u8>,
}

pub(crate) struct PoolTask {
    pub event_name: String,
    pub task_id: String,
    pub args: Map<String, Value>,
    pub deadline: Instant,
    pub result_tx: oneshot::Sender<EventResult>,
    pub phase: Arc<SyncMutex<ProxyPhase>>,
}

struct Generation {
    shutdown_txs: Vec<oneshot::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

/// Dynamically resizable pool of process-isolated workers.
///
/// Tasks sit in one shared channel (the "outer queue") for the whole
/// lifetime of the pool; resizing only changes how many driver tasks are
/// concurrently pulling from it, so a resize never drops queued work.
pub struct WorkerPool {
    config: Arc<PoolConfig>,
    sender: mpsc::Sender<PoolTask>,
    receiver: Arc<AsyncMutex<mpsc::Receiver<PoolTask>>>,
    generation: SyncMutex<Generation>,
    monitor: Arc<SystemMonitor>,
    tracked_pids: Arc<SyncMutex<Vec<u32>>>,
    queued_count: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Builds a pool with no running drivers; call `resize` once to bring
    /// it up to `initial_worker_count`.
    pub fn new(config: PoolConfig, monitor: Arc<SystemMonitor>, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        Self {
            config: Arc::new(config),
            sender,
            receiver: Arc::new(AsyncMutex::new(receiver)),
            generation: SyncMutex::new(Generation {
                shutdown_txs: Vec::new(),
                handles: Vec::new(),
            }),
            monitor,
            tracked_pids: Arc::new(SyncMutex::new(Vec::new())),
            queued_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn submit(
        &self,
        event_name: String,
        task_id: String,
        args: Map<String, Value>,
        deadline: Instant,
    ) -> Result<ProxyTask, DispatchError> {
        let (result_tx, result_rx) = oneshot::channel();
        let phase = Arc::new(SyncMutex::new(ProxyPhase::Queued));
        let task = PoolTask {
            event_name,
            task_id: task_id.clone(),
            args,
            deadline,
            result_tx,
            phase: phase.clone(),
        };
        self.sender.try_send(task).map_err(|_| DispatchError::QueueFull)?;
        self.queued_count.fetch_add(1, Ordering::SeqCst);
        Ok(ProxyTask {
            correlation_id: task_id,
            phase,
            result_rx,
        })
    }

    /// Tasks sitting in the shared channel, not yet picked up by a driver.
    pub fn queue_length(&self) -> usize {
        self.queued_count.load(Ordering::SeqCst)
    }

    /// Resize protocol: tell the current generation's drivers to stop
    /// after their in-flight task (without waiting for them), then start a
    /// fresh generation pulling from the same shared receiver.
    pub fn resize(&self, new_worker_count: usize) {
        let mut generation = self.generation.lock();

        for tx in generation.shutdown_txs.drain(..) {
            let _ = tx.send(());
        }
        // Detach rather than join: matches shutting down the old
        // executor with `wait=False`.
        generation.handles.clear();

        let mut shutdown_txs = Vec::with_capacity(new_worker_count);
        let mut handles = Vec::with_capacity(new_worker_count);
        for _ in 0..new_worker_count {
            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            let receiver = self.receiver.clone();
            let config = self.config.clone();
            let tracked = self.tracked_pids.clone();
            let queued_count = self.queued_count.clone();
            handles.push(tokio::spawn(drive_loop(receiver, shutdown_rx, config, tracked, queued_count)));
            shutdown_txs.push(shutdown_tx);
        }

        generation.shutdown_txs = shutdown_txs;
        generation.handles = handles;
    }

    /// PIDs of workers currently executing a task, for the scaling
    /// engine's resource sampling.
    pub fn tracked_worker_pids(&self) -> Vec<u32> {
        self.tracked_pids.lock().clone()
    }

    pub fn monitor(&self) -> Arc<SystemMonitor> {
        self.monitor.clone()
    }
}

async fn drive_loop(
    receiver: Arc<AsyncMutex<mpsc::Receiver<PoolTask>>>,
    mut shutdown_rx: oneshot::Receiver<()>,
    config: Arc<PoolConfig>,
    tracked_pids: Arc<SyncMutex<Vec<u32>>>,
    queued_count: Arc<AtomicUsize>,
) {
    loop {
        let next = {
            let mut guard = receiver.lock().await;
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => None,
                task = guard.recv() => task,
            }
        };

        let Some(task) = next else {
            return;
        };
        queued_count.fetch_sub(1, Ordering::SeqCst);

        {
            let mut phase = task.phase.lock();
            if matches!(*phase, ProxyPhase::Finished) {
                // Cancelled while still queued; nothing to run.
                let _ = task
                    .result_tx
                    .send(EventResult::error(task.task_id.clone(), "CANCELLED", "task cancelled before execution"));
                continue;
            }
            *phase = ProxyPhase::Submitted;
        }

        run_task_in_worker_process(task, &config, &tracked_pids).await;
    }
}

async fn run_task_in_worker_process(task: PoolTask, config: &PoolConfig, tracked_pids: &SyncMutex<Vec<u32>>) {
    let codec = Codec::new(config.secret_key.clone());
    let message = TaskMessage {
        event: task.event_name.clone(),
        args: task.args.clone(),
        correlation_id: Some(task.task_id.clone()),
    };

    let result = run_once(&codec, &message, config, task.deadline, tracked_pids).await;

    let result = result.unwrap_or_else(|err| {
        error!(task_id = %task.task_id, error = %err, "worker process execution failed");
        EventResult::error(task.task_id.clone(), err.code(), err.to_string())
    });

    if task.result_tx.send(result).is_err() {
        warn!(task_id = %task.task_id, "result receiver dropped before worker finished");
    }
}

async fn run_once(
    codec: &Codec,
    message: &TaskMessage,
    config: &PoolConfig,
    deadline: Instant,
    tracked_pids: &SyncMutex<Vec<u32>>,
) -> Result<EventResult, DispatchError> {
    let secret_b64 = BASE64.encode(&config.secret_key);
    let mut child = Command::new(&config.worker_binary_path)
        .env("DISPATCH_WORKER_SECRET", secret_b64)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(DispatchError::Io)?;

    if let Some(pid) = child.id() {
        tracked_pids.lock().push(pid);
    }

    let mut stdin = child.stdin.take().expect("piped stdin");
    let mut stdout = child.stdout.take().expect("piped stdout");

    let frame = codec.encode_task_message(message)?;

    let timeout = deadline.saturating_duration_since(Instant::now());
    let run = async {
        write_frame(&mut stdin, &frame).await?;
        let response_frame = read_frame(&mut stdout).await?;
        codec.decode(&response_frame)
    };

    let outcome = tokio::time::timeout(timeout, run).await;
    let _ = child.kill().await;

    if let Some(pid) = child.id() {
        tracked_pids.lock().retain(|p| *p != pid);
    }

    match outcome {
        Ok(Ok(value)) => serde_json::from_value(value).map_err(|e| DispatchError::InvalidFrame(e.to_string())),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(DispatchError::Timeout),
    }
}
