//! Shared scaffolding for the end-to-end tests: a TCP server bound to an
//! ephemeral port, backed by a real task manager and (where the scenario
//! needs it) a real worker process pool spawning the `dispatch-worker`
//! binary built alongside these tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use dispatch_codec::Codec;
use dispatch_manager::TaskManager;
use dispatch_monitor::SystemMonitor;
use dispatch_pool::{PoolConfig, WorkerPool};
use dispatch_registry::{builtin::register_builtin, EventRegistry};
use dispatch_scaling::ScalingEngine;
use dispatch_shared::config::{ManagerConfig, ScalingConfig, TcpConfig};
use dispatch_tracking::{ClientTaskRegistry, ResultStore};

pub const SECRET: &[u8] = b"integration-test-secret";

pub struct Harness {
    pub addr: std::net::SocketAddr,
    pub codec: Codec,
    server: JoinHandle<()>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn scaling_config(min_workers: usize, max_workers_cpu_quota: f64) -> ScalingConfig {
    ScalingConfig {
        min_workers,
        max_cpu_quota: max_workers_cpu_quota,
        max_memory_quota_gb: max_workers_cpu_quota,
        cpu_per_worker: 1.0,
        memory_per_worker_gb: 1.0,
        parallelism_multiplier: 1,
        scale_up_threshold: 1.0,
        scale_down_timeout_secs: 5,
        cpu_threshold_scale_up: 0.9,
        cpu_threshold_scale_down: 0.1,
        memory_threshold: 0.9,
        monitoring_interval_secs: 5,
        aggressive_scaling: false,
    }
}

fn manager_config(max_pending_tasks: usize) -> ManagerConfig {
    ManagerConfig {
        worker_count: 1,
        max_pending_tasks,
        task_timeout_secs: 5,
        task_registry_ttl_secs: 600,
        task_result_ttl_secs: 600,
        allowed_events: None,
        cleanup_interval_secs: 3600,
    }
}

/// Starts a harness whose worker pool actually executes tasks against the
/// real `dispatch-worker` binary, sized to `worker_count` drivers.
pub async fn start_with_live_workers(worker_count: usize, max_pending_tasks: usize) -> Harness {
    let monitor = Arc::new(SystemMonitor::new());
    let scaling = Arc::new(ScalingEngine::new(scaling_config(4, 4.0), monitor.clone()));
    let pool = Arc::new(WorkerPool::new(
        PoolConfig {
            worker_binary_path: env!("CARGO_BIN_EXE_dispatch-worker").to_string(),
            secret_key: SECRET.to_vec(),
        },
        monitor,
        max_pending_tasks,
    ));
    pool.resize(worker_count);
    start(pool, scaling, max_pending_tasks).await
}

/// Starts a harness whose pool never resizes past zero drivers, so
/// submitted tasks sit in the queue until it fills.
pub async fn start_with_no_drivers(max_pending_tasks: usize) -> Harness {
    let monitor = Arc::new(SystemMonitor::new());
    let scaling = Arc::new(ScalingEngine::new(scaling_config(1, 1.0), monitor.clone()));
    let pool = Arc::new(WorkerPool::new(
        PoolConfig {
            worker_binary_path: "/bin/true".into(),
            secret_key: SECRET.to_vec(),
        },
        monitor,
        max_pending_tasks,
    ));
    start(pool, scaling, max_pending_tasks).await
}

async fn start(pool: Arc<WorkerPool>, scaling: Arc<ScalingEngine>, max_pending_tasks: usize) -> Harness {
    let registry = Arc::new(EventRegistry::new());
    register_builtin(&registry).unwrap();

    let (manager, _tasks) = TaskManager::new(
        registry,
        Arc::new(ClientTaskRegistry::new()),
        Arc::new(ResultStore::new()),
        pool,
        scaling,
        manager_config(max_pending_tasks),
    );

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let tcp_config = TcpConfig {
        host: "127.0.0.1".into(),
        port: addr.port(),
        default_connection_timeout_secs: 5,
        data_chunk_size: 4096,
        connection_backlog_size: 16,
        tls_cert_path: None,
        tls_key_path: None,
        tls_client_ca_path: None,
    };

    let codec = Codec::new(SECRET.to_vec());
    let serve_codec = codec.clone();
    let server = tokio::spawn(async move {
        let _ = dispatch_tcp::serve(tcp_config, manager, serve_codec).await;
    });

    // Give the listener a moment to come up before the first connect.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Harness { addr, codec, server }
}

pub async fn connect(harness: &Harness) -> TcpStream {
    TcpStream::connect(harness.addr).await.unwrap()
}

pub async fn send_frame(stream: &mut TcpStream, frame: &[u8]) {
    let len = (frame.len() as u32).to_be_bytes();
    stream.write_all(&len).await.unwrap();
    stream.write_all(frame).await.unwrap();
}

pub async fn send_raw(stream: &mut TcpStream, bytes: &[u8]) {
    stream.write_all(bytes).await.unwrap();
}

pub async fn recv_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await.unwrap();
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

/// Reads one frame, failing the test if none arrives within `timeout`.
pub async fn recv_frame_timeout(stream: &mut TcpStream, timeout: Duration) -> Option<Vec<u8>> {
    tokio::time::timeout(timeout, recv_frame(stream)).await.ok()
}
