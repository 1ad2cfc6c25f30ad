use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tonic::transport::Server as GrpcServer;
use tracing::{error, info};

use dispatch_codec::Codec;
use dispatch_grpc::{TaskExecutorServer, TaskExecutorService};
use dispatch_manager::{ManagerTasks, TaskManager};
use dispatch_monitor::SystemMonitor;
use dispatch_pool::{PoolConfig, WorkerPool};
use dispatch_registry::{builtin::register_builtin, EventRegistry};
use dispatch_scaling::ScalingEngine;
use dispatch_shared::ServerConfig;
use dispatch_tracking::{ClientTaskRegistry, ResultStore};

use crate::cli::Cli;

/// Everything the process owns, held so shutdown can tear it down in the
/// reverse of start order: stop accepting, cancel reactor tasks, drain the
/// worker pool, final sweep of the registries.
pub struct Bootstrap {
    manager: Arc<TaskManager>,
    manager_tasks: ManagerTasks,
    scaling: Arc<ScalingEngine>,
    scaling_loop: JoinHandle<()>,
    pool: Arc<WorkerPool>,
    tcp: Option<JoinHandle<()>>,
    grpc: Option<JoinHandle<()>>,
    tracking: Arc<ClientTaskRegistry>,
    result_store: Arc<ResultStore>,
}

impl Bootstrap {
    pub async fn start(cli: &Cli, config: ServerConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(EventRegistry::new());
        register_builtin(&registry)?;

        let tracking = Arc::new(ClientTaskRegistry::new());
        let result_store = Arc::new(ResultStore::new());

        let monitor = Arc::new(SystemMonitor::new());
        let scaling = Arc::new(ScalingEngine::new(config.scaling.clone(), monitor.clone()));
        // `worker_count` is the initial target, clamped into [min_workers, W_max] by
        // the same path a scaling tick uses, rather than always starting at the floor.
        scaling.set_target_worker_count(config.manager.worker_count);

        let pool = Arc::new(WorkerPool::new(
            PoolConfig {
                worker_binary_path: cli.worker_binary.clone(),
                secret_key: config.codec.secret_key.clone().into_bytes(),
            },
            monitor.clone(),
            config.manager.max_pending_tasks,
        ));
        pool.resize(scaling.target_workers());

        let (manager, manager_tasks) = TaskManager::new(
            registry,
            tracking.clone(),
            result_store.clone(),
            pool.clone(),
            scaling.clone(),
            config.manager.clone(),
        );

        let scaling_loop = tokio::spawn(run_scaling_loop(
            scaling.clone(),
            pool.clone(),
            Duration::from_secs(config.scaling.monitoring_interval_secs),
        ));

        let codec = Codec::new(config.codec.secret_key.clone().into_bytes());

        let tcp = if cli.no_tcp {
            None
        } else {
            let tcp_config = config.tcp.clone();
            let manager = manager.clone();
            let codec = codec.clone();
            Some(tokio::spawn(async move {
                if let Err(err) = dispatch_tcp::serve(tcp_config, manager, codec).await {
                    error!(error = %err, "tcp ingress exited");
                }
            }))
        };

        let grpc = if cli.no_grpc {
            None
        } else {
            let addr = format!("{}:{}", config.grpc.host, config.grpc.port).parse()?;
            let service = TaskExecutorService::new(
                manager.clone(),
                codec.clone(),
                Duration::from_secs(config.grpc.execute_timeout_secs),
            );
            Some(tokio::spawn(async move {
                info!(%addr, "grpc ingress listening");
                if let Err(err) = GrpcServer::builder()
                    .add_service(TaskExecutorServer::new(service))
                    .serve(addr)
                    .await
                {
                    error!(error = %err, "grpc ingress exited");
                }
            }))
        };

        Ok(Self {
            manager,
            manager_tasks,
            scaling,
            scaling_loop,
            pool,
            tcp,
            grpc,
            tracking,
            result_store,
        })
    }

    pub async fn shutdown(self, drain_timeout: Duration) {
        if let Some(tcp) = self.tcp {
            tcp.abort();
        }
        if let Some(grpc) = self.grpc {
            grpc.abort();
        }
        self.scaling_loop.abort();

        // Drain in-flight work with a bounded wait rather than blocking
        // shutdown forever on a stuck worker process.
        let _ = tokio::time::timeout(drain_timeout, async {
            while self.tracking.len() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        self.manager_tasks.router.abort();
        self.manager_tasks.cleanup.abort();

        let registry_ttl = chrono::Duration::zero();
        self.tracking.sweep(registry_ttl);
        self.result_store.sweep(registry_ttl);

        drop(self.manager);
        drop(self.pool);
        drop(self.scaling);
    }
}

async fn run_scaling_loop(scaling: Arc<ScalingEngine>, pool: Arc<WorkerPool>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut running_workers = scaling.target_workers();
    loop {
        ticker.tick().await;
        pool.monitor().set_tracked_pids(pool.tracked_worker_pids());
        scaling.update_queue_length(pool.queue_length());
        let snapshot = scaling.tick();
        if snapshot.target_workers != running_workers {
            pool.resize(snapshot.target_workers);
            running_workers = snapshot.target_workers;
        }
    }
}
