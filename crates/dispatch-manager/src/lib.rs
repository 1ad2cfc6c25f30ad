//! Task manager core.
//!
//! `handle_task` is the single synchronous entry point every ingress calls.
//! Response routing is realized as one long-lived task driving a
//! `FuturesUnordered` of in-flight completions rather than a second
//! queue-draining loop: Tokio makes per-request concurrency cheap enough
//! that a dedicated thread per queue (as the original's two-loop design
//! assumed) is unnecessary, so routing collapses into a single reactor
//! task that multiplexes every outstanding proxy wait.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dispatch_pool::WorkerPool;
use dispatch_registry::EventRegistry;
use dispatch_scaling::ScalingEngine;
use dispatch_shared::config::ManagerConfig;
use dispatch_shared::{ClientHandle, DispatchError, EventResult, Protocol, TaskMessage, TaskStatus};
use dispatch_tracking::{ClientTaskRecord, ClientTaskRegistry, ResultStore};

type RouterFuture = Pin<Box<dyn Future<Output = (String, Result<EventResult, DispatchError>)> + Send>>;

/// Outcome of a `POLL` lookup: either a result (possibly recovered from the
/// parked store) or a bare status when no result is available yet.
pub enum PollOutcome {
    Result(EventResult),
    Status(TaskStatus),
}

pub struct TaskManager {
    registry: Arc<EventRegistry>,
    tracking: Arc<ClientTaskRegistry>,
    result_store: Arc<ResultStore>,
    pool: Arc<WorkerPool>,
    scaling: Arc<ScalingEngine>,
    config: ManagerConfig,
    router_tx: mpsc::UnboundedSender<RouterFuture>,
}

/// Join handles for the manager's background loops, held by the caller so
/// shutdown can abort them deterministically.
pub struct ManagerTasks {
    pub router: JoinHandle<()>,
    pub cleanup: JoinHandle<()>,
}

impl TaskManager {
    pub fn new(
        registry: Arc<EventRegistry>,
        tracking: Arc<ClientTaskRegistry>,
        result_store: Arc<ResultStore>,
        pool: Arc<WorkerPool>,
        scaling: Arc<ScalingEngine>,
        config: ManagerConfig,
    ) -> (Arc<Self>, ManagerTasks) {
        let (router_tx, router_rx) = mpsc::unbounded_channel();

        let manager = Arc::new(Self {
            registry,
            tracking: tracking.clone(),
            result_store: result_store.clone(),
            pool,
            scaling,
            config: config.clone(),
            router_tx,
        });

        let router = tokio::spawn(response_router_loop(router_rx, tracking.clone(), result_store.clone()));
        let cleanup = tokio::spawn(cleanup_loop(
            tracking,
            result_store,
            Duration::from_secs(config.task_registry_ttl_secs),
            Duration::from_secs(config.task_result_ttl_secs),
            Duration::from_secs(config.cleanup_interval_secs),
        ));

        (manager, ManagerTasks { router, cleanup })
    }

    /// Resolves, validates, tracks and queues a task. Returns its
    /// correlation id on success so the caller can reply immediately with
    /// an acknowledgement if its protocol wants one.
    pub fn handle_task(
        &self,
        message: TaskMessage,
        protocol: Protocol,
        client_handle: ClientHandle,
    ) -> Result<String, DispatchError> {
        if let Some(allowed) = &self.config.allowed_events {
            if !allowed.iter().any(|name| name == &message.event) {
                return Err(DispatchError::EventNotWhitelisted(message.event.clone()));
            }
        }

        let factory = self
            .registry
            .lookup(&message.event)
            .ok_or_else(|| DispatchError::EventNotRegistered(message.event.clone()))?;

        let correlation_id = message.correlation_id_or_mint();

        // Validates args against the event's own constructor before the
        // task ever reaches a queue.
        factory.instantiate(&correlation_id, &message.args)?;

        let record = ClientTaskRecord::new(correlation_id.clone(), message.event.clone(), protocol, client_handle);
        self.tracking.register(record);

        let deadline = Instant::now() + Duration::from_secs(self.config.task_timeout_secs);
        let proxy = match self
            .pool
            .submit(message.event.clone(), correlation_id.clone(), message.args.clone(), deadline)
        {
            Ok(proxy) => proxy,
            Err(err) => {
                self.tracking.remove(&correlation_id);
                return Err(err);
            }
        };

        self.scaling.update_queue_length(self.pool.queue_length());

        let job_id = correlation_id.clone();
        let job: RouterFuture = Box::pin(async move {
            let outcome = proxy.wait().await;
            (job_id, outcome)
        });

        self.router_tx
            .send(job)
            .map_err(|_| DispatchError::Internal("response router loop is not running".into()))?;

        Ok(correlation_id)
    }

    /// Handles the magic `POLL` event without ever enqueueing it as a task:
    /// first checks the result store (pop-on-read), then falls back to the
    /// in-flight registry for a pending/not-found status.
    pub fn poll(&self, task_id: &str) -> PollOutcome {
        if let Some(result) = self.result_store.get(task_id) {
            return PollOutcome::Result(result);
        }
        if self.tracking.contains(task_id) {
            PollOutcome::Status(TaskStatus::Pending)
        } else {
            PollOutcome::Status(TaskStatus::NotFound)
        }
    }
}

async fn response_router_loop(
    mut job_rx: mpsc::UnboundedReceiver<RouterFuture>,
    tracking: Arc<ClientTaskRegistry>,
    result_store: Arc<ResultStore>,
) {
    let mut in_flight = FuturesUnordered::new();
    loop {
        tokio::select! {
            maybe_job = job_rx.recv() => {
                match maybe_job {
                    Some(job) => in_flight.push(job),
                    None if in_flight.is_empty() => return,
                    None => {}
                }
            }
            Some((correlation_id, outcome)) = in_flight.next(), if !in_flight.is_empty() => {
                route_response(&tracking, &result_store, correlation_id, outcome);
            }
        }
    }
}

fn route_response(
    tracking: &ClientTaskRegistry,
    result_store: &ResultStore,
    correlation_id: String,
    outcome: Result<EventResult, DispatchError>,
) {
    let result = match outcome {
        Ok(result) => result,
        Err(err) => EventResult::error(correlation_id.clone(), err.code(), err.to_string()),
    };

    match tracking.remove(&correlation_id) {
        Some(record) => {
            info!(
                correlation_id = %correlation_id,
                event = %record.event_name,
                duration_ms = record.elapsed_ms(),
                status = ?result.status,
                protocol = ?record.protocol,
                "task_completed"
            );
            if let Err(err) = record.client_handle.deliver(&result) {
                warn!(correlation_id = %correlation_id, error = %err, "delivery failed, parking result");
                result_store.store(correlation_id, result);
            }
        }
        None => {
            // Registry entry already gone (swept, or never registered);
            // park so a later poll can still recover the result.
            result_store.store(correlation_id, result);
        }
    }
}

async fn cleanup_loop(
    tracking: Arc<ClientTaskRegistry>,
    result_store: Arc<ResultStore>,
    registry_ttl: Duration,
    result_ttl: Duration,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let swept_tasks = tracking.sweep(chrono::Duration::from_std(registry_ttl).unwrap_or(chrono::Duration::zero()));
        let swept_results = result_store.sweep(chrono::Duration::from_std(result_ttl).unwrap_or(chrono::Duration::zero()));
        if swept_tasks > 0 || swept_results > 0 {
            debug!(swept_tasks, swept_results, "cleanup sweep");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dispatch_monitor::SystemMonitor;
    use dispatch_pool::PoolConfig;
    use dispatch_shared::config::ScalingConfig;
    use dispatch_shared::{impl_factory_type_id, Event, EventFactory, ResponseSink};
    use serde_json::{Map, Value};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct EchoFactory;
    #[derive(Debug)]
    struct EchoEvent;

    #[async_trait]
    impl Event for EchoEvent {
        async fn invoke(&self, _task_id: &str) -> Result<Value, DispatchError> {
            Ok(Value::from("ok"))
        }
    }

    impl EventFactory for EchoFactory {
        fn event_name(&self) -> &'static str {
            "echo"
        }
        impl_factory_type_id!(EchoFactory);
        fn instantiate(&self, _task_id: &str, _args: &Map<String, Value>) -> Result<Box<dyn Event>, DispatchError> {
            Ok(Box::new(EchoEvent))
        }
    }

    #[derive(Debug, Default)]
    struct RecordingSink {
        received: Mutex<Vec<EventResult>>,
    }

    impl ResponseSink for RecordingSink {
        fn deliver(&self, result: &EventResult) -> Result<(), DispatchError> {
            self.received.lock().unwrap().push(result.clone());
            Ok(())
        }
    }

    fn scaling_config() -> ScalingConfig {
        ScalingConfig {
            min_workers: 1,
            max_cpu_quota: 2.0,
            max_memory_quota_gb: 2.0,
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

    fn manager_config() -> ManagerConfig {
        ManagerConfig {
            worker_count: 1,
            max_pending_tasks: 10,
            task_timeout_secs: 5,
            task_registry_ttl_secs: 600,
            task_result_ttl_secs: 600,
            allowed_events: None,
            cleanup_interval_secs: 3600,
        }
    }

    #[tokio::test]
    async fn rejects_unwhitelisted_events() {
        let registry = Arc::new(EventRegistry::new());
        registry.register(Arc::new(EchoFactory)).unwrap();
        let tracking = Arc::new(ClientTaskRegistry::new());
        let result_store = Arc::new(ResultStore::new());
        let monitor = Arc::new(SystemMonitor::new());
        let pool = Arc::new(WorkerPool::new(
            PoolConfig { worker_binary_path: "/bin/true".into(), secret_key: b"k".to_vec() },
            monitor.clone(),
            16,
        ));
        let scaling = Arc::new(ScalingEngine::new(scaling_config(), monitor));

        let mut config = manager_config();
        config.allowed_events = Some(vec!["other".into()]);

        let (manager, tasks) = TaskManager::new(registry, tracking, result_store, pool, scaling, config);
        let handle = ClientHandle::new(Arc::new(RecordingSink::default()));
        let err = manager
            .handle_task(TaskMessage::new("echo", Map::new()), Protocol::Tcp, handle)
            .unwrap_err();
        assert!(matches!(err, DispatchError::EventNotWhitelisted(_)));

        tasks.router.abort();
        tasks.cleanup.abort();
    }

    #[tokio::test]
    async fn rejects_unregistered_events() {
        let registry = Arc::new(EventRegistry::new());
        let tracking = Arc::new(ClientTaskRegistry::new());
        let result_store = Arc::new(ResultStore::new());
        let monitor = Arc::new(SystemMonitor::new());
        let pool = Arc::new(WorkerPool::new(
            PoolConfig { worker_binary_path: "/bin/true".into(), secret_key: b"k".to_vec() },
            monitor.clone(),
            16,
        ));
        let scaling = Arc::new(ScalingEngine::new(scaling_config(), monitor));

        let (manager, tasks) = TaskManager::new(registry, tracking, result_store, pool, scaling, manager_config());
        let handle = ClientHandle::new(Arc::new(RecordingSink::default()));
        let err = manager
            .handle_task(TaskMessage::new("missing", Map::new()), Protocol::Tcp, handle)
            .unwrap_err();
        assert!(matches!(err, DispatchError::EventNotRegistered(_)));

        tasks.router.abort();
        tasks.cleanup.abort();
    }

    #[tokio::test]
    async fn poll_reports_not_found_for_unknown_id() {
        let registry = Arc::new(EventRegistry::new());
        let tracking = Arc::new(ClientTaskRegistry::new());
        let result_store = Arc::new(ResultStore::new());
        let monitor = Arc::new(SystemMonitor::new());
        let pool = Arc::new(WorkerPool::new(
            PoolConfig { worker_binary_path: "/bin/true".into(), secret_key: b"k".to_vec() },
            monitor.clone(),
            16,
        ));
        let scaling = Arc::new(ScalingEngine::new(scaling_config(), monitor));
        let (manager, tasks) = TaskManager::new(registry, tracking, result_store, pool, scaling, manager_config());

        match manager.poll("nope") {
            PollOutcome::Status(TaskStatus::NotFound) => {}
            _ => panic!("expected NotFound"),
        }

        tasks.router.abort();
        tasks.cleanup.abort();
    }
}
