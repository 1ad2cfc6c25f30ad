use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};
use tracing::warn;

use dispatch_codec::Codec;
use dispatch_manager::TaskManager;
use dispatch_shared::{ClientHandle, DispatchError, EventResult, Protocol, ResponseSink, TaskMessage};

use crate::proto::task_executor_server::TaskExecutor;
use crate::proto::task_status::State as ProtoState;
use crate::proto::{TaskRequest, TaskResponse, TaskStatus as ProtoTaskStatus};

struct GrpcResponseSink {
    tx: Mutex<Option<oneshot::Sender<EventResult>>>,
}

impl std::fmt::Debug for GrpcResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcResponseSink").finish()
    }
}

impl ResponseSink for GrpcResponseSink {
    fn deliver(&self, result: &EventResult) -> Result<(), DispatchError> {
        let mut guard = self.tx.lock().expect("grpc response sink mutex poisoned");
        match guard.take() {
            Some(tx) => tx
                .send(result.clone())
                .map_err(|_| DispatchError::RoutingFailed("grpc waiter already gone".into())),
            None => Err(DispatchError::RoutingFailed("grpc response already delivered".into())),
        }
    }
}

pub struct TaskExecutorService {
    manager: Arc<TaskManager>,
    codec: Codec,
    execute_timeout: Duration,
}

impl TaskExecutorService {
    pub fn new(manager: Arc<TaskManager>, codec: Codec, execute_timeout: Duration) -> Self {
        Self {
            manager,
            codec,
            execute_timeout,
        }
    }

    /// Decodes a codec frame expected to carry a JSON object. An empty
    /// blob (the proto3 default for an omitted `bytes` field) is treated
    /// as an empty object rather than a decode failure.
    fn decode_blob(&self, blob: &[u8]) -> Result<Map<String, Value>, Status> {
        if blob.is_empty() {
            return Ok(Map::new());
        }
        let value = self.codec.decode(blob).map_err(dispatch_error_to_status)?;
        value
            .as_object()
            .cloned()
            .ok_or_else(|| Status::invalid_argument("args/kwargs blob must decode to a JSON object"))
    }

    /// Encodes an event's inner result payload, wrapped in an object since
    /// the codec's wire contract requires an object at the top level.
    fn encode_payload(&self, value: &Value) -> Result<Vec<u8>, Status> {
        self.codec
            .encode(&serde_json::json!({ "value": value }))
            .map_err(dispatch_error_to_status)
    }

    async fn submit_and_wait(&self, request: TaskRequest) -> Result<EventResult, Status> {
        let args = self.decode_blob(&request.args_blob)?;
        let kwargs = self.decode_blob(&request.kwargs_blob)?;
        // Merge preferring kwargs_blob: kwargs entries win on key collision.
        let mut merged = args;
        merged.extend(kwargs);

        let mut message = TaskMessage::new(request.name, merged);
        message.correlation_id = Some(request.task_id).filter(|id| !id.is_empty());

        let (tx, rx) = oneshot::channel();
        let sink = ClientHandle::new(Arc::new(GrpcResponseSink { tx: Mutex::new(Some(tx)) }));

        self.manager
            .handle_task(message, Protocol::Grpc, sink)
            .map_err(dispatch_error_to_status)?;

        match tokio::time::timeout(self.execute_timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(Status::internal("response channel dropped before delivery")),
            Err(_) => Ok(EventResult::error("", "TASK_TIMEOUT", "task did not complete before the deadline")),
        }
    }
}

#[tonic::async_trait]
impl TaskExecutor for TaskExecutorService {
    async fn execute(&self, request: Request<TaskRequest>) -> Result<Response<TaskResponse>, Status> {
        let result = self.submit_and_wait(request.into_inner()).await?;
        let success = result.is_success();
        let error = if success { String::new() } else { result.message.clone().unwrap_or_default() };
        let result_bytes = self.encode_payload(&result.result)?;
        Ok(Response::new(TaskResponse { success, error, result: result_bytes }))
    }

    type ExecuteStreamStream = Pin<Box<dyn Stream<Item = Result<ProtoTaskStatus, Status>> + Send>>;

    async fn execute_stream(
        &self,
        request: Request<TaskRequest>,
    ) -> Result<Response<Self::ExecuteStreamStream>, Status> {
        let result = self.submit_and_wait(request.into_inner()).await?;
        let status = if result.is_success() { ProtoState::Completed } else { ProtoState::Failed };
        let message = result.message.clone().unwrap_or_default();
        let result_bytes = self.encode_payload(&result.result)?;

        let response = ProtoTaskStatus {
            status: status as i32,
            result: result_bytes,
            message,
        };
        let stream = tokio_stream::once(Ok(response));
        Ok(Response::new(Box::pin(stream)))
    }
}

fn dispatch_error_to_status(err: DispatchError) -> Status {
    if err.is_client_fault() {
        return Status::invalid_argument(err.to_string());
    }
    match err {
        DispatchError::QueueFull => Status::resource_exhausted(err.to_string()),
        DispatchError::Timeout => Status::deadline_exceeded(err.to_string()),
        other => {
            warn!(error = %other, "internal dispatch error surfaced to grpc client");
            Status::internal(other.to_string())
        }
    }
}
