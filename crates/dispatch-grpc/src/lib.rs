//! gRPC ingress: a single `TaskExecutor` service exposing unary `Execute`
//! and single-terminal-message `ExecuteStream`, both carrying codec frames
//! so the TCP and gRPC transports share one wire format.

pub mod proto {
    tonic::include_proto!("dispatch.v1");
}

mod service;

pub use proto::task_executor_server::TaskExecutorServer;
pub use service::TaskExecutorService;
