//! Error taxonomy for the dispatch core.
//!
//! One variant per failure mode in the integrity / dispatch / capacity /
//! execution / timeout / routing taxonomy. Every handler in the core
//! coerces into this type (or into an [`crate::types::EventResult`]) rather
//! than panicking or propagating to the reactor top level.

use thiserror::Error;

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Payload could not be decompressed or parsed as JSON.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Signature missing or did not match the recomputed HMAC.
    #[error("invalid checksum")]
    InvalidChecksum,

    /// Caller tried to encode a value that serde_json rejects.
    #[error("value is not JSON serializable: {0}")]
    NotSerializable(String),

    /// `message.event` has no entry in the event registry.
    #[error("event not registered: {0}")]
    EventNotRegistered(String),

    /// `allowed_events` is configured and does not contain `message.event`.
    #[error("event not whitelisted: {0}")]
    EventNotWhitelisted(String),

    /// Event constructor / options validation rejected `message.args`.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// Ingress queue was at `max_pending_tasks` capacity.
    #[error("queue full")]
    QueueFull,

    /// Event ran but returned an application-level failure.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Per-request completion wait exceeded its deadline.
    #[error("task timed out")]
    Timeout,

    /// Two different event types tried to register under the same name.
    #[error("conflicting registration for event '{0}'")]
    ConflictingRegistration(String),

    /// Process-level configuration was missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Delivering a response to a client handle failed.
    #[error("routing failed: {0}")]
    RoutingFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Stable machine-readable code, surfaced as `EventResult.code` and
    /// mapped to gRPC/TCP status by the ingress layers.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::InvalidFrame(_) => "INVALID_FRAME",
            DispatchError::InvalidChecksum => "INVALID_CHECKSUM",
            DispatchError::NotSerializable(_) => "NOT_SERIALIZABLE",
            DispatchError::EventNotRegistered(_) => "EVENT_NOT_REGISTERED",
            DispatchError::EventNotWhitelisted(_) => "EVENT_NOT_WHITELISTED",
            DispatchError::InvalidArgs(_) => "INVALID_ARGS",
            DispatchError::QueueFull => "QUEUE_FULL",
            DispatchError::ExecutionFailed(_) => "EXECUTION_FAILED",
            DispatchError::Timeout => "TASK_TIMEOUT",
            DispatchError::ConflictingRegistration(_) => "CONFLICTING_REGISTRATION",
            DispatchError::Configuration(_) => "CONFIGURATION_ERROR",
            DispatchError::RoutingFailed(_) => "ROUTING_FAILED",
            DispatchError::Io(_) => "IO_ERROR",
            DispatchError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True when the failure is something the caller caused (and may fix by
    /// changing its request), as opposed to a server-side fault.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            DispatchError::InvalidFrame(_)
                | DispatchError::InvalidChecksum
                | DispatchError::NotSerializable(_)
                | DispatchError::EventNotRegistered(_)
                | DispatchError::EventNotWhitelisted(_)
                | DispatchError::InvalidArgs(_)
        )
    }
}
