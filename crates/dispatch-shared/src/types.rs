//! Wire-level and in-process data types shared by every crate in the
//! workspace: the task envelope, the execution outcome, and the handle a
//! response gets routed back through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A task submitted by a client, decoded from the wire frame.
///
/// `args` always carries a JSON object (never an array or scalar) so it can
/// be merged into an event's options by key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub event: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl TaskMessage {
    pub fn new(event: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            event: event.into(),
            args,
            correlation_id: None,
        }
    }

    /// Returns the caller-supplied correlation id, or mints a fresh one.
    pub fn correlation_id_or_mint(&self) -> String {
        self.correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

/// Outcome of running an event, in the shape the wire codec serializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResult {
    pub status: EventStatus,
    pub result: Value,
    pub correlation_id: String,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Error,
}

impl EventResult {
    pub fn success(correlation_id: impl Into<String>, result: Value) -> Self {
        Self {
            status: EventStatus::Success,
            result,
            correlation_id: correlation_id.into(),
            completed_at: Utc::now(),
            message: None,
            code: None,
        }
    }

    pub fn error(correlation_id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: EventStatus::Error,
            result: Value::Null,
            correlation_id: correlation_id.into(),
            completed_at: Utc::now(),
            message: Some(message.into()),
            code: Some(code.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EventStatus::Success
    }
}

/// Status word a `POLL` lookup or a registry entry reports back to a
/// client while a task is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    NotFound,
}

/// Transport a response must be delivered back over. Replaces the
/// `typing.Any` client-context grab bag with a closed, matchable set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Grpc,
}

/// A scale-up or scale-down recommendation, with the reason that produced
/// it. The reason string is part of the observable contract: it is fed to
/// logs/metrics verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingVerdict {
    pub decision: bool,
    pub reason: String,
}

/// A point-in-time reading the scaling engine and the monitor endpoint both
/// consume; produced once per monitoring tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingSnapshot {
    pub active_workers: usize,
    pub target_workers: usize,
    pub max_workers: usize,
    pub average_cpu_cores: f64,
    pub total_memory_gb: f64,
    pub queue_length: usize,
    pub batch_size: usize,
    pub scale_up: ScalingVerdict,
    pub scale_down: ScalingVerdict,
    pub taken_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_is_minted_when_absent() {
        let msg = TaskMessage::new("echo", Map::new());
        assert!(msg.correlation_id.is_none());
        assert!(!msg.correlation_id_or_mint().is_empty());
    }

    #[test]
    fn correlation_id_is_preserved_when_present() {
        let mut msg = TaskMessage::new("echo", Map::new());
        msg.correlation_id = Some("abc-123".to_string());
        assert_eq!(msg.correlation_id_or_mint(), "abc-123");
    }

    #[test]
    fn error_result_carries_no_payload() {
        let result = EventResult::error("cid", "EXECUTION_FAILED", "boom");
        assert!(!result.is_success());
        assert_eq!(result.result, Value::Null);
        assert_eq!(result.code.as_deref(), Some("EXECUTION_FAILED"));
    }

    #[test]
    fn success_result_serializes_without_error_fields() {
        let result = EventResult::success("cid", Value::from(42));
        let encoded = serde_json::to_value(&result).unwrap();
        assert!(encoded.get("message").is_none());
        assert!(encoded.get("code").is_none());
        assert_eq!(encoded["status"], "success");
    }
}
