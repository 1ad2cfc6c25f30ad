use std::time::Instant;

use chrono::{DateTime, Utc};
use dispatch_shared::{ClientHandle, Protocol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Done,
}

/// An in-flight task, exclusively owned by the [`crate::ClientTaskRegistry`].
#[derive(Clone, Debug)]
pub struct ClientTaskRecord {
    pub correlation_id: String,
    pub status: TaskState,
    pub created_at: DateTime<Utc>,
    pub start_time: Instant,
    pub client_id: Option<String>,
    pub event_name: String,
    pub protocol: Protocol,
    pub client_handle: ClientHandle,
}

impl ClientTaskRecord {
    pub fn new(
        correlation_id: impl Into<String>,
        event_name: impl Into<String>,
        protocol: Protocol,
        client_handle: ClientHandle,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: TaskState::Pending,
            created_at: Utc::now(),
            start_time: Instant::now(),
            client_id: None,
            event_name: event_name.into(),
            protocol,
            client_handle,
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }
}
