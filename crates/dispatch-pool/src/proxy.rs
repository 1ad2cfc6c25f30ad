use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use dispatch_shared::{DispatchError, EventResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProxyPhase {
    /// Sitting in the shared outer queue, not yet picked up by a driver.
    Queued,
    /// A driver has started running this task in a worker process.
    Submitted,
    /// Terminal: either completed, or cancelled while still queued.
    Finished,
}

/// Handle returned immediately by `WorkerPool::submit`, standing in for
/// the real result until a driver has picked the task up and run it.
///
/// Replaces subclassing a future type (not idiomatic in Rust) with an
/// explicit two-phase state the handle exposes directly.
pub struct ProxyTask {
    pub(crate) correlation_id: String,
    pub(crate) phase: Arc<Mutex<ProxyPhase>>,
    pub(crate) result_rx: oneshot::Receiver<EventResult>,
}

impl ProxyTask {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn phase_is_queued(&self) -> bool {
        matches!(*self.phase.lock(), ProxyPhase::Queued)
    }

    /// Advisory cancellation: effective only while still queued. Once a
    /// driver has taken the task into a worker process, cancellation is a
    /// no-op here (the caller may still race the worker via its own
    /// deadline).
    pub fn cancel(&self) -> bool {
        let mut phase = self.phase.lock();
        if matches!(*phase, ProxyPhase::Queued) {
            *phase = ProxyPhase::Finished;
            true
        } else {
            false
        }
    }

    pub async fn wait(self) -> Result<EventResult, DispatchError> {
        self.result_rx
            .await
            .map_err(|_| DispatchError::Internal("worker driver dropped before producing a result".into()))
    }
}
