use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dispatch_shared::EventResult;
use parking_lot::Mutex;

struct Parked {
    result: EventResult,
    stored_at: DateTime<Utc>,
}

/// Mapping correlation_id -> a result whose client handle was gone (or
/// never attached) by the time routing ran.
///
/// `get` is pop-on-read: once a caller observes a parked result, it is
/// gone, matching the original's pull-once recovery path for `POLL`.
pub struct ResultStore {
    parked: Mutex<HashMap<String, Parked>>,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore {
    pub fn new() -> Self {
        Self {
            parked: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self, correlation_id: impl Into<String>, result: EventResult) {
        self.parked.lock().insert(
            correlation_id.into(),
            Parked {
                result,
                stored_at: Utc::now(),
            },
        );
    }

    /// Removes and returns the parked result for `correlation_id`, if any.
    pub fn get(&self, correlation_id: &str) -> Option<EventResult> {
        self.parked.lock().remove(correlation_id).map(|p| p.result)
    }

    pub fn sweep(&self, ttl: chrono::Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let mut parked = self.parked.lock();
        let before = parked.len();
        parked.retain(|_, p| p.stored_at > cutoff);
        before - parked.len()
    }

    pub fn len(&self) -> usize {
        self.parked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
