use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::warn;

use crate::record::{ClientTaskRecord, TaskState};

/// Mapping correlation_id -> in-flight task record.
///
/// Mutual exclusion with [`crate::ResultStore`] is an invariant enforced by
/// the caller (the task manager): a correlation id is removed from this
/// registry before (or exactly when) its result is parked in the store, so
/// the two structures never simultaneously hold the same id.
pub struct ClientTaskRegistry {
    tasks: Mutex<HashMap<String, ClientTaskRecord>>,
}

impl Default for ClientTaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientTaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts `record`. If an entry already exists for the same
    /// correlation id, the new record's mutable fields overwrite the old
    /// one's (matching the original's dict-merge-with-warning behavior)
    /// rather than silently discarding either.
    pub fn register(&self, record: ClientTaskRecord) {
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&record.correlation_id) {
            warn!(
                correlation_id = %record.correlation_id,
                "client task registry: overwriting existing in-flight record"
            );
        }
        tasks.insert(record.correlation_id.clone(), record);
    }

    pub fn get(&self, correlation_id: &str) -> Option<ClientTaskRecord> {
        self.tasks.lock().get(correlation_id).cloned()
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.tasks.lock().contains_key(correlation_id)
    }

    pub fn remove(&self, correlation_id: &str) -> Option<ClientTaskRecord> {
        self.tasks.lock().remove(correlation_id)
    }

    pub fn set_status(&self, correlation_id: &str, status: TaskState) {
        if let Some(record) = self.tasks.lock().get_mut(correlation_id) {
            record.status = status;
        }
    }

    /// Removes every record whose `created_at` is older than `ttl`.
    /// Returns the number of entries swept.
    pub fn sweep(&self, ttl: chrono::Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|_, record| record.created_at > cutoff);
        before - tasks.len()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
