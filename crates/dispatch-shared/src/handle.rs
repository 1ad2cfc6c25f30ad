//! Transport-agnostic response delivery.
//!
//! Replaces the original's untyped client-context grab bag (a TCP writer
//! in one manager, a threading event + mutable container in the other)
//! with a single object-safe trait each ingress implements once.

use std::fmt;
use std::sync::Arc;

use crate::errors::DispatchError;
use crate::types::EventResult;

pub trait ResponseSink: Send + Sync + fmt::Debug {
    /// Delivers a completed result to whichever client is waiting on it.
    /// Implementations are responsible for framing/encoding on their own
    /// transport; failure here causes the caller to park the result
    /// instead.
    fn deliver(&self, result: &EventResult) -> Result<(), DispatchError>;
}

/// Cheaply cloneable handle stored in a `ClientTaskRecord`.
#[derive(Clone, Debug)]
pub struct ClientHandle(Arc<dyn ResponseSink>);

impl ClientHandle {
    pub fn new(sink: Arc<dyn ResponseSink>) -> Self {
        Self(sink)
    }

    pub fn deliver(&self, result: &EventResult) -> Result<(), DispatchError> {
        self.0.deliver(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

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

    #[test]
    fn handle_forwards_to_underlying_sink() {
        let sink = Arc::new(RecordingSink::default());
        let handle = ClientHandle::new(sink.clone());
        let result = EventResult::success("cid", serde_json::Value::Null);
        handle.deliver(&result).unwrap();
        assert_eq!(sink.received.lock().unwrap().len(), 1);
    }
}
