//! A handful of built-in events registered by both `dispatch-server` and
//! `dispatch-worker-bin` so the two processes agree on a minimal shared
//! vocabulary without either needing a plugin-loading mechanism. Real
//! deployments register their own event factories alongside these.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use dispatch_shared::{impl_factory_type_id, DispatchError, Event, EventFactory};

use crate::EventRegistry;

#[derive(Debug)]
pub struct EchoFactory;

#[derive(Debug)]
struct EchoEvent {
    payload: Value,
}

#[async_trait]
impl Event for EchoEvent {
    async fn invoke(&self, _task_id: &str) -> Result<Value, DispatchError> {
        Ok(self.payload.clone())
    }
}

impl EventFactory for EchoFactory {
    fn event_name(&self) -> &'static str {
        "echo"
    }

    fn module_label(&self) -> &'static str {
        "builtin"
    }

    impl_factory_type_id!(EchoFactory);

    fn instantiate(&self, _task_id: &str, args: &Map<String, Value>) -> Result<Box<dyn Event>, DispatchError> {
        Ok(Box::new(EchoEvent {
            payload: Value::Object(args.clone()),
        }))
    }
}

#[derive(Debug)]
pub struct SleepFactory;

#[derive(Debug)]
struct SleepEvent {
    millis: u64,
}

#[async_trait]
impl Event for SleepEvent {
    async fn invoke(&self, _task_id: &str) -> Result<Value, DispatchError> {
        tokio::time::sleep(std::time::Duration::from_millis(self.millis)).await;
        Ok(Value::from(self.millis))
    }
}

impl EventFactory for SleepFactory {
    fn event_name(&self) -> &'static str {
        "sleep"
    }

    fn module_label(&self) -> &'static str {
        "builtin"
    }

    impl_factory_type_id!(SleepFactory);

    fn instantiate(&self, _task_id: &str, args: &Map<String, Value>) -> Result<Box<dyn Event>, DispatchError> {
        let millis = args
            .get("millis")
            .and_then(Value::as_u64)
            .ok_or_else(|| DispatchError::InvalidArgs("missing integer 'millis'".into()))?;
        Ok(Box::new(SleepEvent { millis }))
    }
}

#[derive(Debug)]
pub struct FailFactory;

#[derive(Debug)]
struct FailEvent {
    message: String,
}

#[async_trait]
impl Event for FailEvent {
    async fn invoke(&self, _task_id: &str) -> Result<Value, DispatchError> {
        Err(DispatchError::ExecutionFailed(self.message.clone()))
    }
}

impl EventFactory for FailFactory {
    fn event_name(&self) -> &'static str {
        "fail"
    }

    fn module_label(&self) -> &'static str {
        "builtin"
    }

    impl_factory_type_id!(FailFactory);

    fn instantiate(&self, _task_id: &str, args: &Map<String, Value>) -> Result<Box<dyn Event>, DispatchError> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("intentional failure")
            .to_string();
        Ok(Box::new(FailEvent { message }))
    }
}

/// Registers the built-in event set. Call once at process startup, in
/// both the manager process and the worker binary.
pub fn register_builtin(registry: &EventRegistry) -> Result<(), DispatchError> {
    registry.register(Arc::new(EchoFactory))?;
    registry.register(Arc::new(SleepFactory))?;
    registry.register(Arc::new(FailFactory))?;
    Ok(())
}
