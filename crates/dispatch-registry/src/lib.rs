//! Name -> event-factory registry.
//!
//! Events are registered explicitly at process startup (see
//! `dispatch-worker-bin` and `dispatch-server`'s bootstrap) rather than
//! discovered by reflecting over importable modules. Re-registering the
//! same concrete factory type under its own name is a harmless no-op
//! (warned, not rejected) so idempotent bootstrap code doesn't need to
//! guard registration by hand; registering a *different* type under a
//! name already taken is a startup-time bug and rejected outright.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use dispatch_shared::{DispatchError, EventFactory};

pub mod builtin;

struct Entry {
    factory: Arc<dyn EventFactory>,
    type_id: TypeId,
}

/// Process-wide name -> factory table. Readiness is monotonic: once the
/// first registration succeeds, `is_ready` never goes back to false.
///
/// Single non-reentrant mutex: registry methods never call each other
/// while holding the lock, so the mutual-exclusion guarantee the original
/// reentrant lock provided holds without needing actual reentrancy.
pub struct EventRegistry {
    inner: Mutex<HashMap<String, Entry>>,
    by_module: Mutex<HashMap<&'static str, Vec<String>>>,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            by_module: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `factory` under `factory.event_name()`.
    ///
    /// - Same name, same concrete type: logs a warning, keeps the existing
    ///   entry, returns `Ok`.
    /// - Same name, different concrete type: `ConflictingRegistration`.
    pub fn register(&self, factory: Arc<dyn EventFactory>) -> Result<(), DispatchError> {
        let name = factory.event_name();
        let type_id = factory.type_id();
        let mut table = self.inner.lock();

        if let Some(existing) = table.get(name) {
            if existing.type_id == type_id {
                warn!(event = name, "event re-registered under the same name; ignoring");
                return Ok(());
            }
            return Err(DispatchError::ConflictingRegistration(name.to_string()));
        }

        self.by_module
            .lock()
            .entry(factory.module_label())
            .or_default()
            .push(name.to_string());

        table.insert(
            name.to_string(),
            Entry {
                factory,
                type_id,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn EventFactory>> {
        self.inner.lock().get(name).map(|entry| entry.factory.clone())
    }

    pub fn is_ready(&self) -> bool {
        !self.inner.lock().is_empty()
    }

    pub fn list_by_module(&self, module_label: &str) -> Vec<String> {
        self.by_module
            .lock()
            .get(module_label)
            .cloned()
            .unwrap_or_default()
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.inner.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dispatch_shared::{impl_factory_type_id, Event};
    use serde_json::{Map, Value};

    #[derive(Debug)]
    struct FactoryA;
    #[derive(Debug)]
    struct FactoryB;

    #[derive(Debug)]
    struct NoopEvent;

    #[async_trait]
    impl Event for NoopEvent {
        async fn invoke(&self, _task_id: &str) -> Result<Value, DispatchError> {
            Ok(Value::Null)
        }
    }

    impl EventFactory for FactoryA {
        fn event_name(&self) -> &'static str {
            "shared_name"
        }
        impl_factory_type_id!(FactoryA);
        fn instantiate(&self, _task_id: &str, _args: &Map<String, Value>) -> Result<Box<dyn Event>, DispatchError> {
            Ok(Box::new(NoopEvent))
        }
    }

    impl EventFactory for FactoryB {
        fn event_name(&self) -> &'static str {
            "shared_name"
        }
        impl_factory_type_id!(FactoryB);
        fn instantiate(&self, _task_id: &str, _args: &Map<String, Value>) -> Result<Box<dyn Event>, DispatchError> {
            Ok(Box::new(NoopEvent))
        }
    }

    #[test]
    fn registers_and_looks_up_by_name() {
        let registry = EventRegistry::new();
        registry.register(Arc::new(FactoryA)).unwrap();
        assert!(registry.lookup("shared_name").is_some());
        assert!(registry.is_ready());
    }

    #[test]
    fn reregistering_same_type_is_a_harmless_noop() {
        let registry = EventRegistry::new();
        registry.register(Arc::new(FactoryA)).unwrap();
        registry.register(Arc::new(FactoryA)).unwrap();
    }

    #[test]
    fn conflicting_types_under_same_name_is_rejected() {
        let registry = EventRegistry::new();
        registry.register(Arc::new(FactoryA)).unwrap();
        let err = registry.register(Arc::new(FactoryB)).unwrap_err();
        assert!(matches!(err, DispatchError::ConflictingRegistration(name) if name == "shared_name"));
    }

    #[test]
    fn unknown_name_lookup_returns_none() {
        let registry = EventRegistry::new();
        assert!(registry.lookup("nope").is_none());
        assert!(!registry.is_ready());
    }
}
