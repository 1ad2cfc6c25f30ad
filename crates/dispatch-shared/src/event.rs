//! Explicit event registration traits.
//!
//! The original implementation discovered task classes by reflection over
//! importable modules. This workspace registers event factories explicitly
//! (see `dispatch-registry`) instead; this module defines the trait objects
//! the registry stores and the worker process invokes.

use std::any::TypeId;
use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::DispatchError;

/// A single, already-validated unit of work. Constructed by an
/// [`EventFactory`] from a task's arguments; invoked once.
#[async_trait]
pub trait Event: Send + Sync {
    /// Runs the event to completion. Returning `Err` produces an
    /// `EventResult::error` with `code = "EXECUTION_FAILED"`; the event
    /// should return `Ok` for any outcome it considers a normal result,
    /// including an application-level failure payload.
    async fn invoke(&self, task_id: &str) -> Result<Value, DispatchError>;
}

/// Registered once per event name. Mints [`Event`] instances from raw
/// JSON arguments, rejecting malformed ones before a task ever reaches a
/// queue.
pub trait EventFactory: Send + Sync + fmt::Debug {
    /// Name clients submit tasks under; must be unique across the registry.
    fn event_name(&self) -> &'static str;

    /// Logical grouping used for `list_by_module`-style registry queries.
    /// Mirrors the original registry's per-module namespacing.
    fn module_label(&self) -> &'static str {
        "default"
    }

    /// Identifies the concrete factory type, so the registry can tell a
    /// harmless re-registration of the same type from a genuine name
    /// collision between two different types.
    fn type_id(&self) -> TypeId;

    /// Validates `args` and builds an [`Event`]. Validation failures become
    /// `DispatchError::InvalidArgs`.
    fn instantiate(
        &self,
        task_id: &str,
        args: &Map<String, Value>,
    ) -> Result<Box<dyn Event>, DispatchError>;
}

/// Blanket helper for factories implemented as zero-sized marker structs,
/// the common case for statically registered events.
#[macro_export]
macro_rules! impl_factory_type_id {
    ($ty:ty) => {
        fn type_id(&self) -> ::std::any::TypeId {
            ::std::any::TypeId::of::<$ty>()
        }
    };
}
