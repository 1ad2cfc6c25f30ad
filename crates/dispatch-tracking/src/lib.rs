//! In-flight task registry and parked-result store.
//!
//! Two distinct structures rather than one: the registry tracks work that
//! still owns a live client handle; the store holds results whose handle
//! is gone, so a later `POLL` can still recover them.

mod record;
mod registry;
mod result_store;

pub use record::{ClientTaskRecord, TaskState};
pub use registry::ClientTaskRegistry;
pub use result_store::ResultStore;
