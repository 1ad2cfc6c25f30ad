//! Shared types, error taxonomy, configuration and logging init for the
//! dispatch core workspace.

pub mod config;
pub mod errors;
pub mod event;
pub mod handle;
pub mod logging;
pub mod types;

pub use config::ServerConfig;
pub use errors::{DispatchError, DispatchResult};
pub use event::{Event, EventFactory};
pub use handle::{ClientHandle, ResponseSink};
pub use types::{
    EventResult, EventStatus, Protocol, ScalingSnapshot, ScalingVerdict, TaskMessage, TaskStatus,
};
