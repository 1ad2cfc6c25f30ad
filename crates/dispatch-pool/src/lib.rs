//! Dynamically resizable, process-isolated worker pool.
//!
//! Each task runs in its own spawned `dispatch-worker-bin` process (the
//! Rust analogue of `multiprocessing`'s spawn start method), communicating
//! over length-prefixed signed frames on stdio.

mod framing;
mod pool;
mod proxy;

pub use pool::{PoolConfig, WorkerPool};
pub use proxy::ProxyTask;
