//! `dispatch-core` is a workspace, not a library consumed by itself: this
//! crate exists only to give the root package a build target.
//!
//! Pick a crate instead:
//!
//! - `dispatch-shared` — common types, config, error taxonomy
//! - `dispatch-codec` — signed/compressed wire format
//! - `dispatch-registry` — event registration
//! - `dispatch-tracking` — in-flight task and result tracking
//! - `dispatch-monitor` — worker resource sampling
//! - `dispatch-scaling` — adaptive worker-count decisions
//! - `dispatch-pool` — process-isolated worker pool
//! - `dispatch-manager` — task orchestration
//! - `dispatch-tcp` / `dispatch-grpc` — ingress transports
//! - `dispatch-server` / `dispatch-worker-bin` — the two binaries
