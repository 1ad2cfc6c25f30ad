//! Tracing initialization, shared by `dispatch-server` and `dispatch-worker-bin`.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing_subscriber::fmt` subscriber driven by `RUST_LOG`
/// (falling back to `info`), writing to stderr so stdout stays free for
/// binaries that use it as a data channel (the worker process does).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
