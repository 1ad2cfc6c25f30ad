use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "dispatch-server", about = "Multi-protocol distributed task execution server")]
pub struct Cli {
    /// Directory containing default.toml and {environment}.toml overrides.
    #[arg(long, env = "DISPATCH_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Environment name, selects config/{environment}.toml as an override layer.
    #[arg(long, env = "DISPATCH_ENVIRONMENT", default_value = "development")]
    pub environment: String,

    /// Path to the dispatch-worker-bin executable this process spawns per task.
    #[arg(long, env = "DISPATCH_WORKER_BIN", default_value = "dispatch-worker")]
    pub worker_binary: String,

    /// Disable the TCP ingress even if configured.
    #[arg(long)]
    pub no_tcp: bool,

    /// Disable the gRPC ingress even if configured.
    #[arg(long)]
    pub no_grpc: bool,
}
