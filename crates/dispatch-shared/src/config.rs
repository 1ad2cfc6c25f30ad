//! Layered process configuration.
//!
//! Loads `config/default.toml`, then `config/{environment}.toml` if present,
//! then environment variables prefixed `DISPATCH_` with `__` as the nesting
//! separator (e.g. `DISPATCH_SCALING__MIN_WORKERS=2`).

use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::errors::DispatchError;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub codec: CodecConfig,
    pub manager: ManagerConfig,
    pub tcp: TcpConfig,
    pub grpc: GrpcConfig,
    pub scaling: ScalingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodecConfig {
    /// HMAC key for the wire codec. Read from the environment in
    /// production deployments rather than checked into `default.toml`.
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    pub worker_count: usize,
    pub max_pending_tasks: usize,
    pub task_timeout_secs: u64,
    pub task_registry_ttl_secs: u64,
    pub task_result_ttl_secs: u64,
    #[serde(default)]
    pub allowed_events: Option<Vec<String>>,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_cleanup_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
    pub default_connection_timeout_secs: u64,
    pub data_chunk_size: usize,
    pub connection_backlog_size: u32,
    #[serde(default)]
    pub tls_cert_path: Option<String>,
    #[serde(default)]
    pub tls_key_path: Option<String>,
    #[serde(default)]
    pub tls_client_ca_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrpcConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_execute_timeout")]
    pub execute_timeout_secs: u64,
}

fn default_execute_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScalingConfig {
    pub min_workers: usize,
    pub max_cpu_quota: f64,
    pub max_memory_quota_gb: f64,
    pub cpu_per_worker: f64,
    pub memory_per_worker_gb: f64,
    pub parallelism_multiplier: usize,
    pub scale_up_threshold: f64,
    pub scale_down_timeout_secs: u64,
    pub cpu_threshold_scale_up: f64,
    pub cpu_threshold_scale_down: f64,
    pub memory_threshold: f64,
    pub monitoring_interval_secs: u64,
    #[serde(default)]
    pub aggressive_scaling: bool,
}

impl ServerConfig {
    /// Loads configuration from `config/default.toml`, an optional
    /// `config/{environment}.toml` override, and `DISPATCH_`-prefixed
    /// environment variables, in that precedence order.
    pub fn load(config_dir: &Path, environment: &str) -> Result<Self, DispatchError> {
        let default_path = config_dir.join("default.toml");
        let env_path = config_dir.join(format!("{environment}.toml"));

        let mut builder = Config::builder().add_source(File::from(default_path));
        if env_path.exists() {
            builder = builder.add_source(File::from(env_path));
        }
        builder = builder.add_source(
            Environment::with_prefix("DISPATCH")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| DispatchError::Configuration(e.to_string()))?;
        config
            .try_deserialize()
            .map_err(|e| DispatchError::Configuration(e.to_string()))
    }
}
