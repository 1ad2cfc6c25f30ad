mod bootstrap;
mod cli;

use std::time::Duration;

use clap::Parser;
use tracing::info;

use bootstrap::Bootstrap;
use cli::Cli;
use dispatch_shared::{logging, ServerConfig};

const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    tokio_rustls::rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let cli = Cli::parse();
    let config = ServerConfig::load(&cli.config_dir, &cli.environment)?;

    info!(
        environment = %cli.environment,
        min_workers = config.scaling.min_workers,
        tcp = !cli.no_tcp,
        grpc = !cli.no_grpc,
        "starting dispatch server"
    );

    let server = Bootstrap::start(&cli, config).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining in-flight work");

    server.shutdown(SHUTDOWN_DRAIN_TIMEOUT).await;
    info!("shutdown complete");

    Ok(())
}
