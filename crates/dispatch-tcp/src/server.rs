use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use dispatch_codec::Codec;
use dispatch_manager::TaskManager;
use dispatch_shared::config::TcpConfig;
use dispatch_shared::DispatchError;

use crate::connection::handle_connection;
use crate::tls::build_acceptor;

/// Accepts connections until the returned task is aborted. Each connection
/// is handled on its own spawned task so a slow or stalled peer never
/// blocks new connections from being accepted.
pub async fn serve(config: TcpConfig, manager: Arc<TaskManager>, codec: Codec) -> Result<(), DispatchError> {
    let acceptor = build_acceptor(&config)?;
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(DispatchError::Io)?;

    info!(host = %config.host, port = config.port, tls = acceptor.is_some(), "tcp ingress listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                error!(error = %err, "tcp accept failed");
                continue;
            }
        };

        let manager = manager.clone();
        let codec = codec.clone();
        let acceptor = acceptor.clone();

        tokio::spawn(async move {
            match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => handle_connection(tls_stream, manager, codec).await,
                    Err(err) => error!(%peer, error = %err, "tls handshake failed"),
                },
                None => handle_connection(stream, manager, codec).await,
            }
        });
    }
}
