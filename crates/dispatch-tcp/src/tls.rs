//! Optional TLS / mutual-TLS for the TCP ingress.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use dispatch_shared::config::TcpConfig;
use dispatch_shared::DispatchError;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{RootCertStore, ServerConfig as RustlsServerConfig};
use tokio_rustls::TlsAcceptor;

/// Builds a `TlsAcceptor` when `tls_cert_path`/`tls_key_path` are
/// configured; `None` if TCP ingress should run in plaintext. When
/// `tls_client_ca_path` is also set, client certificates are required
/// (mTLS) rather than merely accepted.
pub fn build_acceptor(config: &TcpConfig) -> Result<Option<TlsAcceptor>, DispatchError> {
    let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path) else {
        return Ok(None);
    };

    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let builder = RustlsServerConfig::builder();
    let server_config = if let Some(ca_path) = &config.tls_client_ca_path {
        let mut roots = RootCertStore::empty();
        for cert in load_certs(ca_path)? {
            roots
                .add(cert)
                .map_err(|e| DispatchError::Configuration(format!("invalid client CA cert: {e}")))?;
        }
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| DispatchError::Configuration(format!("client verifier: {e}")))?;
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .map_err(|e| DispatchError::Configuration(e.to_string()))?
    } else {
        builder
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| DispatchError::Configuration(e.to_string()))?
    };

    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, DispatchError> {
    let file = File::open(path).map_err(DispatchError::Io)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DispatchError::Configuration(format!("reading {path}: {e}")))
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>, DispatchError> {
    let file = File::open(path).map_err(DispatchError::Io)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| DispatchError::Configuration(format!("reading {path}: {e}")))?
        .ok_or_else(|| DispatchError::Configuration(format!("no private key found in {path}")))
}
