//! TCP ingress: manual length-prefix framing, optional TLS/mTLS, and the
//! magic `POLL` control event.

mod connection;
mod framing;
mod server;
mod tls;

pub use server::serve;
