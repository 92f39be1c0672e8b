//! Server error types.

use thiserror::Error;

use crate::tls::TlsError;

/// Why [`FanoutServer::start`](crate::FanoutServer::start) failed.
#[derive(Debug, Error)]
pub enum StartError {
    /// The server is already running.
    #[error("server is already running")]
    AlreadyRunning,

    /// The bind address does not parse.
    #[error("invalid bind address '{addr}': {source}")]
    InvalidAddress {
        /// Configured address.
        addr: String,
        /// Parse error.
        #[source]
        source: std::net::AddrParseError,
    },

    /// The certificate or key is unusable.
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed.
        addr: std::net::SocketAddr,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },
}
