//! Server configuration types.
//!
//! # Example
//!
//! ```rust
//! use framecast_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .bind_addr("127.0.0.1:8443")
//!     .max_clients(4)
//!     .shutdown_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(config.bind_addr(), "127.0.0.1:8443");
//! assert_eq!(config.max_clients(), 4);
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use framecast_ws::{HubConfig, WebSocketConfig, DEFAULT_MAX_CLIENTS, DEFAULT_SEND_TIMEOUT};

/// Default bind address (HTTPS on all interfaces).
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:443";

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Where the server certificate chain and private key come from.
#[derive(Clone)]
pub enum TlsConfig {
    /// PEM blobs embedded in the binary or already in memory.
    Pem {
        /// Certificate chain, PEM encoded.
        cert: Vec<u8>,
        /// Private key, PEM encoded.
        key: Vec<u8>,
    },
    /// PEM files read when the server starts.
    Files {
        /// Certificate chain path.
        cert_path: PathBuf,
        /// Private key path.
        key_path: PathBuf,
    },
}

impl TlsConfig {
    /// TLS material from in-memory PEM blobs.
    pub fn from_pem(cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self::Pem {
            cert: cert.into(),
            key: key.into(),
        }
    }

    /// TLS material from PEM files.
    pub fn from_files(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self::Files {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pem { cert, .. } => f
                .debug_struct("Pem")
                .field("cert_len", &cert.len())
                .field("key", &"<redacted>")
                .finish(),
            Self::Files {
                cert_path,
                key_path,
            } => f
                .debug_struct("Files")
                .field("cert_path", cert_path)
                .field("key_path", key_path)
                .finish(),
        }
    }
}

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    bind_addr: String,
    shutdown_timeout: Duration,
    max_clients: usize,
    send_timeout: Duration,
    tls: Option<TlsConfig>,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the bind address.
    #[must_use]
    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    /// Parses the bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_addr.parse()
    }

    /// How long `stop` waits for connections to finish.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Client registry capacity.
    #[must_use]
    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Bound on a single frame write.
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// TLS material, if the listener terminates TLS.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    /// Hub settings derived from this configuration.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig::new().max_clients(self.max_clients)
    }

    /// Per-connection WebSocket settings derived from this configuration.
    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::new().send_timeout(self.send_timeout)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    bind_addr: String,
    shutdown_timeout: Duration,
    max_clients: usize,
    send_timeout: Duration,
    tls: Option<TlsConfig>,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            max_clients: DEFAULT_MAX_CLIENTS,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            tls: None,
        }
    }

    /// Sets the bind address (e.g. `"0.0.0.0:443"`, `"127.0.0.1:0"`).
    #[must_use]
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Sets the graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the client registry capacity.
    #[must_use]
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Sets the per-frame send timeout.
    #[must_use]
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Terminates TLS with the given material.
    #[must_use]
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Serves plain HTTP.
    #[must_use]
    pub fn without_tls(mut self) -> Self {
        self.tls = None;
        self
    }

    /// Builds the [`ServerConfig`].
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind_addr,
            shutdown_timeout: self.shutdown_timeout,
            max_clients: self.max_clients,
            send_timeout: self.send_timeout,
            tls: self.tls,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
