//! File and environment settings for the framecast binary.
//!
//! Settings are layered: built-in defaults, then an optional TOML or JSON
//! file (chosen by extension), then `FRAMECAST_*` environment variables.
//!
//! A `[tls]` section is required unless `server.allow_plaintext` is set.
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:443"
//! max_clients = 10
//! send_timeout_ms = 5000
//! shutdown_timeout_secs = 10
//! allow_plaintext = false
//!
//! [tls]
//! cert_path = "/etc/framecast/servercert.pem"
//! key_path = "/etc/framecast/prvtkey.pem"
//!
//! [logging]
//! level = "info"
//! json = true
//!
//! [metrics]
//! addr = "0.0.0.0:9090"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use framecast_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};
use framecast_ws::MAX_CLIENTS_LIMIT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{
    ServerConfig, TlsConfig, DEFAULT_BIND_ADDR, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};

/// Errors loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML or JSON.
    #[error("invalid settings file {path}: {message}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The file extension is neither `.toml` nor `.json`.
    #[error("unsupported settings format: {0:?}")]
    UnsupportedFormat(String),

    /// An environment variable holds an unparsable value.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// A value is out of range or inconsistent.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listener and fanout settings.
    pub server: ServerSettings,
    /// TLS material. Absent only with `server.allow_plaintext`.
    pub tls: Option<TlsSettings>,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Metrics exporter settings.
    pub metrics: MetricsSettings,
}

/// Listener and fanout settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    pub bind_addr: String,
    /// Client registry capacity.
    pub max_clients: usize,
    /// Per-frame send timeout in milliseconds.
    pub send_timeout_ms: u64,
    /// Graceful shutdown timeout in seconds.
    pub shutdown_timeout_secs: u64,
    /// Serve plain HTTP when no TLS material is configured.
    pub allow_plaintext: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_clients: framecast_ws::DEFAULT_MAX_CLIENTS,
            send_timeout_ms: 5_000,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            allow_plaintext: false,
        }
    }
}

/// PEM file locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    /// Certificate chain.
    pub cert_path: PathBuf,
    /// Private key.
    pub key_path: PathBuf,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive.
    pub level: String,
    /// JSON output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Prometheus listener address; exporter disabled when absent.
    pub addr: Option<String>,
}

impl Settings {
    /// Load settings from a `.toml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let parse_error = |message: String| SettingsError::Parse {
            path: path.to_path_buf(),
            message,
        };
        match extension {
            "toml" => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
            "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
            other => Err(SettingsError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Apply `FRAMECAST_*` environment variable overrides.
    pub fn with_env_overrides(self) -> Result<Self, SettingsError> {
        self.with_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, SettingsError> {
            value
                .trim()
                .parse()
                .map_err(|_| SettingsError::InvalidEnv { var, value })
        }

        if let Some(addr) = lookup("FRAMECAST_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(v) = lookup("FRAMECAST_MAX_CLIENTS") {
            self.server.max_clients = parse("FRAMECAST_MAX_CLIENTS", v)?;
        }
        if let Some(v) = lookup("FRAMECAST_SEND_TIMEOUT_MS") {
            self.server.send_timeout_ms = parse("FRAMECAST_SEND_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("FRAMECAST_SHUTDOWN_TIMEOUT_SECS") {
            self.server.shutdown_timeout_secs = parse("FRAMECAST_SHUTDOWN_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("FRAMECAST_ALLOW_PLAINTEXT") {
            self.server.allow_plaintext = parse("FRAMECAST_ALLOW_PLAINTEXT", v)?;
        }

        match (lookup("FRAMECAST_TLS_CERT"), lookup("FRAMECAST_TLS_KEY")) {
            (Some(cert), Some(key)) => {
                self.tls = Some(TlsSettings {
                    cert_path: cert.into(),
                    key_path: key.into(),
                });
            }
            (Some(cert), None) => match self.tls.as_mut() {
                Some(tls) => tls.cert_path = cert.into(),
                None => {
                    return Err(SettingsError::Invalid(
                        "FRAMECAST_TLS_CERT set without FRAMECAST_TLS_KEY".into(),
                    ))
                }
            },
            (None, Some(key)) => match self.tls.as_mut() {
                Some(tls) => tls.key_path = key.into(),
                None => {
                    return Err(SettingsError::Invalid(
                        "FRAMECAST_TLS_KEY set without FRAMECAST_TLS_CERT".into(),
                    ))
                }
            },
            (None, None) => {}
        }

        if let Some(level) = lookup("FRAMECAST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(v) = lookup("FRAMECAST_LOG_JSON") {
            self.logging.json = parse("FRAMECAST_LOG_JSON", v)?;
        }
        if let Some(addr) = lookup("FRAMECAST_METRICS_ADDR") {
            self.metrics.addr = Some(addr).filter(|a| !a.is_empty());
        }

        Ok(self)
    }

    /// Check values that would only fail later at start.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(1..=MAX_CLIENTS_LIMIT).contains(&self.server.max_clients) {
            return Err(SettingsError::Invalid(format!(
                "max_clients must be between 1 and {MAX_CLIENTS_LIMIT}, got {}",
                self.server.max_clients
            )));
        }
        if self.server.send_timeout_ms == 0 {
            return Err(SettingsError::Invalid("send_timeout_ms must be positive".into()));
        }
        if self.server.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(SettingsError::Invalid(format!(
                "bind_addr '{}' is not a socket address",
                self.server.bind_addr
            )));
        }
        if self.tls.is_none() && !self.server.allow_plaintext {
            return Err(SettingsError::Invalid(
                "no TLS certificate configured; set [tls] or server.allow_plaintext = true".into(),
            ));
        }
        if let Some(addr) = &self.metrics.addr {
            if addr.parse::<std::net::SocketAddr>().is_err() {
                return Err(SettingsError::Invalid(format!(
                    "metrics addr '{addr}' is not a socket address"
                )));
            }
        }
        Ok(())
    }

    /// Server configuration described by these settings.
    pub fn to_server_config(&self) -> ServerConfig {
        let mut builder = ServerConfig::builder()
            .bind_addr(self.server.bind_addr.clone())
            .max_clients(self.server.max_clients)
            .send_timeout(Duration::from_millis(self.server.send_timeout_ms))
            .shutdown_timeout(Duration::from_secs(self.server.shutdown_timeout_secs));
        if let Some(tls) = &self.tls {
            builder = builder.tls(TlsConfig::from_files(tls.cert_path.clone(), tls.key_path.clone()));
        }
        builder.build()
    }

    /// Telemetry configuration described by these settings.
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            logging: LogConfig::production()
                .with_level(self.logging.level.clone())
                .with_json(self.logging.json),
            metrics: MetricsConfig {
                enabled: self.metrics.addr.is_some(),
                addr: self.metrics.addr.clone().unwrap_or_default(),
            },
        }
    }
}
