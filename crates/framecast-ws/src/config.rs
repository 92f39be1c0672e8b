//! WebSocket and fanout configuration.

use std::time::Duration;

/// Default number of clients the registry holds.
pub const DEFAULT_MAX_CLIENTS: usize = 10;

/// Largest registry capacity accepted from settings.
pub const MAX_CLIENTS_LIMIT: usize = 1024;

/// Default bound on a single outbound frame write.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a WebSocket connection.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Upper bound on one send, after which the client is treated as dead
    /// (default: 5 seconds).
    pub send_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl WebSocketConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }
}

/// Configuration for the fanout hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Registry capacity (default: 10).
    pub max_clients: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

impl HubConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the registry capacity.
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_config_default() {
        let config = WebSocketConfig::default();
        assert_eq!(config.send_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_websocket_config_builder() {
        let config = WebSocketConfig::new().send_timeout(Duration::from_millis(250));
        assert_eq!(config.send_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_hub_config() {
        assert_eq!(HubConfig::default().max_clients, 10);
        assert_eq!(HubConfig::new().max_clients(3).max_clients, 3);
    }
}
