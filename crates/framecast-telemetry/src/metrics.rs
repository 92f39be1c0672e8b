//! Prometheus metrics for framecast.
//!
//! # Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `framecast_clients_connected` | Gauge | Clients currently in the registry |
//! | `framecast_registrations_rejected_total` | Counter | Registrations refused (full/duplicate/invalid) |
//! | `framecast_broadcasts_total` | Counter | Broadcast calls |
//! | `framecast_frames_sent_total` | Counter | Binary frames delivered to clients |
//! | `framecast_clients_evicted_total` | Counter | Clients removed after a failed send |
//! | `framecast_broadcast_payload_bytes` | Histogram | Payload size per broadcast |
//!
//! Recording functions are no-ops until a recorder is installed, so library
//! code can call them unconditionally.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Gauge of registered clients.
pub const CLIENTS_CONNECTED: &str = "framecast_clients_connected";
/// Counter of refused registrations.
pub const REGISTRATIONS_REJECTED: &str = "framecast_registrations_rejected_total";
/// Counter of broadcast calls.
pub const BROADCASTS: &str = "framecast_broadcasts_total";
/// Counter of delivered frames.
pub const FRAMES_SENT: &str = "framecast_frames_sent_total";
/// Counter of evicted clients.
pub const CLIENTS_EVICTED: &str = "framecast_clients_evicted_total";
/// Histogram of broadcast payload sizes.
pub const BROADCAST_PAYLOAD_BYTES: &str = "framecast_broadcast_payload_bytes";

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether the Prometheus exporter is started.
    pub enabled: bool,

    /// Address to expose metrics on (e.g., "0.0.0.0:9090").
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Installs the Prometheus recorder and its HTTP listener.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    register_metric_descriptions();
    Ok(())
}

fn register_metric_descriptions() {
    describe_gauge!(CLIENTS_CONNECTED, "WebSocket clients currently registered for broadcast");
    describe_counter!(
        REGISTRATIONS_REJECTED,
        "Registrations refused by the client registry"
    );
    describe_counter!(BROADCASTS, "Broadcast calls made by the producer");
    describe_counter!(FRAMES_SENT, "Binary frames delivered to clients");
    describe_counter!(CLIENTS_EVICTED, "Clients evicted after a failed send");
    describe_histogram!(BROADCAST_PAYLOAD_BYTES, "Broadcast payload size in bytes");
}

/// Sets the registered-client gauge.
pub fn set_clients_connected(count: usize) {
    gauge!(CLIENTS_CONNECTED).set(count as f64);
}

/// Records a refused registration.
///
/// `reason` is a short label such as `"full"` or `"duplicate"`.
pub fn record_registration_rejected(reason: &'static str) {
    counter!(REGISTRATIONS_REJECTED, "reason" => reason).increment(1);
}

/// Records one completed broadcast pass.
pub fn record_broadcast(payload_len: usize, delivered: usize, evicted: usize) {
    counter!(BROADCASTS).increment(1);
    counter!(FRAMES_SENT).increment(delivered as u64);
    if evicted > 0 {
        counter!(CLIENTS_EVICTED).increment(evicted as u64);
    }
    histogram!(BROADCAST_PAYLOAD_BYTES).record(payload_len as f64);
}
