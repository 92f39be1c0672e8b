//! The shared fanout hub.
//!
//! [`FanoutHub`] owns the client registry behind a single async mutex and is
//! shared by `Arc` between the listener, the sessions and the producer.
//! Registration, eviction and clearing all take the same lock, and a
//! broadcast holds it for the whole pass.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use framecast_telemetry::metrics;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::broadcast::{fanout, BroadcastReport};
use crate::config::HubConfig;
use crate::connection::ConnectionId;
use crate::registry::{ClientHandle, ClientRegistry, RegistryError};

/// Cumulative hub counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Clients currently registered.
    pub active_clients: usize,
    /// Registrations accepted since the hub was created.
    pub total_registered: u64,
    /// Registrations refused.
    pub total_rejected: u64,
    /// Clients evicted by broadcasts.
    pub total_evicted: u64,
    /// Broadcast passes run.
    pub total_broadcasts: u64,
    /// Frames delivered across all broadcasts.
    pub total_frames_sent: u64,
}

/// Registry of live clients plus the broadcast entry point.
pub struct FanoutHub<H> {
    registry: Mutex<ClientRegistry<H>>,
    config: HubConfig,
    total_registered: AtomicU64,
    total_rejected: AtomicU64,
    total_evicted: AtomicU64,
    total_broadcasts: AtomicU64,
    total_frames_sent: AtomicU64,
}

impl<H: ClientHandle> FanoutHub<H> {
    /// Create a new hub.
    pub fn new(config: HubConfig) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(ClientRegistry::with_capacity(config.max_clients)),
            config,
            total_registered: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            total_evicted: AtomicU64::new(0),
            total_broadcasts: AtomicU64::new(0),
            total_frames_sent: AtomicU64::new(0),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a freshly upgraded client.
    ///
    /// A refusal is not fatal for the caller; the connection simply never
    /// receives broadcasts.
    pub async fn register(&self, handle: H) -> Result<(), RegistryError> {
        let id = handle.connection_id();
        let mut registry = self.registry.lock().await;

        match registry.register(handle) {
            Ok(()) => {
                self.total_registered.fetch_add(1, Ordering::Relaxed);
                metrics::set_clients_connected(registry.len());
                info!(connection_id = %id, clients = registry.len(), "Client registered");
                Ok(())
            }
            Err(e) => {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                metrics::record_registration_rejected(e.reason());
                warn!(connection_id = %id, clients = registry.len(), error = %e, "Client registration refused");
                Err(e)
            }
        }
    }

    /// Send one binary frame to every registered client.
    ///
    /// Failing clients are evicted; the call itself never fails.
    pub async fn broadcast(&self, payload: Bytes) -> BroadcastReport {
        let mut registry = self.registry.lock().await;
        if registry.is_empty() {
            return BroadcastReport {
                payload_len: payload.len(),
                ..BroadcastReport::default()
            };
        }

        let report = fanout(&mut registry, &payload).await;
        let remaining = registry.len();
        if !report.is_clean() {
            // Under the lock, so a concurrent register cannot be overwritten.
            metrics::set_clients_connected(remaining);
        }
        drop(registry);

        self.total_broadcasts.fetch_add(1, Ordering::Relaxed);
        self.total_frames_sent
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.total_evicted
            .fetch_add(report.evicted.len() as u64, Ordering::Relaxed);

        metrics::record_broadcast(report.payload_len, report.delivered, report.evicted.len());
        if !report.is_clean() {
            for id in &report.evicted {
                info!(connection_id = %id, clients = remaining, "Client evicted");
            }
        }

        report
    }

    /// Drop every registered client.
    pub async fn clear(&self) -> usize {
        let mut registry = self.registry.lock().await;
        let dropped = registry.clear();
        metrics::set_clients_connected(0);
        drop(registry);
        if dropped > 0 {
            debug!(dropped, "Client registry cleared");
        }
        dropped
    }

    /// Number of registered clients.
    pub async fn len(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Whether no clients are registered.
    pub async fn is_empty(&self) -> bool {
        self.registry.lock().await.is_empty()
    }

    /// Whether a client is registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.registry.lock().await.contains(id)
    }

    /// Registered connection IDs in slot order.
    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        self.registry.lock().await.connection_ids()
    }

    /// Snapshot of the hub counters.
    pub async fn stats(&self) -> HubStats {
        HubStats {
            active_clients: self.len().await,
            total_registered: self.total_registered.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            total_broadcasts: self.total_broadcasts.load(Ordering::Relaxed),
            total_frames_sent: self.total_frames_sent.load(Ordering::Relaxed),
        }
    }
}
