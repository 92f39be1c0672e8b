//! Bounded, ordered registry of live WebSocket clients.
//!
//! The registry is a fixed-capacity list. Insertion order is kept, a new
//! client is refused once the list is full, and removal shifts every later
//! client down one slot so the list stays compacted.

use std::future::Future;

use bytes::Bytes;
use thiserror::Error;

use crate::connection::ConnectionId;
use crate::error::WsResult;

/// A handle to one connected client, as seen by the registry and the
/// broadcast engine.
pub trait ClientHandle: Send + Sync {
    /// Identity of the underlying connection.
    fn connection_id(&self) -> ConnectionId;

    /// Whether the transport is still believed usable.
    fn is_valid(&self) -> bool;

    /// Send one binary frame to the client.
    fn send_binary(&self, payload: Bytes) -> impl Future<Output = WsResult<()>> + Send;
}

/// Reasons a client cannot be registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Every slot is taken.
    #[error("client registry is full ({capacity} clients)")]
    Full {
        /// Registry capacity.
        capacity: usize,
    },

    /// The connection is already registered.
    #[error("connection {0} is already registered")]
    Duplicate(ConnectionId),

    /// The handle reported itself invalid at insertion.
    #[error("connection {0} is no longer valid")]
    InvalidHandle(ConnectionId),
}

impl RegistryError {
    /// Short label used as a metrics tag.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Full { .. } => "full",
            Self::Duplicate(_) => "duplicate",
            Self::InvalidHandle(_) => "invalid",
        }
    }
}

/// Ordered, fixed-capacity collection of client handles.
#[derive(Debug)]
pub struct ClientRegistry<H> {
    clients: Vec<H>,
    capacity: usize,
}

impl<H: ClientHandle> Default for ClientRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ClientHandle> ClientRegistry<H> {
    /// Create an empty registry with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(crate::config::DEFAULT_MAX_CLIENTS)
    }

    /// Create an empty registry holding at most `capacity` clients.
    ///
    /// Only up to [`MAX_CLIENTS_LIMIT`](crate::config::MAX_CLIENTS_LIMIT) slots
    /// are allocated up front; the rest grow on demand.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            clients: Vec::with_capacity(capacity.min(crate::config::MAX_CLIENTS_LIMIT)),
            capacity,
        }
    }

    /// Append a client at the end of the list.
    pub fn register(&mut self, handle: H) -> Result<(), RegistryError> {
        if self.is_full() {
            return Err(RegistryError::Full {
                capacity: self.capacity,
            });
        }

        let id = handle.connection_id();
        if self.contains(id) {
            return Err(RegistryError::Duplicate(id));
        }
        if !handle.is_valid() {
            return Err(RegistryError::InvalidHandle(id));
        }

        self.clients.push(handle);
        Ok(())
    }

    /// Remove the client at `index`, shifting later clients down.
    pub fn remove_at(&mut self, index: usize) -> Option<H> {
        (index < self.clients.len()).then(|| self.clients.remove(index))
    }

    /// Get the client at `index`.
    pub fn get(&self, index: usize) -> Option<&H> {
        self.clients.get(index)
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Whether every slot is taken.
    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.capacity
    }

    /// Maximum number of clients.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a client with this connection ID is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.clients.iter().any(|c| c.connection_id() == id)
    }

    /// Iterate over `(slot, handle)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &H)> {
        self.clients.iter().enumerate()
    }

    /// Snapshot of registered connection IDs in slot order.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.clients.iter().map(ClientHandle::connection_id).collect()
    }

    /// Drop every client, returning how many were registered.
    pub fn clear(&mut self) -> usize {
        let dropped = self.clients.len();
        self.clients.clear();
        dropped
    }
}
