//! WebSocket client registry and binary broadcast fanout for framecast.
//!
//! This crate holds everything between an upgraded HTTP connection and the
//! producer pushing frames:
//!
//! - **Upgrade** handling per RFC 6455 ([`upgrade`])
//! - **Connection handles** with a send timeout and a shared closed flag
//!   ([`WebSocket`], [`WebSocketSender`])
//! - **Client registry**, bounded and ordered ([`ClientRegistry`])
//! - **Fanout** that evicts failing clients in place ([`fanout`])
//! - **Hub** sharing the registry between sessions and the producer
//!   ([`FanoutHub`])
//! - **Sessions** that register a client and drain its inbound frames
//!   ([`ClientSession`])
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                                                              │
//! │  GET /ws ──► prepare_upgrade() ──► 101 ──► complete_upgrade()│
//! │                                               │              │
//! │                                               ▼              │
//! │                         ClientSession::open() ──► hub.register(sender)
//! │                                               │              │
//! │                                               ▼              │
//! │                         run_until(shutdown): recv + discard  │
//! │                                                              │
//! │  producer ──► hub.broadcast(frame) ──► fanout() over registry│
//! │                                          └─► evict on failure│
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use framecast_ws::{FanoutHub, HubConfig};
//!
//! let hub = FanoutHub::new(HubConfig::default());
//! // sessions register senders as clients connect...
//! let report = hub.broadcast(frame).await;
//! println!("delivered to {} clients", report.delivered);
//! ```

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod message;
pub mod registry;
pub mod session;
pub mod upgrade;

// Re-exports for convenience
pub use broadcast::{fanout, BroadcastReport};
pub use config::{
    HubConfig, WebSocketConfig, DEFAULT_MAX_CLIENTS, DEFAULT_SEND_TIMEOUT, MAX_CLIENTS_LIMIT,
};
pub use connection::{ConnectionId, WebSocket, WebSocketSender};
pub use error::{WsError, WsResult};
pub use hub::{FanoutHub, HubStats};
pub use message::{CloseFrame, Message};
pub use registry::{ClientHandle, ClientRegistry, RegistryError};
pub use session::{ClientSession, SessionEnd, SessionHub, SessionOutcome, SessionState};
pub use upgrade::{
    bad_request, complete_upgrade, compute_accept_key, is_websocket_request, prepare_upgrade,
    validate_upgrade_request, WebSocketUpgrade,
};
