//! Binary fanout over the client registry.
//!
//! [`fanout`] walks the registry once, sending the same payload to every
//! client. A client whose send fails (or whose handle is already invalid) is
//! removed on the spot. Removal shifts the next client into the current
//! slot, so the slot index only advances after a successful send.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::connection::ConnectionId;
use crate::registry::{ClientHandle, ClientRegistry};

/// Outcome of one fanout pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients visited.
    pub attempted: usize,
    /// Clients that accepted the frame.
    pub delivered: usize,
    /// Clients removed during this pass, in the order they were removed.
    pub evicted: Vec<ConnectionId>,
    /// Size of the payload in bytes.
    pub payload_len: usize,
}

impl BroadcastReport {
    /// Whether every visited client received the frame.
    pub fn is_clean(&self) -> bool {
        self.evicted.is_empty()
    }
}

/// Send `payload` to every registered client, evicting the ones that fail.
pub async fn fanout<H: ClientHandle>(
    registry: &mut ClientRegistry<H>,
    payload: &Bytes,
) -> BroadcastReport {
    let mut report = BroadcastReport {
        payload_len: payload.len(),
        ..BroadcastReport::default()
    };

    let mut index = 0;
    while let Some(client) = registry.get(index) {
        report.attempted += 1;
        let id = client.connection_id();

        let delivered = if client.is_valid() {
            match client.send_binary(payload.clone()).await {
                Ok(()) => true,
                Err(e) => {
                    debug!(connection_id = %id, error = %e, "Send failed, evicting client");
                    false
                }
            }
        } else {
            debug!(connection_id = %id, "Handle invalid, evicting client");
            false
        };

        if delivered {
            report.delivered += 1;
            index += 1;
        } else {
            registry.remove_at(index);
            report.evicted.push(id);
        }
    }

    trace!(
        attempted = report.attempted,
        delivered = report.delivered,
        evicted = report.evicted.len(),
        payload_len = report.payload_len,
        "Fanout pass complete"
    );
    report
}
