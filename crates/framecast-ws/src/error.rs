//! WebSocket errors.
//!
//! Per-client failures ([`WsError::SendFailed`], [`WsError::ReceiveFailed`])
//! are contained by the fanout engine and the session loop; they never reach
//! the broadcast caller.

use thiserror::Error;

/// Result alias for this crate.
pub type WsResult<T> = Result<T, WsError>;

/// Failures on one WebSocket connection.
#[derive(Debug, Error)]
pub enum WsError {
    /// The request cannot be upgraded.
    #[error("not a WebSocket upgrade request: {0}")]
    NotWebSocketRequest(String),

    /// The handle was already closed by an earlier failure or close frame.
    #[error("connection already closed")]
    Closed,

    /// Writing a frame failed or timed out.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Reading from the peer failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

impl WsError {
    pub(crate) fn not_websocket(reason: impl Into<String>) -> Self {
        Self::NotWebSocketRequest(reason.into())
    }

    pub(crate) fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed(reason.into())
    }

    pub(crate) fn receive_failed(reason: impl Into<String>) -> Self {
        Self::ReceiveFailed(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_reason() {
        assert_eq!(
            WsError::not_websocket("missing Upgrade header").to_string(),
            "not a WebSocket upgrade request: missing Upgrade header"
        );
        assert_eq!(WsError::send_failed("broken pipe").to_string(), "send failed: broken pipe");
        assert_eq!(WsError::receive_failed("reset").to_string(), "receive failed: reset");
        assert_eq!(WsError::Closed.to_string(), "connection already closed");
    }
}
