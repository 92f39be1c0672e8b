//! Per-connection session: registration and inbound-frame handling.
//!
//! A session starts in [`SessionState::Handshaking`] with an already
//! upgraded socket. [`ClientSession::open`] tries to register the socket's
//! sender with the hub and moves to [`SessionState::Open`] either way: a
//! refused client stays connected but never receives broadcasts.
//! While open, every inbound frame is read in full and discarded.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};
use tungstenite::protocol::frame::coding::CloseCode;

use crate::connection::{ConnectionId, WebSocket, WebSocketSender};
use crate::error::WsResult;
use crate::hub::FanoutHub;
use crate::message::Message;

/// Hub type served by sessions over the stream `S`.
pub type SessionHub<S> = FanoutHub<WebSocketSender<S>>;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Upgraded, not yet offered to the registry.
    Handshaking,
    /// Receiving frames.
    Open,
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent a close frame.
    PeerClosed,
    /// The stream ended without a close frame.
    StreamEnded,
    /// The server is shutting down.
    Shutdown,
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// The connection that ended.
    pub connection_id: ConnectionId,
    /// Whether the client ever held a registry slot.
    pub registered: bool,
    /// Data frames (text or binary) received and discarded.
    pub frames_received: u64,
    /// How the session ended.
    pub end: SessionEnd,
}

/// One upgraded client connection.
pub struct ClientSession<S> {
    ws: WebSocket<S>,
    hub: Arc<SessionHub<S>>,
    state: SessionState,
    registered: bool,
    frames_received: u64,
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a session for an upgraded socket.
    pub fn new(ws: WebSocket<S>, hub: Arc<SessionHub<S>>) -> Self {
        Self {
            ws,
            hub,
            state: SessionState::Handshaking,
            registered: false,
            frames_received: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connection ID of the socket.
    pub fn connection_id(&self) -> ConnectionId {
        self.ws.connection_id()
    }

    /// Whether the client holds a registry slot.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Offer the client to the hub and move to [`SessionState::Open`].
    ///
    /// Returns whether the client was registered. Calling this again once
    /// open has no effect.
    pub async fn open(&mut self) -> bool {
        if self.state == SessionState::Open {
            return self.registered;
        }

        self.registered = self.hub.register(self.ws.sender()).await.is_ok();
        if !self.registered {
            debug!(connection_id = %self.connection_id(), "Session open without a registry slot");
        }
        self.state = SessionState::Open;
        self.registered
    }

    /// Run until the peer goes away.
    pub async fn run(self) -> WsResult<SessionOutcome> {
        self.run_until(std::future::pending()).await
    }

    /// Run until the peer goes away or `shutdown` completes.
    ///
    /// On shutdown a `1001 Going Away` close frame is sent. A receive error
    /// ends the session with that error; the client is left in the registry
    /// for the next broadcast to evict.
    pub async fn run_until<F>(mut self, shutdown: F) -> WsResult<SessionOutcome>
    where
        F: Future<Output = ()>,
    {
        self.open().await;
        tokio::pin!(shutdown);

        let end = loop {
            tokio::select! {
                () = &mut shutdown => {
                    if let Err(e) = self.ws.close(CloseCode::Away, "server shutting down").await {
                        debug!(connection_id = %self.connection_id(), error = %e, "Close frame not delivered");
                    }
                    break SessionEnd::Shutdown;
                }
                next = self.ws.recv() => match next {
                    Some(Ok(msg)) => {
                        if let Some(end) = self.handle_frame(msg) {
                            break end;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(connection_id = %self.connection_id(), error = %e, "Receive failed");
                        return Err(e);
                    }
                    None => break SessionEnd::StreamEnded,
                },
            }
        };

        info!(
            connection_id = %self.connection_id(),
            registered = self.registered,
            frames = self.frames_received,
            end = ?end,
            "Session ended"
        );

        Ok(SessionOutcome {
            connection_id: self.connection_id(),
            registered: self.registered,
            frames_received: self.frames_received,
            end,
        })
    }

    fn handle_frame(&mut self, msg: Message) -> Option<SessionEnd> {
        let id = self.connection_id();
        match msg {
            Message::Text(text) => {
                self.frames_received += 1;
                info!(connection_id = %id, text = %text, "Text frame received");
                None
            }
            Message::Binary(data) => {
                self.frames_received += 1;
                debug!(connection_id = %id, len = data.len(), "Binary frame received");
                None
            }
            Message::Ping(_) | Message::Pong(_) => None,
            Message::Close(frame) => {
                debug!(connection_id = %id, code = frame.as_ref().map(|f| f.code), "Peer closed");
                Some(SessionEnd::PeerClosed)
            }
        }
    }
}
