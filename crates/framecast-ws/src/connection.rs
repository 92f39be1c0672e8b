//! WebSocket connection handling.
//!
//! A [`WebSocket`] owns the read half of an upgraded stream. Its
//! [`WebSocketSender`] is a cloneable handle to the write half and is what
//! the client registry stores. Both share one `closed` flag, so a failure
//! seen on either side invalidates the handle for the next broadcast.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, instrument};
use tungstenite::protocol::frame::coding::CloseCode;
use uuid::Uuid;

use crate::config::WebSocketConfig;
use crate::error::{WsError, WsResult};
use crate::message::Message;
use crate::registry::ClientHandle;

/// A unique identifier for a WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new time-ordered connection ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a connection ID from a UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

type SharedSink<S> = Arc<Mutex<SplitSink<WebSocketStream<S>, tungstenite::Message>>>;

/// The server side of an upgraded WebSocket.
pub struct WebSocket<S> {
    sender: WebSocketSender<S>,
    receiver: SplitStream<WebSocketStream<S>>,
}

impl<S> WebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Split an upgraded stream into a session reader and a shared sender.
    pub fn new(stream: WebSocketStream<S>, config: WebSocketConfig) -> Self {
        let (sink, receiver) = stream.split();
        Self {
            sender: WebSocketSender {
                connection_id: ConnectionId::new(),
                sink: Arc::new(Mutex::new(sink)),
                closed: Arc::new(AtomicBool::new(false)),
                send_timeout: config.send_timeout,
            },
            receiver,
        }
    }

    /// Get the connection ID.
    pub fn connection_id(&self) -> ConnectionId {
        self.sender.connection_id
    }

    /// Check if the connection has been closed by either half.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Get a handle that can be used to send frames from other tasks.
    pub fn sender(&self) -> WebSocketSender<S> {
        self.sender.clone()
    }

    /// Receive the next message from the WebSocket.
    ///
    /// Returns `None` once the stream has ended. tungstenite queues the pong
    /// for each ping and flushes it on the next read or write.
    #[instrument(skip(self), fields(connection_id = %self.sender.connection_id))]
    pub async fn recv(&mut self) -> Option<WsResult<Message>> {
        match self.receiver.next().await {
            Some(Ok(msg)) => {
                let msg = Message::from(msg);
                if msg.is_close() {
                    debug!("Received close frame");
                    self.sender.mark_closed();
                }

                Some(Ok(msg))
            }
            Some(Err(e)) => {
                self.sender.mark_closed();
                Some(Err(WsError::receive_failed(e.to_string())))
            }
            None => {
                self.sender.mark_closed();
                None
            }
        }
    }

    /// Close the WebSocket connection.
    pub async fn close(&mut self, code: CloseCode, reason: impl Into<String>) -> WsResult<()> {
        if self.sender.is_closed() {
            return Ok(());
        }

        let reason = reason.into();
        debug!(connection_id = %self.sender.connection_id, code = u16::from(code), reason = %reason, "Closing connection");

        let result = self.sender.send(Message::close(code, reason)).await;
        self.sender.mark_closed();
        result
    }
}

/// A handle for sending frames to a WebSocket from other tasks.
///
/// Every send is bounded by the connection's send timeout. A failed or
/// timed-out send marks the handle closed.
pub struct WebSocketSender<S> {
    connection_id: ConnectionId,
    sink: SharedSink<S>,
    closed: Arc<AtomicBool>,
    send_timeout: Duration,
}

impl<S> Clone for WebSocketSender<S> {
    fn clone(&self) -> Self {
        Self {
            connection_id: self.connection_id,
            sink: Arc::clone(&self.sink),
            closed: Arc::clone(&self.closed),
            send_timeout: self.send_timeout,
        }
    }
}

impl<S> std::fmt::Debug for WebSocketSender<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketSender")
            .field("connection_id", &self.connection_id)
            .field("closed", &self.is_closed())
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

impl<S> WebSocketSender<S> {
    /// Get the connection ID.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Check if the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the connection closed without touching the transport.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl<S> WebSocketSender<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send a message.
    pub async fn send(&self, msg: Message) -> WsResult<()> {
        if self.is_closed() {
            return Err(WsError::Closed);
        }

        let msg = tungstenite::Message::from(msg);
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(msg).await
        };

        match tokio::time::timeout(self.send_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.mark_closed();
                Err(WsError::send_failed(e.to_string()))
            }
            Err(_) => {
                self.mark_closed();
                Err(WsError::send_failed(format!(
                    "send timed out after {:?}",
                    self.send_timeout
                )))
            }
        }
    }
}

impl<S> ClientHandle for WebSocketSender<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    fn is_valid(&self) -> bool {
        !self.is_closed()
    }

    fn send_binary(&self, payload: Bytes) -> impl Future<Output = WsResult<()>> + Send {
        self.send(Message::Binary(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn pair(config: WebSocketConfig) -> (WebSocket<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (server_io, client_io) = duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (WebSocket::new(server, config), client)
    }

    #[test]
    fn test_connection_id_new() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_connection_id_display() {
        let uuid = Uuid::now_v7();
        let id = ConnectionId::from_uuid(uuid);
        assert_eq!(id.to_string(), uuid.to_string());
        assert_eq!(id.as_uuid(), uuid);
    }

    #[tokio::test]
    async fn test_sender_delivers_binary() {
        let (ws, mut client) = pair(WebSocketConfig::default()).await;
        let sender = ws.sender();
        assert!(sender.is_valid());

        sender.send_binary(Bytes::from_static(b"frame-1")).await.unwrap();

        let received = client.next().await.unwrap().unwrap();
        assert_eq!(received, tungstenite::Message::Binary(Bytes::from_static(b"frame-1")));
    }

    #[tokio::test]
    async fn test_receive_side_invalidates_sender() {
        let (mut ws, client) = pair(WebSocketConfig::default()).await;
        let sender = ws.sender();
        drop(client);

        while let Some(result) = ws.recv().await {
            if result.is_err() {
                break;
            }
        }

        assert!(ws.is_closed());
        assert!(!sender.is_valid());
        let err = sender.send_binary(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, WsError::Closed));
    }

    #[tokio::test]
    async fn test_close_frame_marks_closed() {
        let (mut ws, mut client) = pair(WebSocketConfig::default()).await;
        client.send(tungstenite::Message::Close(None)).await.unwrap();

        let msg = ws.recv().await.unwrap().unwrap();
        assert!(msg.is_close());
        assert!(ws.is_closed());
    }

    #[tokio::test]
    async fn test_text_frame_is_received() {
        let (mut ws, mut client) = pair(WebSocketConfig::default()).await;
        client.send(tungstenite::Message::Text("hi".into())).await.unwrap();

        let msg = ws.recv().await.unwrap().unwrap();
        assert_eq!(msg, Message::Text("hi".to_string()));
        assert!(!ws.is_closed());
    }

    #[tokio::test]
    async fn test_ping_is_answered_once() {
        let (mut ws, mut client) = pair(WebSocketConfig::default()).await;
        client
            .send(tungstenite::Message::Ping(Bytes::from_static(b"hb")))
            .await
            .unwrap();
        client.send(tungstenite::Message::Text("after".into())).await.unwrap();

        assert_eq!(
            ws.recv().await.unwrap().unwrap(),
            Message::Ping(Bytes::from_static(b"hb"))
        );
        assert_eq!(ws.recv().await.unwrap().unwrap(), Message::Text("after".to_string()));
        ws.sender().send_binary(Bytes::from_static(b"end")).await.unwrap();

        let mut pongs = Vec::new();
        let mut saw_binary = false;
        while !(saw_binary && !pongs.is_empty()) {
            match client.next().await.unwrap().unwrap() {
                tungstenite::Message::Pong(data) => pongs.push(data),
                tungstenite::Message::Binary(data) => {
                    assert_eq!(data, Bytes::from_static(b"end"));
                    saw_binary = true;
                }
                other => panic!("unexpected frame {other:?}"),
            }
        }
        // Nothing else may follow.
        let extra = tokio::time::timeout(Duration::from_millis(100), client.next()).await;
        assert!(extra.is_err(), "unexpected extra frame: {extra:?}");
        assert_eq!(pongs, vec![Bytes::from_static(b"hb")]);
    }

    #[tokio::test]
    async fn test_send_timeout_marks_closed() {
        let (server_io, _client_io) = duplex(16);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let config = WebSocketConfig::new().send_timeout(Duration::from_millis(50));
        let ws = WebSocket::new(server, config);
        let sender = ws.sender();

        // The peer never reads, so a frame larger than the pipe cannot flush.
        let err = sender
            .send_binary(Bytes::from(vec![0u8; 4096]))
            .await
            .unwrap_err();

        assert!(matches!(err, WsError::SendFailed(_)));
        assert!(!sender.is_valid());
    }
}
