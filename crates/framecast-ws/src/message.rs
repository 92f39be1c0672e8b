//! WebSocket frames as seen by a session.
//!
//! Binary, ping and pong payloads are [`Bytes`], so a broadcast payload is
//! shared between all clients instead of copied per send.

use bytes::Bytes;
use std::borrow::Cow;
use tungstenite::protocol::frame::coding::CloseCode;

/// A WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A text message (UTF-8 encoded).
    Text(String),
    /// A binary message.
    Binary(Bytes),
    /// A ping frame.
    Ping(Bytes),
    /// A pong frame.
    Pong(Bytes),
    /// A close frame with optional code and reason.
    Close(Option<CloseFrame>),
}

impl Message {
    /// Create a close message with a code and reason.
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Self::Close(Some(CloseFrame::new(code, reason)))
    }

    /// Check if this is a close message.
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }
}

impl From<tungstenite::Message> for Message {
    fn from(msg: tungstenite::Message) -> Self {
        match msg {
            tungstenite::Message::Text(s) => Self::Text(s.to_string()),
            tungstenite::Message::Binary(b) => Self::Binary(b),
            tungstenite::Message::Ping(b) => Self::Ping(b),
            tungstenite::Message::Pong(b) => Self::Pong(b),
            tungstenite::Message::Close(frame) => Self::Close(frame.map(CloseFrame::from)),
            // Raw frames only surface when reading with `Frame` passthrough.
            tungstenite::Message::Frame(frame) => {
                Self::Binary(Bytes::copy_from_slice(frame.payload()))
            }
        }
    }
}

impl From<Message> for tungstenite::Message {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(s) => Self::Text(s.into()),
            Message::Binary(b) => Self::Binary(b),
            Message::Ping(b) => Self::Ping(b),
            Message::Pong(b) => Self::Pong(b),
            Message::Close(frame) => {
                Self::Close(frame.map(tungstenite::protocol::CloseFrame::from))
            }
        }
    }
}

/// Code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// Numeric close code.
    pub code: u16,
    /// Close reason.
    pub reason: Cow<'static, str>,
}

impl CloseFrame {
    /// Create a new close frame.
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            reason: Cow::Owned(reason.into()),
        }
    }
}

impl From<tungstenite::protocol::CloseFrame> for CloseFrame {
    fn from(frame: tungstenite::protocol::CloseFrame) -> Self {
        Self {
            code: frame.code.into(),
            reason: Cow::Owned(frame.reason.to_string()),
        }
    }
}

impl From<CloseFrame> for tungstenite::protocol::CloseFrame {
    fn from(frame: CloseFrame) -> Self {
        Self {
            code: frame.code.into(),
            reason: frame.reason.into_owned().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_payload_is_shared() {
        let payload = Bytes::from_static(&[1, 2, 3, 4]);
        let theirs = tungstenite::Message::from(Message::Binary(payload.clone()));
        match theirs {
            tungstenite::Message::Binary(data) => assert_eq!(data.as_ptr(), payload.as_ptr()),
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[test]
    fn test_text_from_tungstenite() {
        let ours = Message::from(tungstenite::Message::Text("hello".into()));
        assert_eq!(ours, Message::Text("hello".to_string()));
        assert!(!ours.is_close());
    }

    #[test]
    fn test_going_away_close_survives_conversion() {
        let theirs: tungstenite::Message = Message::close(CloseCode::Away, "server stopping").into();
        let back = Message::from(theirs);
        assert!(back.is_close());
        assert_eq!(
            back,
            Message::Close(Some(CloseFrame {
                code: 1001,
                reason: Cow::Borrowed("server stopping"),
            }))
        );
    }

    #[test]
    fn test_close_without_frame() {
        let back = Message::from(tungstenite::Message::Close(None));
        assert_eq!(back, Message::Close(None));
    }
}
