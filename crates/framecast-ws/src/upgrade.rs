//! WebSocket HTTP upgrade handling.
//!
//! Validates RFC 6455 upgrade requests, builds the `101 Switching Protocols`
//! (or `400 Bad Request`) response, and wraps the upgraded IO in a
//! server-role [`WebSocket`]. Subprotocols are not negotiated.

use base64::Engine;
use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, instrument};

use crate::config::WebSocketConfig;
use crate::connection::WebSocket;
use crate::error::{WsError, WsResult};

/// The WebSocket magic GUID used in the handshake.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Check if a request is a WebSocket upgrade request.
///
/// A valid WebSocket upgrade request must have:
/// - `Connection: Upgrade` header
/// - `Upgrade: websocket` header
/// - `Sec-WebSocket-Key` header
/// - `Sec-WebSocket-Version: 13` header
pub fn is_websocket_request<B>(request: &Request<B>) -> bool {
    validate_upgrade_request(request).is_ok()
}

fn header_str<'a, B>(request: &'a Request<B>, name: impl header::AsHeaderName) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Validate a WebSocket upgrade request.
///
/// Returns the `Sec-WebSocket-Accept` value if valid.
#[instrument(skip(request))]
pub fn validate_upgrade_request<B>(request: &Request<B>) -> WsResult<String> {
    let connection_upgrade = header_str(request, header::CONNECTION)
        .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")));
    if !connection_upgrade {
        return Err(WsError::not_websocket("missing Connection: Upgrade header"));
    }

    let upgrade_websocket = header_str(request, header::UPGRADE)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
    if !upgrade_websocket {
        return Err(WsError::not_websocket("missing Upgrade: websocket header"));
    }

    let key = header_str(request, header::SEC_WEBSOCKET_KEY)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| WsError::not_websocket("missing Sec-WebSocket-Key header"))?;

    if header_str(request, header::SEC_WEBSOCKET_VERSION).map(str::trim) != Some("13") {
        return Err(WsError::not_websocket(
            "missing or invalid Sec-WebSocket-Version header (must be 13)",
        ));
    }

    Ok(compute_accept_key(key))
}

/// Compute the Sec-WebSocket-Accept value from the key.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

fn switching_protocols(accept_key: &str) -> WsResult<Response<Full<Bytes>>> {
    let accept = HeaderValue::from_str(accept_key)
        .map_err(|e| WsError::not_websocket(format!("unencodable accept key: {e}")))?;

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    Ok(response)
}

/// Create a plain-text `400 Bad Request` response.
pub fn bad_request(reason: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(reason.to_owned())));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// A prepared upgrade: the response to send and whether it accepts.
pub struct WebSocketUpgrade {
    /// The response to send to the client.
    pub response: Response<Full<Bytes>>,
    /// Whether the upgrade was accepted.
    pub success: bool,
}

/// Prepare a WebSocket upgrade.
///
/// On success the caller sends the 101 response and then completes the
/// upgrade with [`complete_upgrade`] once the IO is handed over.
#[instrument(skip(request))]
pub fn prepare_upgrade<B>(request: &Request<B>) -> WebSocketUpgrade {
    let accepted = validate_upgrade_request(request).and_then(|key| switching_protocols(&key));
    match accepted {
        Ok(response) => WebSocketUpgrade {
            response,
            success: true,
        },
        Err(e) => {
            debug!("WebSocket upgrade validation failed: {}", e);
            WebSocketUpgrade {
                response: bad_request(&e.to_string()),
                success: false,
            }
        }
    }
}

/// Complete a WebSocket upgrade over the handed-over IO stream.
pub async fn complete_upgrade<S>(stream: S, config: WebSocketConfig) -> WebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ws_stream =
        WebSocketStream::from_raw_socket(stream, tungstenite::protocol::Role::Server, None).await;

    WebSocket::new(ws_stream, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ws_request() -> Request<()> {
        Request::builder()
            .uri("/ws")
            .header(header::CONNECTION, "keep-alive, Upgrade")
            .header(header::UPGRADE, "websocket")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .header("Sec-WebSocket-Version", "13")
            .body(())
            .unwrap()
    }

    #[test]
    fn test_is_websocket_request_valid() {
        assert!(is_websocket_request(&make_ws_request()));
    }

    #[test]
    fn test_compute_accept_key() {
        // RFC 6455 section 1.3 example
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_missing_connection_header() {
        let request = Request::builder()
            .header(header::UPGRADE, "websocket")
            .header("Sec-WebSocket-Key", "key")
            .header("Sec-WebSocket-Version", "13")
            .body(())
            .unwrap();
        let err = validate_upgrade_request(&request).unwrap_err();
        assert!(err.to_string().contains("Connection"));
        assert!(!is_websocket_request(&request));
    }

    #[test]
    fn test_missing_key() {
        let request = Request::builder()
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header("Sec-WebSocket-Version", "13")
            .body(())
            .unwrap();
        let err = validate_upgrade_request(&request).unwrap_err();
        assert!(err.to_string().contains("Sec-WebSocket-Key"));
    }

    #[test]
    fn test_wrong_version() {
        let request = Request::builder()
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header("Sec-WebSocket-Key", "key")
            .header("Sec-WebSocket-Version", "8")
            .body(())
            .unwrap();
        let err = validate_upgrade_request(&request).unwrap_err();
        assert!(err.to_string().contains("Version"));
    }

    #[test]
    fn test_prepare_upgrade_success() {
        let upgrade = prepare_upgrade(&make_ws_request());
        assert!(upgrade.success);
        assert_eq!(upgrade.response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(
            upgrade.response.headers().get(header::SEC_WEBSOCKET_ACCEPT).unwrap(),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
        assert_eq!(upgrade.response.headers().get(header::UPGRADE).unwrap(), "websocket");
    }

    #[test]
    fn test_prepare_upgrade_failure() {
        let request = Request::builder().uri("/ws").body(()).unwrap();
        let upgrade = prepare_upgrade(&request);
        assert!(!upgrade.success);
        assert_eq!(upgrade.response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_complete_upgrade_wraps_stream() {
        let (server_io, _client_io) = tokio::io::duplex(1024);
        let ws = complete_upgrade(server_io, WebSocketConfig::default()).await;
        assert!(!ws.is_closed());
    }
}
