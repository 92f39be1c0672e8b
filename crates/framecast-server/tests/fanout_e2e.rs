//! End-to-end tests over loopback with real WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use framecast_server::{FanoutServer, ServerConfig};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_config() -> ServerConfig {
    ServerConfig::builder()
        .bind_addr("127.0.0.1:0")
        .shutdown_timeout(Duration::from_secs(2))
        .send_timeout(Duration::from_secs(1))
        .build()
}

async fn start_server() -> (FanoutServer, SocketAddr) {
    let server = FanoutServer::new(test_config());
    server.start().await.expect("server should start");
    let addr = server.local_addr().await.expect("bound address");
    (server, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, response) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("websocket handshake");
    assert_eq!(response.status(), 101);
    ws
}

async fn wait_for_clients(server: &FanoutServer, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.client_count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {expected} registered clients"));
}

async fn next_binary(client: &mut Client) -> Bytes {
    let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("frame in time")
        .expect("stream open")
        .expect("valid frame");
    match msg {
        Message::Binary(data) => data,
        other => panic!("expected binary frame, got {other:?}"),
    }
}

async fn http_get(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response in time")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn broadcast_reaches_every_client() {
    let (server, addr) = start_server().await;
    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(connect(addr).await);
    }
    wait_for_clients(&server, 3).await;

    let report = server.broadcast_frame(Bytes::from_static(b"frame-1")).await;
    assert_eq!(report.delivered, 3);
    assert!(report.evicted.is_empty());

    for client in &mut clients {
        assert_eq!(next_binary(client).await, Bytes::from_static(b"frame-1"));
    }

    server.stop().await;
}

#[tokio::test]
async fn eleventh_client_is_accepted_but_not_registered() {
    let (server, addr) = start_server().await;
    let mut clients = Vec::new();
    for _ in 0..10 {
        clients.push(connect(addr).await);
    }
    wait_for_clients(&server, 10).await;

    let mut orphan = connect(addr).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.hub().stats().await.total_rejected == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registration refused");
    assert_eq!(server.client_count().await, 10);

    let report = server.broadcast_frame(vec![7u8; 32]).await;
    assert_eq!(report.delivered, 10);
    for client in &mut clients {
        assert_eq!(next_binary(client).await.len(), 32);
    }

    // The orphan's socket is open, it just never receives broadcasts.
    let nothing = tokio::time::timeout(Duration::from_millis(200), orphan.next()).await;
    assert!(nothing.is_err());

    server.stop().await;
}

#[tokio::test]
async fn closed_client_is_evicted_and_others_keep_receiving() {
    let (server, addr) = start_server().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let mut c = connect(addr).await;
    wait_for_clients(&server, 3).await;

    b.close(None).await.unwrap();

    // The session marks the handle closed once it sees the close frame; the
    // next broadcast after that evicts it.
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.client_count().await != 2 {
            server.broadcast_frame(Bytes::from_static(b"tick")).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("closed client evicted");

    let report = server.broadcast_frame(Bytes::from_static(b"after")).await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 2);

    for client in [&mut a, &mut c] {
        loop {
            if next_binary(client).await == Bytes::from_static(b"after") {
                break;
            }
        }
    }

    server.stop().await;
}

#[tokio::test]
async fn inbound_frames_are_ignored() {
    let (server, addr) = start_server().await;
    let mut client = connect(addr).await;
    wait_for_clients(&server, 1).await;

    client.send(Message::Text("hello device".into())).await.unwrap();
    client
        .send(Message::Binary(Bytes::from_static(&[1, 2, 3])))
        .await
        .unwrap();

    server.broadcast_frame(Bytes::from_static(b"frame")).await;
    assert_eq!(next_binary(&mut client).await, Bytes::from_static(b"frame"));
    assert_eq!(server.client_count().await, 1);

    server.stop().await;
}

#[tokio::test]
async fn index_page_and_routing() {
    let (server, addr) = start_server().await;

    let page = http_get(addr, "GET / HTTP/1.1\r\nHost: device\r\nConnection: close\r\n\r\n").await;
    assert!(page.starts_with("HTTP/1.1 200 OK"), "{page}");
    assert!(page.to_ascii_lowercase().contains("content-type: text/html"));
    assert!(page.contains("<!DOCTYPE html>"));

    let post = http_get(
        addr,
        "POST / HTTP/1.1\r\nHost: device\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(post.starts_with("HTTP/1.1 405"), "{post}");

    let missing = http_get(addr, "GET /nope HTTP/1.1\r\nHost: device\r\nConnection: close\r\n\r\n").await;
    assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");

    let bad_upgrade =
        http_get(addr, "GET /ws HTTP/1.1\r\nHost: device\r\nConnection: close\r\n\r\n").await;
    assert!(bad_upgrade.starts_with("HTTP/1.1 400"), "{bad_upgrade}");

    server.stop().await;
}

#[tokio::test]
async fn stop_closes_sessions_and_restart_has_full_capacity() {
    let (server, addr) = start_server().await;
    let mut clients = Vec::new();
    for _ in 0..10 {
        clients.push(connect(addr).await);
    }
    wait_for_clients(&server, 10).await;

    server.stop().await;
    assert!(!server.is_running());
    assert_eq!(server.client_count().await, 0);

    let msg = tokio::time::timeout(Duration::from_secs(5), clients[0].next())
        .await
        .expect("close in time");
    match msg {
        Some(Ok(Message::Close(Some(frame)))) => assert_eq!(u16::from(frame.code), 1001),
        Some(Ok(Message::Close(None))) | None | Some(Err(_)) => {}
        Some(Ok(other)) => panic!("expected close, got {other:?}"),
    }

    // Second stop is a no-op.
    server.stop().await;

    server.start().await.expect("restart");
    let addr = server.local_addr().await.unwrap();
    let mut fresh = Vec::new();
    for _ in 0..10 {
        fresh.push(connect(addr).await);
    }
    wait_for_clients(&server, 10).await;

    let report = server.broadcast_frame(Bytes::from_static(b"again")).await;
    assert_eq!(report.delivered, 10);

    server.stop().await;
}

#[tokio::test]
async fn start_twice_fails() {
    let (server, _addr) = start_server().await;
    assert!(matches!(
        server.start().await,
        Err(framecast_server::StartError::AlreadyRunning)
    ));
    server.stop().await;
}
