//! End-to-end tests over TLS using the fixture certificate chain.
//!
//! `fixtures/cert.pem` is issued for `localhost` and `127.0.0.1` by
//! `fixtures/ca.pem`, which the test client trusts as its only root.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use framecast_server::{FanoutServer, ServerConfig, TlsConfig};
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async, WebSocketStream};

const CA_PEM: &[u8] = include_bytes!("fixtures/ca.pem");
const CERT_PEM: &[u8] = include_bytes!("fixtures/cert.pem");
const KEY_PEM: &[u8] = include_bytes!("fixtures/key.pem");

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

async fn start_tls_server(tls: TlsConfig) -> (FanoutServer, SocketAddr) {
    let config = ServerConfig::builder()
        .bind_addr("127.0.0.1:0")
        .shutdown_timeout(Duration::from_secs(2))
        .send_timeout(Duration::from_secs(1))
        .tls(tls)
        .build();
    let server = FanoutServer::new(config);
    server.start().await.expect("server should start with valid TLS material");
    let addr = server.local_addr().await.expect("bound address");
    (server, addr)
}

fn connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut &CA_PEM[..]) {
        roots.add(cert.expect("CA PEM parses")).expect("CA accepted as root");
    }
    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .expect("default protocol versions")
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

async fn tls_connect(addr: SocketAddr) -> TlsStream<TcpStream> {
    let tcp = TcpStream::connect(addr).await.unwrap();
    let name = ServerName::try_from("localhost").unwrap();
    tokio::time::timeout(Duration::from_secs(5), connector().connect(name, tcp))
        .await
        .expect("handshake in time")
        .expect("TLS handshake")
}

async fn wss_connect(addr: SocketAddr) -> WebSocketStream<TlsStream<TcpStream>> {
    let stream = tls_connect(addr).await;
    let (ws, response) = client_async("wss://localhost/ws", stream)
        .await
        .expect("websocket handshake over TLS");
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

#[tokio::test]
async fn wss_clients_receive_broadcasts() {
    let (server, addr) = start_tls_server(TlsConfig::from_pem(CERT_PEM.to_vec(), KEY_PEM.to_vec())).await;

    let mut a = wss_connect(addr).await;
    let mut b = wss_connect(addr).await;
    wait_for_clients(&server, 2).await;

    let report = server.broadcast_frame(Bytes::from_static(b"secure-frame")).await;
    assert_eq!(report.delivered, 2);
    assert!(report.evicted.is_empty());

    for client in [&mut a, &mut b] {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .expect("valid frame");
        assert_eq!(msg, Message::Binary(Bytes::from_static(b"secure-frame")));
    }

    server.stop().await;
}

#[tokio::test]
async fn index_page_over_tls_from_pem_files() {
    let fixtures = fixtures_dir();
    let (server, addr) =
        start_tls_server(TlsConfig::from_files(fixtures.join("cert.pem"), fixtures.join("key.pem"))).await;

    let mut stream = tls_connect(addr).await;
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = Vec::new();
    // A peer that skips close_notify ends the read with an error; the bytes
    // read so far are kept either way.
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response in time");
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.contains("<!DOCTYPE html>"));

    server.stop().await;
}

#[tokio::test]
async fn plaintext_client_cannot_reach_tls_listener() {
    let (server, addr) = start_tls_server(TlsConfig::from_pem(CERT_PEM.to_vec(), KEY_PEM.to_vec())).await;

    let mut tcp = TcpStream::connect(addr).await.unwrap();
    tcp.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), tcp.read_to_end(&mut response))
        .await
        .expect("listener answers or closes in time");
    assert!(!String::from_utf8_lossy(&response).contains("HTTP/1.1 200"));

    // The listener keeps serving TLS clients afterwards.
    let _client = wss_connect(addr).await;
    wait_for_clients(&server, 1).await;

    server.stop().await;
}
