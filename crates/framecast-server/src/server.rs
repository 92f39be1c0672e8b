//! The fanout server: listener, routing and lifecycle.
//!
//! # Architecture
//!
//! - TCP listener bound to the configured address
//! - Optional TLS handshake per connection
//! - HTTP/1.1 via hyper with upgrades enabled
//! - `GET /` serves the static page, `GET /ws` upgrades to a WebSocket
//!   session registered with the shared [`FanoutHub`]
//! - One shutdown signal reaching the accept loop, connections and sessions
//!
//! # Example
//!
//! ```rust,ignore
//! use framecast_server::{FanoutServer, ServerConfig};
//!
//! let server = FanoutServer::new(ServerConfig::builder().bind_addr("127.0.0.1:8443").build());
//! server.start().await?;
//! server.broadcast_frame(frame).await;
//! server.stop().await;
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use framecast_ws::{
    complete_upgrade, prepare_upgrade, BroadcastReport, ClientSession, FanoutHub, WebSocketConfig,
    WebSocketSender,
};

use crate::config::ServerConfig;
use crate::error::StartError;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::static_page::{method_not_allowed, not_found, HttpResponse, StaticPage};
use crate::tls::load_tls_acceptor;

/// Stream type of an upgraded WebSocket connection.
pub type UpgradedIo = TokioIo<Upgraded>;

/// Hub type used by the server.
pub type ServerHub = FanoutHub<WebSocketSender<UpgradedIo>>;

/// The TLS WebSocket fanout endpoint.
///
/// Cheap to clone; all clones control the same server.
#[derive(Clone)]
pub struct FanoutServer {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServerConfig,
    hub: Arc<ServerHub>,
    page: StaticPage,
    running: AtomicBool,
    state: Mutex<Option<Running>>,
}

struct Running {
    shutdown: ShutdownSignal,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// Everything a connection task needs.
struct ConnContext {
    hub: Arc<ServerHub>,
    page: StaticPage,
    ws_config: WebSocketConfig,
    shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
    /// Upgraded WebSocket sessions; they outlive the HTTP connection task.
    sessions: SyncMutex<JoinSet<()>>,
}

impl ConnContext {
    fn new(
        hub: Arc<ServerHub>,
        page: StaticPage,
        ws_config: WebSocketConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            hub,
            page,
            ws_config,
            shutdown,
            tracker: ConnectionTracker::new(),
            sessions: SyncMutex::new(JoinSet::new()),
        }
    }

    /// Spawns a session task counted by the tracker and aborted on stop.
    fn spawn_session<F>(&self, session: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.tracker.acquire();
        let mut sessions = self.sessions.lock();
        while sessions.try_join_next().is_some() {}
        sessions.spawn(async move {
            session.await;
            drop(token);
        });
    }

    /// Aborts the sessions still running and waits for them to unwind.
    async fn abort_sessions(&self) {
        let mut sessions = std::mem::take(&mut *self.sessions.lock());
        sessions.shutdown().await;
    }
}

impl FanoutServer {
    /// Creates a stopped server serving the built-in page.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self::with_page(config, StaticPage::default())
    }

    /// Creates a stopped server serving `page` at `/`.
    #[must_use]
    pub fn with_page(config: ServerConfig, page: StaticPage) -> Self {
        let hub = FanoutHub::new(config.hub_config());
        Self {
            inner: Arc::new(Inner {
                config,
                hub,
                page,
                running: AtomicBool::new(false),
                state: Mutex::new(None),
            }),
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Returns the shared hub.
    #[must_use]
    pub fn hub(&self) -> Arc<ServerHub> {
        Arc::clone(&self.inner.hub)
    }

    /// Whether the listener is accepting connections.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Address the listener is bound to, while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.state.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Number of registered WebSocket clients.
    pub async fn client_count(&self) -> usize {
        self.inner.hub.len().await
    }

    /// Sends one binary frame to every registered client.
    ///
    /// Clients that fail are evicted. Never fails as a whole; with the server
    /// stopped the registry is empty and nothing is sent.
    pub async fn broadcast_frame(&self, frame: impl Into<Bytes>) -> BroadcastReport {
        self.inner.hub.broadcast(frame.into()).await
    }

    /// Binds the listener and starts accepting connections.
    ///
    /// The client registry is emptied first.
    pub async fn start(&self) -> Result<(), StartError> {
        let mut state = self.inner.state.lock().await;
        if state.is_some() {
            return Err(StartError::AlreadyRunning);
        }

        let config = &self.inner.config;
        let addr = config
            .socket_addr()
            .map_err(|source| StartError::InvalidAddress {
                addr: config.bind_addr().to_string(),
                source,
            })?;
        let tls = config.tls().map(load_tls_acceptor).transpose()?;

        self.inner.hub.clear().await;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StartError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| StartError::Bind { addr, source })?;

        let shutdown = ShutdownSignal::new();
        let ctx = Arc::new(ConnContext::new(
            Arc::clone(&self.inner.hub),
            self.inner.page.clone(),
            config.websocket_config(),
            shutdown.clone(),
        ));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            tls,
            ctx,
            config.shutdown_timeout(),
        ));

        info!(
            addr = %local_addr,
            tls = config.tls().is_some(),
            max_clients = config.max_clients(),
            "Server listening"
        );

        *state = Some(Running {
            shutdown,
            accept_task,
            local_addr,
        });
        self.inner.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Stops the server and empties the client registry.
    ///
    /// Waits up to the shutdown timeout for connections to finish and aborts
    /// the rest. Calling this on a stopped server does nothing.
    pub async fn stop(&self) {
        let Some(running) = self.inner.state.lock().await.take() else {
            return;
        };
        self.inner.running.store(false, Ordering::Release);

        running.shutdown.trigger();
        if let Err(e) = running.accept_task.await {
            error!(error = %e, "Accept loop panicked");
        }

        let dropped = self.inner.hub.clear().await;
        info!(addr = %running.local_addr, dropped_clients = dropped, "Server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    ctx: Arc<ConnContext>,
    shutdown_timeout: Duration,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, remote_addr)) => {
                    let ctx = Arc::clone(&ctx);
                    let tls = tls.clone();
                    let token = ctx.tracker.acquire();
                    connections.spawn(async move {
                        handle_connection(stream, remote_addr, tls, ctx).await;
                        drop(token);
                    });
                }
                Err(e) => error!(error = %e, "Failed to accept connection"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            () = ctx.shutdown.recv() => break,
        }
    }
    drop(listener);

    debug!(
        active = ctx.tracker.active_connections(),
        timeout = ?shutdown_timeout,
        "Waiting for connections to close"
    );
    let drained = tokio::time::timeout(shutdown_timeout, ctx.tracker.wait_for_shutdown()).await;
    if drained.is_err() {
        warn!(
            active = ctx.tracker.active_connections(),
            "Shutdown timeout reached, aborting remaining connections"
        );
    }
    connections.shutdown().await;
    ctx.abort_sessions().await;
}

async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    tls: Option<TlsAcceptor>,
    ctx: Arc<ConnContext>,
) {
    let Some(acceptor) = tls else {
        serve_io(stream, remote_addr, ctx).await;
        return;
    };

    tokio::select! {
        result = acceptor.accept(stream) => match result {
            Ok(tls_stream) => serve_io(tls_stream, remote_addr, ctx).await,
            Err(e) => debug!(remote_addr = %remote_addr, error = %e, "TLS handshake failed"),
        },
        () = ctx.shutdown.recv() => {}
    }
}

async fn serve_io<I>(io: I, remote_addr: SocketAddr, ctx: Arc<ConnContext>)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service_ctx = Arc::clone(&ctx);
    let service = service_fn(move |req: Request<Incoming>| {
        let ctx = Arc::clone(&service_ctx);
        async move { Ok::<_, Infallible>(route(req, remote_addr, &ctx)) }
    });

    let conn = http1::Builder::new()
        .serve_connection(TokioIo::new(io), service)
        .with_upgrades();
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                debug!(remote_addr = %remote_addr, error = %e, "Connection error");
            }
        }
        () = ctx.shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                debug!(remote_addr = %remote_addr, error = %e, "Connection error during shutdown");
            }
        }
    }
}

fn route(req: Request<Incoming>, remote_addr: SocketAddr, ctx: &Arc<ConnContext>) -> HttpResponse {
    debug!(method = %req.method(), path = req.uri().path(), remote_addr = %remote_addr, "Request");

    match req.uri().path() {
        "/" => ctx.page.respond(req.method()),
        "/ws" if req.method() == Method::GET => upgrade_websocket(req, remote_addr, ctx),
        "/ws" => method_not_allowed(&[Method::GET]),
        _ => not_found(),
    }
}

fn upgrade_websocket(
    mut req: Request<Incoming>,
    remote_addr: SocketAddr,
    ctx: &Arc<ConnContext>,
) -> HttpResponse {
    let upgrade = prepare_upgrade(&req);
    if !upgrade.success {
        return upgrade.response;
    }

    let on_upgrade = hyper::upgrade::on(&mut req);
    let session_ctx = Arc::clone(ctx);

    ctx.spawn_session(async move {
        let ctx = session_ctx;
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                warn!(remote_addr = %remote_addr, error = %e, "WebSocket upgrade failed");
                return;
            }
        };

        let ws = complete_upgrade(TokioIo::new(upgraded), ctx.ws_config.clone()).await;
        info!(connection_id = %ws.connection_id(), remote_addr = %remote_addr, "WebSocket opened");

        let session = ClientSession::new(ws, Arc::clone(&ctx.hub));
        if let Err(e) = session.run_until(ctx.shutdown.recv()).await {
            debug!(remote_addr = %remote_addr, error = %e, "Session ended with error");
        }
    });

    upgrade.response
}
