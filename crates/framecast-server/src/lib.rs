//! # framecast server
//!
//! TLS listener, static page and lifecycle for the framecast WebSocket
//! fanout endpoint.
//!
//! - HTTP/1.1 via hyper, TLS via rustls
//! - `GET /` serves an embedded HTML page
//! - `GET /ws` upgrades to a WebSocket client of the fanout hub
//! - [`FanoutServer::start`] / [`FanoutServer::stop`] lifecycle, with
//!   [`FanoutServer::broadcast_frame`] as the producer entry point
//!
//! ## Example
//!
//! ```rust,ignore
//! use framecast_server::{FanoutServer, ServerConfig, TlsConfig};
//!
//! let config = ServerConfig::builder()
//!     .tls(TlsConfig::from_files("servercert.pem", "prvtkey.pem"))
//!     .build();
//! let server = FanoutServer::new(config);
//! server.start().await?;
//! server.broadcast_frame(frame).await;
//! server.stop().await;
//! ```

#![doc(html_root_url = "https://docs.rs/framecast-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod server;
pub mod settings;
pub mod shutdown;
pub mod static_page;
pub mod tls;

pub use config::{ServerConfig, ServerConfigBuilder, TlsConfig};
pub use error::StartError;
pub use server::{FanoutServer, ServerHub, UpgradedIo};
pub use settings::{Settings, SettingsError};
pub use shutdown::ShutdownSignal;
pub use static_page::StaticPage;
pub use tls::{load_tls_acceptor, TlsError};
