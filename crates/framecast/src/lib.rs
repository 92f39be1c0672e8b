//! framecast device binary support.
//!
//! Command-line parsing and the stdin frame producer used by `main`.

use std::future::Future;
use std::path::PathBuf;

use bytes::{Bytes, BytesMut};
use framecast_ws::BroadcastReport;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default producer frame size in bytes.
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// Command-line usage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    /// A flag needs a value that was not given.
    #[error("missing value for {0}")]
    MissingValue(&'static str),

    /// A flag value does not parse.
    #[error("invalid value for {flag}: {value:?}")]
    InvalidValue {
        /// The flag.
        flag: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Unrecognised argument.
    #[error("unknown argument: {0}")]
    Unknown(String),
}

/// Options for a normal run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    /// Settings file (TOML or JSON).
    pub config: Option<PathBuf>,
    /// Bytes of stdin per broadcast frame.
    pub frame_size: usize,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: None,
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }
}

/// What the command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the server.
    Run(Args),
    /// Print usage.
    Help,
    /// Print the version.
    Version,
}

impl Command {
    /// Parse arguments, excluding the program name.
    pub fn parse<I>(args: I) -> Result<Self, ArgsError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut parsed = Args::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = args.next().ok_or(ArgsError::MissingValue("--config"))?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--frame-size" | "-f" => {
                    let value = args.next().ok_or(ArgsError::MissingValue("--frame-size"))?;
                    parsed.frame_size = match value.parse::<usize>() {
                        Ok(size) if size > 0 => size,
                        _ => {
                            return Err(ArgsError::InvalidValue {
                                flag: "--frame-size",
                                value,
                            })
                        }
                    };
                }
                "--help" | "-h" => return Ok(Self::Help),
                "--version" | "-V" => return Ok(Self::Version),
                other => return Err(ArgsError::Unknown(other.to_string())),
            }
        }

        Ok(Self::Run(parsed))
    }
}

/// Usage text.
pub fn help_text() -> String {
    format!(
        r"framecast {VERSION} - TLS WebSocket frame fanout

USAGE:
    framecast [OPTIONS] < frames.bin

Reads stdin in fixed-size chunks and broadcasts each chunk as one binary
WebSocket frame to every client connected on /ws.

OPTIONS:
    -c, --config <PATH>       Settings file (TOML or JSON)
    -f, --frame-size <BYTES>  Bytes per frame (default: {DEFAULT_FRAME_SIZE})
    -h, --help                Print help information
    -V, --version             Print version information

ENVIRONMENT VARIABLES:
    FRAMECAST_BIND_ADDR              Listen address (default: 0.0.0.0:443)
    FRAMECAST_MAX_CLIENTS            Client registry capacity (default: 10)
    FRAMECAST_SEND_TIMEOUT_MS        Per-frame send timeout (default: 5000)
    FRAMECAST_SHUTDOWN_TIMEOUT_SECS  Graceful stop timeout (default: 10)
    FRAMECAST_TLS_CERT               Certificate chain PEM file
    FRAMECAST_TLS_KEY                Private key PEM file
    FRAMECAST_ALLOW_PLAINTEXT        Serve plain HTTP without TLS (true/false)
    FRAMECAST_LOG_LEVEL              Log filter (default: info)
    FRAMECAST_LOG_JSON               JSON logs (true/false)
    FRAMECAST_METRICS_ADDR           Prometheus exporter address
"
    )
}

/// Totals from a producer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Frames broadcast.
    pub frames: u64,
    /// Bytes read.
    pub bytes: u64,
    /// Sum of per-frame deliveries.
    pub delivered: u64,
    /// Clients evicted along the way.
    pub evicted: u64,
}

/// Read `reader` in `frame_size` chunks and broadcast each one.
///
/// A short final chunk is sent as-is. Returns at end of input.
pub async fn pump_frames<R, F, Fut>(
    mut reader: R,
    frame_size: usize,
    mut broadcast: F,
) -> std::io::Result<PumpStats>
where
    R: AsyncRead + Unpin,
    F: FnMut(Bytes) -> Fut,
    Fut: Future<Output = BroadcastReport>,
{
    let frame_size = frame_size.max(1);
    let mut stats = PumpStats::default();
    let mut buf = BytesMut::with_capacity(frame_size);

    loop {
        buf.reserve(frame_size - buf.len());
        let eof = loop {
            if buf.len() == frame_size {
                break false;
            }
            let mut chunk = (&mut reader).take((frame_size - buf.len()) as u64);
            if chunk.read_buf(&mut buf).await? == 0 {
                break true;
            }
        };

        if !buf.is_empty() {
            let frame = buf.split().freeze();
            stats.bytes += frame.len() as u64;
            let report = broadcast(frame).await;
            stats.frames += 1;
            stats.delivered += report.delivered as u64;
            stats.evicted += report.evicted.len() as u64;
            trace!(frame = stats.frames, delivered = report.delivered, "Frame broadcast");
        }

        if eof {
            debug!(frames = stats.frames, bytes = stats.bytes, "Producer input ended");
            return Ok(stats);
        }
    }
}
