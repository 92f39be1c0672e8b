//! framecast device binary.
//!
//! Serves the viewer page and `/ws` endpoint, then broadcasts stdin to every
//! connected client in fixed-size binary frames until input ends or the
//! process receives SIGTERM/SIGINT.
//!
//! # Usage
//!
//! ```bash
//! framecast --config /etc/framecast.toml < /dev/video-frames
//!
//! FRAMECAST_BIND_ADDR=127.0.0.1:8080 framecast --frame-size 65536 < capture.raw
//! ```

use std::path::Path;
use std::process;
use std::time::Duration;

use anyhow::Context;
use framecast::{help_text, pump_frames, Args, Command, VERSION};
use framecast_server::{FanoutServer, Settings, ShutdownSignal};
use framecast_telemetry::init_telemetry;
use tracing::{error, info};

/// How long exit waits for blocked stdin reads.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    let args = match Command::parse(std::env::args().skip(1)) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print!("{}", help_text());
            return Ok(());
        }
        Ok(Command::Version) => {
            println!("framecast {VERSION}");
            return Ok(());
        }
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Use --help for usage information");
            process::exit(1);
        }
    };

    let settings = load_settings(args.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build Tokio runtime")?;

    let result = runtime.block_on(run(args, settings));

    // A pending stdin read sits on a blocking thread and never returns on its own.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    let settings = settings.with_env_overrides()?;
    settings.validate()?;
    Ok(settings)
}

async fn run(args: Args, settings: Settings) -> anyhow::Result<()> {
    init_telemetry(&settings.telemetry_config()).context("failed to initialize telemetry")?;

    info!(
        version = VERSION,
        bind_addr = %settings.server.bind_addr,
        max_clients = settings.server.max_clients,
        tls = settings.tls.is_some(),
        frame_size = args.frame_size,
        "Starting framecast"
    );

    let server = FanoutServer::new(settings.to_server_config());
    server.start().await.context("failed to start server")?;

    let shutdown = ShutdownSignal::with_os_signals();
    let producer = pump_frames(tokio::io::stdin(), args.frame_size, |frame| {
        let server = server.clone();
        async move { server.broadcast_frame(frame).await }
    });

    tokio::select! {
        result = producer => match result {
            Ok(stats) => info!(
                frames = stats.frames,
                bytes = stats.bytes,
                delivered = stats.delivered,
                evicted = stats.evicted,
                "Input ended"
            ),
            Err(e) => error!(error = %e, "Failed to read frames from stdin"),
        },
        () = shutdown.recv() => {}
    }

    server.stop().await;
    info!("framecast stopped");
    Ok(())
}
