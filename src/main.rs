//! Screen Relay Server
//!
//! Real-time relay between "helper" clients that capture screenshots and
//! "receiver" clients that send answers back. Serves the WebSocket relay,
//! a screenshot upload endpoint, an image proxy and static files on one port.

mod config;
mod relay;
mod server;
mod store;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{ServerConfig, DEFAULT_BIND, DEFAULT_PORT, DEFAULT_PUBLIC_DIR};
use relay::DEFAULT_OUTBOUND_CAPACITY;
use server::RelayServer;

/// Screen Relay Server
///
/// Forwards screenshots from helpers to receivers and answers back
#[derive(Parser, Debug)]
#[command(name = "screen-relay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Bind address
    #[arg(long, env = "BIND", default_value = DEFAULT_BIND)]
    bind: String,

    /// Directory of static files to serve
    #[arg(long, env = "PUBLIC_DIR", default_value = DEFAULT_PUBLIC_DIR)]
    public_dir: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Frames buffered per connection before a slow client is disconnected
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    outbound_queue: usize,

    /// Maximum upload body size in megabytes
    #[arg(long, default_value_t = 50)]
    body_limit_mb: usize,

    /// Seconds between screenshot cleanup sweeps
    #[arg(long, default_value_t = 86_400)]
    cleanup_interval_secs: u64,

    /// Seconds a stored screenshot is kept
    #[arg(long, default_value_t = 86_400)]
    screenshot_ttl_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Screen Relay v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::new(args.bind, args.port)
        .with_public_dir(args.public_dir)
        .with_body_limit(args.body_limit_mb.saturating_mul(1024 * 1024))
        .with_outbound_capacity(args.outbound_queue)
        .with_cleanup(
            Duration::from_secs(args.cleanup_interval_secs.max(1)),
            Duration::from_secs(args.screenshot_ttl_secs),
        );

    let server = Arc::new(RelayServer::new(config)?);
    let server_handle = Arc::clone(&server);

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Initiating graceful shutdown...");
        server_handle.shutdown();
    });

    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
