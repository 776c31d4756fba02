//! Relay server module
//!
//! Serves the WebSocket relay, the upload/proxy endpoints and static files on
//! a single port.

mod error;
mod http;
mod protocol;
mod routes;
mod websocket;

pub use error::*;
pub use protocol::*;
pub use routes::*;

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::ServerConfig;
use crate::relay::Relay;
use crate::store::spawn_cleanup;

/// Relay server: owns the relay state and the shutdown signal
pub struct RelayServer {
    config: ServerConfig,
    relay: Relay,
    http_client: reqwest::Client,
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Create a new relay server
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let http_client = reqwest::Client::builder().build()?;
        Ok(Self {
            config,
            relay: Relay::new(),
            http_client,
            shutdown_tx,
        })
    }

    /// The relay shared by every handler of this server
    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Trigger server shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Build the HTTP/WebSocket router for this server
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
            http_client: self.http_client.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
            outbound_capacity: self.config.outbound_capacity,
        };
        build_router(state, &self.config)
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("Server running on http://{} (WebSocket on any path)", addr);
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    ///
    /// Also runs the screenshot cleanup task for the lifetime of the server.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        let cleanup = spawn_cleanup(
            self.relay.store().clone(),
            self.config.cleanup_interval,
            self.config.screenshot_ttl,
            self.shutdown_tx.subscribe(),
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let app = self.router();

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, stopping server");
        })
        .await?;

        let _ = cleanup.await;

        let registry = self.relay.registry();
        let remaining = registry.connection_count().await;
        if remaining > 0 {
            info!(
                "{} connection(s) still closing ({} registered)",
                remaining,
                registry.registered_count().await
            );
        }

        Ok(())
    }
}
