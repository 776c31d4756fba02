//! Relay core
//!
//! Connection registry, role-based broadcast routing and inbound frame
//! dispatch. `Relay` bundles them with the screenshot store so that socket
//! and HTTP handlers share one instance through explicit state.

mod connection;
mod dispatcher;
mod registry;
mod router;

pub use connection::*;
pub use dispatcher::*;
pub use registry::*;
pub use router::*;

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::server::{ProtocolResult, ServerEvent};
use crate::store::ScreenshotStore;

/// The relay service: registry, router and store for one server instance
#[derive(Clone)]
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    router: BroadcastRouter,
    store: Arc<ScreenshotStore>,
}

impl Relay {
    /// Create a relay with an empty registry and store
    pub fn new() -> Self {
        Self::with_store(Arc::new(ScreenshotStore::new()))
    }

    /// Create a relay around an existing store
    pub fn with_store(store: Arc<ScreenshotStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            router: BroadcastRouter::new(Arc::clone(&registry)),
            registry,
            store,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &BroadcastRouter {
        &self.router
    }

    pub fn store(&self) -> &Arc<ScreenshotStore> {
        &self.store
    }

    /// Store a screenshot and push it to every receiver
    ///
    /// Shared by the socket path (after the helper check) and the upload
    /// endpoint. The broadcast carries the same timestamp as the stored record.
    pub async fn publish_screenshot(
        &self,
        question_id: &str,
        screenshot: &str,
    ) -> ProtocolResult<BroadcastReport> {
        info!("Received screenshot with questionId: {}", question_id);
        let stamped = self.store.put(question_id, screenshot).await;
        let event = ServerEvent::new_screenshot(question_id, screenshot, stamped);
        self.router.broadcast_to_receivers(&event).await
    }

    /// Push page markup to every receiver
    pub async fn publish_page_html(&self, html: &str) -> ProtocolResult<BroadcastReport> {
        info!("Received page HTML ({} bytes)", html.len());
        let event = ServerEvent::page_html(html, Utc::now());
        self.router.broadcast_to_receivers(&event).await
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}
