//! Role-based broadcast routing

use std::sync::Arc;

use tracing::{debug, warn};

use super::{ConnectionRegistry, SendOutcome};
use crate::server::{ProtocolResult, Role, ServerEvent};

/// Per-broadcast delivery counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Frames queued to open connections
    pub delivered: usize,
    /// Matching connections already closed
    pub skipped: usize,
    /// Matching connections whose queue was full
    pub overflowed: usize,
}

impl BroadcastReport {
    /// Number of connections that matched the role
    pub fn matched(&self) -> usize {
        self.delivered + self.skipped + self.overflowed
    }
}

/// Fans events out to every open connection registered with a role
#[derive(Clone)]
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Send `event` to every open connection registered as `role`
    ///
    /// The event is serialized once. Recipients are snapshotted first, so
    /// registrations racing with the broadcast are neither blocked nor seen.
    /// Closed connections are skipped and left for their socket task to
    /// unregister.
    pub async fn broadcast_to_role(
        &self,
        role: &Role,
        event: &ServerEvent,
    ) -> ProtocolResult<BroadcastReport> {
        let frame: Arc<str> = Arc::from(event.to_json()?);
        let recipients = self.registry.all_with_role(role).await;

        let mut report = BroadcastReport::default();
        for handle in recipients {
            if !handle.is_open() {
                report.skipped += 1;
                continue;
            }
            match handle.send(Arc::clone(&frame)) {
                SendOutcome::Queued => report.delivered += 1,
                SendOutcome::Closed => report.skipped += 1,
                SendOutcome::Overflowed => {
                    warn!(
                        "Outbound queue full for connection {}, closing it",
                        handle.id()
                    );
                    report.overflowed += 1;
                }
            }
        }

        debug!(
            "Broadcast {} to {} {}(s): {:?}",
            event.kind(),
            report.matched(),
            role,
            report
        );
        Ok(report)
    }

    pub async fn broadcast_to_receivers(
        &self,
        event: &ServerEvent,
    ) -> ProtocolResult<BroadcastReport> {
        self.broadcast_to_role(&Role::Receiver, event).await
    }

    pub async fn broadcast_to_helpers(
        &self,
        event: &ServerEvent,
    ) -> ProtocolResult<BroadcastReport> {
        self.broadcast_to_role(&Role::Helper, event).await
    }
}
