//! Connection registry
//!
//! Indexes every live connection and, once it has sent a registration frame,
//! its declared role and registration time. Provides thread-safe access for
//! the socket tasks, the dispatcher and the broadcast router.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{ConnectionHandle, ConnectionId};
use crate::server::Role;

/// Role and activity stamp attached by a registration frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub role: Role,
    pub last_activity: DateTime<Utc>,
}

struct Entry {
    handle: ConnectionHandle,
    registration: Option<Registration>,
    /// Order of the most recent registration
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<ConnectionId, Entry>,
    next_seq: u64,
}

/// Registry of live connections
///
/// A connection is indexed from the moment its socket is accepted so the
/// router can reach it, but it only has a role after registering.
/// Entries are removed eagerly when the socket task ends.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a freshly accepted connection
    pub async fn connect(&self, handle: ConnectionHandle) {
        let id = handle.id();
        let mut inner = self.inner.write().await;
        inner.entries.insert(
            id,
            Entry {
                handle,
                registration: None,
                seq: 0,
            },
        );
        debug!("Connection {} indexed", id);
    }

    /// Attach `role` to a connection and stamp its activity time
    ///
    /// Any role string is accepted. Returns false if the connection is not
    /// indexed (already disconnected).
    pub async fn register(&self, id: ConnectionId, role: Role) -> bool {
        if !role.is_known() {
            warn!("Connection {} registered with unrecognized role '{}'", id, role);
        }

        let mut inner = self.inner.write().await;
        inner.next_seq += 1;
        let seq = inner.next_seq;

        match inner.entries.get_mut(&id) {
            Some(entry) => {
                entry.registration = Some(Registration {
                    role,
                    last_activity: Utc::now(),
                });
                entry.seq = seq;
                true
            }
            None => false,
        }
    }

    /// Drop a connection from the index, registered or not
    pub async fn unregister(&self, id: ConnectionId) -> Option<Registration> {
        let mut inner = self.inner.write().await;
        inner
            .entries
            .remove(&id)
            .and_then(|entry| entry.registration)
    }

    /// Registration details of a connection, if it has registered
    pub async fn lookup(&self, id: ConnectionId) -> Option<Registration> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(&id)
            .and_then(|entry| entry.registration.clone())
    }

    /// Snapshot of every connection whose latest registration used `role`,
    /// in registration order
    pub async fn all_with_role(&self, role: &Role) -> Vec<ConnectionHandle> {
        let inner = self.inner.read().await;
        let mut matching: Vec<(u64, ConnectionHandle)> = inner
            .entries
            .values()
            .filter(|entry| {
                entry
                    .registration
                    .as_ref()
                    .is_some_and(|registration| &registration.role == role)
            })
            .map(|entry| (entry.seq, entry.handle.clone()))
            .collect();
        drop(inner);

        matching.sort_by_key(|(seq, _)| *seq);
        matching.into_iter().map(|(_, handle)| handle).collect()
    }

    /// Number of indexed connections
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Number of connections that have registered a role
    pub async fn registered_count(&self) -> usize {
        self.inner
            .read()
            .await
            .entries
            .values()
            .filter(|entry| entry.registration.is_some())
            .count()
    }
}
