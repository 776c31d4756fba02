//! Connection handles
//!
//! A `ConnectionHandle` is the relay's view of one socket: an id plus the
//! sending half of a bounded outbound queue. The socket task owns the
//! receiving half and the actual WebSocket.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

/// Default number of frames buffered per connection before it is closed
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Identifier of a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of handing one frame to a connection's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame queued for the socket task
    Queued,
    /// The socket task is gone; nothing was sent
    Closed,
    /// Queue was full; the frame was dropped and the connection told to close
    Overflowed,
}

/// Sending side of a connection, shared with the registry
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<str>>,
    overflow: Arc<Notify>,
}

/// Receiving side of a connection, owned by the socket task
pub struct Outbound {
    pub frames: mpsc::Receiver<Arc<str>>,
    pub overflow: Arc<Notify>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh id and an outbound queue of `capacity` frames
    pub fn channel(capacity: usize) -> (Self, Outbound) {
        let (tx, frames) = mpsc::channel(capacity.max(1));
        let overflow = Arc::new(Notify::new());
        let handle = Self {
            id: ConnectionId::new(),
            tx,
            overflow: Arc::clone(&overflow),
        };
        (handle, Outbound { frames, overflow })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the socket task is still draining the queue
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a serialized frame without waiting
    pub fn send(&self, frame: Arc<str>) -> SendOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => SendOutcome::Queued,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.overflow.notify_one();
                SendOutcome::Overflowed
            }
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}
