//! Server configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::relay::DEFAULT_OUTBOUND_CAPACITY;
use crate::store::DEFAULT_CLEANUP_INTERVAL;

/// Default listening port
pub const DEFAULT_PORT: u16 = 3000;

/// Default bind address
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Directory served for static files
pub const DEFAULT_PUBLIC_DIR: &str = "public";

/// Maximum accepted upload body (50MB)
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Configuration for the relay server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: String,
    /// Port to listen on
    pub port: u16,
    /// Directory of static assets
    pub public_dir: PathBuf,
    /// Maximum HTTP request body in bytes
    pub body_limit: usize,
    /// Frames buffered per connection before it is closed
    pub outbound_capacity: usize,
    /// How often stored screenshots are swept
    pub cleanup_interval: Duration,
    /// How long a stored screenshot survives
    pub screenshot_ttl: Duration,
}

impl ServerConfig {
    /// Create a new server configuration with defaults for everything but the address
    pub fn new(bind: impl Into<String>, port: u16) -> Self {
        Self {
            bind: bind.into(),
            port,
            public_dir: PathBuf::from(DEFAULT_PUBLIC_DIR),
            body_limit: DEFAULT_BODY_LIMIT,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            screenshot_ttl: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    /// Set the static asset directory
    pub fn with_public_dir(mut self, public_dir: impl Into<PathBuf>) -> Self {
        self.public_dir = public_dir.into();
        self
    }

    /// Set the request body limit in bytes
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    /// Set the per-connection outbound queue capacity
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Set the cleanup period and screenshot lifetime
    pub fn with_cleanup(mut self, interval: Duration, ttl: Duration) -> Self {
        self.cleanup_interval = interval;
        self.screenshot_ttl = ttl;
        self
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BIND, DEFAULT_PORT)
    }
}
