//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use udsipc_core::{SocketPathResult, SocketPathShortener, fits_socket_path};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path to the server's Unix socket.
    pub socket_path: PathBuf,

    /// Alias used to shorten `socket_path` when it exceeds the platform
    /// socket path limit.
    pub symlink_alias: Option<String>,

    /// How long a connection attempt may take.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: udsipc_server::default_socket_path(),
            symlink_alias: None,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Creates a client configuration for the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    /// Builder: set the symlink alias for path shortening.
    pub fn with_symlink_alias(mut self, alias: impl Into<String>) -> Self {
        self.symlink_alias = Some(alias.into());
        self
    }

    /// Builder: set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns the path to connect to, shortened through the alias if needed.
    pub fn resolve_socket_path(&self) -> SocketPathResult<PathBuf> {
        match &self.symlink_alias {
            Some(alias) if !fits_socket_path(&self.socket_path) => {
                SocketPathShortener::default().shorten(&self.socket_path, alias)
            }
            _ => Ok(self.socket_path.clone()),
        }
    }
}
