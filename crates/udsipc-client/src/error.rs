//! Client error types.

use std::fmt;

use udsipc_core::SocketPathError;
use udsipc_server::ServerError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
///
/// [`ClientError::RemoteFailure`] means the server received the request and
/// explicitly answered with a failure; every other variant means no usable
/// answer arrived.
#[derive(Debug)]
pub enum ClientError {
    /// IO error while writing to the connection.
    Io(std::io::Error),
    /// Socket path could not be shortened.
    SocketPath(SocketPathError),
    /// The local server could not be started.
    Server(ServerError),
    /// Connection to server failed.
    Connection(String),
    /// The connection dropped before the response arrived.
    ConnectionLost,
    /// Protocol/framing error.
    Protocol(String),
    /// Request timed out.
    Timeout(String),
    /// The server reported that it could not handle the request.
    RemoteFailure,
}

impl ClientError {
    /// Returns true if the failure was reported by the server rather than
    /// caused by the transport.
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, Self::RemoteFailure)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::SocketPath(err) => write!(f, "socket path error: {}", err),
            Self::Server(err) => write!(f, "server error: {}", err),
            Self::Connection(msg) => write!(f, "connection error: {}", msg),
            Self::ConnectionLost => write!(f, "connection lost before a response arrived"),
            Self::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Self::Timeout(msg) => write!(f, "timeout: {}", msg),
            Self::RemoteFailure => write!(f, "server reported failure"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::SocketPath(err) => Some(err),
            Self::Server(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<SocketPathError> for ClientError {
    fn from(err: SocketPathError) -> Self {
        Self::SocketPath(err)
    }
}

impl From<ServerError> for ClientError {
    fn from(err: ServerError) -> Self {
        Self::Server(err)
    }
}

impl From<udsipc_protocol::ProtocolError> for ClientError {
    fn from(err: udsipc_protocol::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
