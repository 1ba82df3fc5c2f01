//! Shared utilities for udsipc: tracing setup and socket path shortening.

pub mod socket_path;
pub mod tracing;

pub use socket_path::{
    SocketPathError, SocketPathResult, SocketPathShortener, fits_socket_path, max_socket_path_len,
};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
