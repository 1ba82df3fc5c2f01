//! Unix domain socket server for udsipc.
//!
//! This crate provides the long-lived endpoint of a udsipc channel:
//! - Binding a (possibly shortened) socket path, with stale socket cleanup
//! - Tracking every accepted connection and its receive loop
//! - Dispatching request payloads to an application handler and writing the
//!   handler's [`Response`] back under the request's correlation ID
//! - Signal handling for servers running in the foreground
//!
//! # Example
//!
//! ```rust,no_run
//! use udsipc_server::{Response, ServerConfig, UdsServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = UdsServer::new(ServerConfig::new("/tmp/agent.sock"));
//!     server
//!         .start(|payload| async move { Response::success(payload) })
//!         .await?;
//!
//!     // Serve until told otherwise...
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod signals;
mod socket;

pub use config::{ServerConfig, default_socket_path};
pub use error::{ServerError, ServerResult};
pub use signals::{ShutdownSignal, SignalHandler};
pub use socket::{HandlerFuture, MessageHandler, UdsServer};
pub use udsipc_protocol::Response;
