//! Multiplexing Unix socket client and the `udsipc` command-line interface.
//!
//! [`UdsClient`] connects lazily to a udsipc server, sends request envelopes
//! and matches response envelopes back to their callers by correlation ID.
//!
//! ```rust,no_run
//! use udsipc_client::{ClientConfig, UdsClient};
//!
//! # async fn demo() -> udsipc_client::ClientResult<()> {
//! let client = UdsClient::new(ClientConfig::new("/tmp/agent.sock"));
//! let reply = client.send(b"ping".to_vec()).await?;
//! assert_eq!(reply.as_deref(), Some(&b"ping"[..]));
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod socket;

pub use cli::Cli;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use socket::UdsClient;
