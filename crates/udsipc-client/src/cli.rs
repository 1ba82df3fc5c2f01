//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// udsipc - request/response messaging over Unix domain sockets
#[derive(Debug, Parser)]
#[command(name = "udsipc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the server socket
    #[arg(long, short, global = true, env = "UDSIPC_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Symlink alias used when the socket path is too long for the platform
    #[arg(long, global = true)]
    pub alias: Option<String>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run an echo server in the foreground until interrupted
    Serve {
        /// Maximum number of concurrent client connections
        #[arg(long, default_value_t = 100)]
        max_connections: usize,

        /// Answer every request with a failure instead of echoing it
        #[arg(long)]
        fail: bool,
    },

    /// Send one request and print the response payload
    Send {
        /// Request payload, sent as UTF-8 bytes
        payload: String,

        /// Seconds to wait for the response
        #[arg(long, short)]
        timeout: Option<u64>,
    },
}
