//! udsipc CLI entry point.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use udsipc_client::cli::{Cli, Command};
use udsipc_client::commands;
use udsipc_client::config::ClientConfig;
use udsipc_client::error::ClientResult;
use udsipc_core::{TracingConfig, init_tracing};
use udsipc_server::ServerConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = match cli.command {
        Command::Serve { .. } => TracingConfig::server(cli.debug),
        Command::Send { .. } => TracingConfig::cli(cli.debug),
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let socket_path = cli
        .socket
        .unwrap_or_else(udsipc_server::default_socket_path);

    match cli.command {
        Command::Serve {
            max_connections,
            fail,
        } => {
            let mut config = ServerConfig::new(socket_path).with_max_connections(max_connections);
            if let Some(alias) = cli.alias {
                config = config.with_symlink_alias(alias);
            }
            commands::serve::run(config, fail).await
        }
        Command::Send { payload, timeout } => {
            let mut config = ClientConfig::new(socket_path);
            if let Some(alias) = cli.alias {
                config = config.with_symlink_alias(alias);
            }
            commands::send::run(config, payload, timeout.map(Duration::from_secs)).await
        }
    }
}
