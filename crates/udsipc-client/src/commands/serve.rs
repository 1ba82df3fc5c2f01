//! Serve command: runs an echo server in the foreground.

use tracing::info;

use udsipc_server::{Response, ServerConfig, SignalHandler, UdsServer};

use crate::error::ClientResult;

/// Serves until SIGINT/SIGTERM.
///
/// Every request payload is echoed back as a success response, or answered
/// with a failure when `fail` is set.
pub async fn run(config: ServerConfig, fail: bool) -> ClientResult<()> {
    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener()?;

    let server = UdsServer::new(config);
    server
        .start(move |payload| async move {
            if fail {
                Response::Failure
            } else {
                Response::success(payload)
            }
        })
        .await?;

    let path = server
        .bound_path()
        .unwrap_or_else(|| server.socket_path().to_path_buf());
    info!(path = %path.display(), fail, "Server listening");
    println!("listening on {}", path.display());

    signal_handler.shutdown().wait().await;

    info!("Shutting down...");
    server.stop().await;
    info!("Server stopped");
    Ok(())
}
