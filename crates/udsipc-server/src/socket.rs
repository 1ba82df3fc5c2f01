//! Unix socket listener for IPC.
//!
//! [`UdsServer`] binds the configured socket path, accepts any number of
//! concurrent clients and runs one frame receiver per connection. Every
//! request envelope is handed to the application handler on its own task, and
//! the handler's [`Response`] is written back on the same connection under
//! the request's correlation ID.

use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use udsipc_core::{SocketPathShortener, fits_socket_path};
use udsipc_protocol::{
    Body, Envelope, ProtocolError, ReceiveError, Response, receive_messages, write_envelope,
};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Boxed future returned by a [`MessageHandler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased request handler shared by all connections.
pub type MessageHandler = Arc<dyn Fn(Vec<u8>) -> HandlerFuture + Send + Sync>;

/// Write half of a connection, shared with in-flight handler tasks.
type SharedWriter = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// Unix socket server dispatching requests to an application handler.
pub struct UdsServer {
    config: ServerConfig,
    inner: Arc<ServerInner>,
    /// Serializes `start` calls.
    start_lock: tokio::sync::Mutex<()>,
}

struct ServerInner {
    listener: Mutex<Option<ActiveListener>>,
    connections: Mutex<HashMap<u64, TrackedConnection>>,
    next_connection_id: AtomicU64,
    connection_semaphore: Arc<Semaphore>,
}

struct ActiveListener {
    task: JoinHandle<()>,
    path: PathBuf,
}

struct TrackedConnection {
    reader: JoinHandle<()>,
    writer: SharedWriter,
    _permit: OwnedSemaphorePermit,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl UdsServer {
    /// Creates a server for the given configuration. Nothing is bound until
    /// [`start`](Self::start) is called.
    pub fn new(config: ServerConfig) -> Self {
        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));
        Self {
            config,
            inner: Arc::new(ServerInner {
                listener: Mutex::new(None),
                connections: Mutex::new(HashMap::new()),
                next_connection_id: AtomicU64::new(0),
                connection_semaphore,
            }),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the configured socket path.
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Returns the path the listener is bound to, which differs from the
    /// configured one when it had to be shortened.
    pub fn bound_path(&self) -> Option<PathBuf> {
        lock(&self.inner.listener)
            .as_ref()
            .map(|listener| listener.path.clone())
    }

    /// Returns true while the listener is accepting connections.
    pub fn is_running(&self) -> bool {
        lock(&self.inner.listener)
            .as_ref()
            .is_some_and(|listener| !listener.task.is_finished())
    }

    /// Returns the number of tracked client connections.
    pub fn connection_count(&self) -> usize {
        lock(&self.inner.connections).len()
    }

    /// Binds the socket and starts accepting connections.
    ///
    /// Returns once the listener is bound; setup failures (unusable path,
    /// live server on the same path, permission denied) are returned here.
    /// `handler` receives each request payload and its result is sent back
    /// as the response.
    pub async fn start<F, Fut>(&self, handler: F) -> ServerResult<()>
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let _guard = self.start_lock.lock().await;

        if let Some(path) = self.bound_path()
            && self.is_running()
        {
            return Err(ServerError::already_running(path.to_string_lossy()));
        }

        let socket_path = self.resolve_socket_path()?;
        self.prepare_socket_path(&socket_path).await?;

        let listener = UnixListener::bind(&socket_path)?;
        info!(
            path = %socket_path.display(),
            "Socket server listening"
        );

        let handler: MessageHandler =
            Arc::new(move |payload| -> HandlerFuture { Box::pin(handler(payload)) });
        let task = tokio::spawn(accept_loop(self.inner.clone(), listener, handler));

        *lock(&self.inner.listener) = Some(ActiveListener {
            task,
            path: socket_path,
        });
        Ok(())
    }

    /// Stops accepting, closes every connection and removes the socket file.
    ///
    /// Safe to call repeatedly or before `start`. Handlers already running
    /// are not interrupted, but their responses can no longer be delivered.
    pub async fn stop(&self) {
        let active = lock(&self.inner.listener).take();
        if let Some(active) = active {
            active.task.abort();
            remove_socket_file(&active.path);
            info!(path = %active.path.display(), "Socket server stopped");
        }
        self.inner.close_all_connections().await;
    }

    fn resolve_socket_path(&self) -> ServerResult<PathBuf> {
        let path = &self.config.socket_path;
        match &self.config.symlink_alias {
            Some(alias) if !fits_socket_path(path) => {
                Ok(SocketPathShortener::default().shorten(path, alias)?)
            }
            _ => Ok(path.clone()),
        }
    }

    /// Checks the parent directory and deals with a leftover socket file.
    async fn prepare_socket_path(&self, socket_path: &Path) -> ServerResult<()> {
        if let Some(parent) = socket_path.parent()
            && !parent.exists()
        {
            return Err(ServerError::socket_path_invalid(
                parent.to_string_lossy().to_string(),
            ));
        }

        if !socket_path.exists() {
            return Ok(());
        }

        if !self.config.cleanup_stale_socket {
            return Err(ServerError::socket_in_use(
                socket_path.to_string_lossy().to_string(),
            ));
        }

        // A live server answers; a stale file refuses the connection.
        match UnixStream::connect(socket_path).await {
            Ok(_) => Err(ServerError::socket_in_use(
                socket_path.to_string_lossy().to_string(),
            )),
            Err(_) => {
                info!(
                    path = %socket_path.display(),
                    "Removing stale socket"
                );
                std::fs::remove_file(socket_path)?;
                Ok(())
            }
        }
    }
}

impl Drop for UdsServer {
    fn drop(&mut self) {
        if let Some(active) = lock(&self.inner.listener).take() {
            active.task.abort();
            remove_socket_file(&active.path);
        }
        for (_, connection) in lock(&self.inner.connections).drain() {
            connection.reader.abort();
        }
    }
}

impl ServerInner {
    /// Registers an accepted stream and starts its receive loop.
    fn track(
        self: &Arc<Self>,
        stream: UnixStream,
        permit: OwnedSemaphorePermit,
        handler: MessageHandler,
    ) {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (read_half, write_half) = stream.into_split();
        let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(write_half));

        // Hold the set while spawning so the loop cannot deregister the
        // connection before it is inserted.
        let mut connections = lock(&self.connections);
        let reader = tokio::spawn(serve_connection(
            self.clone(),
            id,
            read_half,
            writer.clone(),
            handler,
        ));
        connections.insert(
            id,
            TrackedConnection {
                reader,
                writer,
                _permit: permit,
            },
        );
        debug!(connection = id, total = connections.len(), "Accepted new connection");
    }

    /// Removes one connection from the set and closes it.
    async fn close_connection(&self, id: u64) {
        let connection = lock(&self.connections).remove(&id);
        if let Some(connection) = connection {
            shutdown_writer(&connection.writer).await;
            debug!(connection = id, "Connection closed");
        }
    }

    async fn close_all_connections(&self) {
        let drained: Vec<_> = lock(&self.connections).drain().collect();
        if drained.is_empty() {
            return;
        }
        info!(count = drained.len(), "Closing all connections");
        for (_, connection) in drained {
            connection.reader.abort();
            shutdown_writer(&connection.writer).await;
        }
    }

    /// Tears everything down after the listener itself failed.
    async fn fail_listener(&self) {
        let active = lock(&self.listener).take();
        if let Some(active) = active {
            remove_socket_file(&active.path);
        }
        self.close_all_connections().await;
    }
}

async fn accept_loop(inner: Arc<ServerInner>, listener: UnixListener, handler: MessageHandler) {
    loop {
        let Ok(permit) = inner.connection_semaphore.clone().acquire_owned().await else {
            break;
        };

        match listener.accept().await {
            Ok((stream, _addr)) => inner.track(stream, permit, handler.clone()),
            Err(e) => {
                error!(error = %e, "Listener failed, shutting down");
                break;
            }
        }
    }
    inner.fail_listener().await;
}

/// Runs the receive loop for one connection, then deregisters it once every
/// dispatched request has written its response.
async fn serve_connection(
    inner: Arc<ServerInner>,
    id: u64,
    read_half: tokio::net::unix::OwnedReadHalf,
    writer: SharedWriter,
    handler: MessageHandler,
) {
    // Each dispatched request holds a sender; `recv` returns `None` once all
    // of them are gone.
    let (in_flight, mut drained) = mpsc::channel::<()>(1);

    receive_messages(
        read_half,
        |envelope| {
            dispatch(id, envelope, &writer, &handler, &in_flight);
            std::future::ready(ControlFlow::Continue(()))
        },
        |e| {
            log_receive_error(id, &e);
            ControlFlow::Break(())
        },
    )
    .await;

    drop(in_flight);
    let _ = drained.recv().await;
    inner.close_connection(id).await;
}

/// Hands a request to the application on its own task so slow requests do
/// not hold up later ones on the same connection.
fn dispatch(
    id: u64,
    envelope: Envelope,
    writer: &SharedWriter,
    handler: &MessageHandler,
    in_flight: &mpsc::Sender<()>,
) {
    match envelope.body {
        Body::Request { payload } => {
            debug!(connection = id, request_id = %envelope.id, len = payload.len(), "Request received");
            let response_future = handler(payload);
            let writer = writer.clone();
            let in_flight = in_flight.clone();
            tokio::spawn(async move {
                let response = response_future.await;
                send_response(id, &writer, Envelope::response(envelope.id, response)).await;
                drop(in_flight);
            });
        }
        Body::Response { .. } => {
            // Server-initiated requests are not supported, so there is
            // nothing to correlate this with.
            debug!(connection = id, request_id = %envelope.id, "Ignoring response envelope from client");
        }
    }
}

/// Writes a response, replacing one too large to frame with a failure.
async fn send_response(id: u64, writer: &SharedWriter, reply: Envelope) {
    let mut writer = writer.lock().await;
    let result = match write_envelope(&mut *writer, &reply).await {
        Err(ProtocolError::MessageTooLarge { size, max }) => {
            warn!(
                connection = id,
                request_id = %reply.id,
                size,
                max,
                "Response too large, sending failure instead"
            );
            write_envelope(&mut *writer, &Envelope::response(reply.id, Response::Failure)).await
        }
        other => other,
    };
    if let Err(e) = result {
        warn!(
            connection = id,
            request_id = %reply.id,
            error = %e,
            "Failed to send response"
        );
    }
}

fn log_receive_error(id: u64, e: &ReceiveError) {
    match e {
        ReceiveError::ConnectionClosed => debug!(connection = id, "Client disconnected"),
        ReceiveError::Decode(err) => error!(
            connection = id,
            error = %err,
            "Malformed envelope, possible protocol mismatch; closing connection"
        ),
        other => warn!(connection = id, error = %other, "Connection read failed"),
    }
}

async fn shutdown_writer(writer: &SharedWriter) {
    let mut writer = writer.lock().await;
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "Socket shutdown failed");
    }
}

fn remove_socket_file(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_file(path) {
        warn!(
            path = %path.display(),
            error = %e,
            "Failed to remove socket file"
        );
    } else {
        debug!(
            path = %path.display(),
            "Removed socket file"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;
    use udsipc_protocol::read_envelope;

    async fn echo(payload: Vec<u8>) -> Response {
        Response::success(payload)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    async fn roundtrip(stream: &mut UnixStream, payload: &[u8]) -> Envelope {
        let request = Envelope::request(payload.to_vec());
        write_envelope(stream, &request).await.unwrap();
        let response = read_envelope(stream).await.unwrap();
        assert_eq!(response.id, request.id);
        response
    }

    #[tokio::test]
    async fn start_creates_and_stop_removes_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let server = UdsServer::new(ServerConfig::new(&socket_path));
        assert!(!server.is_running());
        server.start(echo).await.unwrap();

        assert!(socket_path.exists());
        assert!(server.is_running());
        assert_eq!(server.bound_path(), Some(socket_path.clone()));

        server.stop().await;
        assert!(!socket_path.exists());
        assert!(!server.is_running());

        // Repeated stop is harmless.
        server.stop().await;
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let dir = tempdir().unwrap();
        let server = UdsServer::new(ServerConfig::new(dir.path().join("never.sock")));
        server.stop().await;
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn drop_removes_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let server = UdsServer::new(ServerConfig::new(&socket_path));
        server.start(echo).await.unwrap();
        drop(server);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let server = UdsServer::new(ServerConfig::new(dir.path().join("test.sock")));
        server.start(echo).await.unwrap();

        let result = server.start(echo).await;
        assert!(matches!(result, Err(ServerError::AlreadyRunning { .. })));
    }

    #[tokio::test]
    async fn rejects_live_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let first = UdsServer::new(ServerConfig::new(&socket_path));
        first.start(echo).await.unwrap();

        let second = UdsServer::new(ServerConfig::new(&socket_path));
        let result = second.start(echo).await;
        assert!(matches!(result, Err(ServerError::SocketInUse { .. })));
    }

    #[tokio::test]
    async fn rejects_existing_file_without_cleanup() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        std::fs::write(&socket_path, b"stale").unwrap();

        let config = ServerConfig::new(&socket_path).with_cleanup_stale_socket(false);
        let result = UdsServer::new(config).start(echo).await;
        assert!(matches!(result, Err(ServerError::SocketInUse { .. })));
    }

    #[tokio::test]
    async fn cleans_stale_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        std::fs::write(&socket_path, b"stale").unwrap();

        let server = UdsServer::new(ServerConfig::new(&socket_path));
        server.start(echo).await.unwrap();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        roundtrip(&mut stream, b"alive").await;
    }

    #[tokio::test]
    async fn missing_parent_is_setup_error() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("missing").join("test.sock");

        let result = UdsServer::new(ServerConfig::new(socket_path)).start(echo).await;
        assert!(matches!(result, Err(ServerError::SocketPathInvalid { .. })));
    }

    #[tokio::test]
    async fn echo_roundtrip_tracks_connection() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = UdsServer::new(ServerConfig::new(&socket_path));
        server.start(echo).await.unwrap();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        let response = roundtrip(&mut stream, b"ping").await;
        assert_eq!(
            response.body,
            Body::Response {
                result: Response::success(b"ping".to_vec())
            }
        );
        assert_eq!(server.connection_count(), 1);

        drop(stream);
        wait_until(|| server.connection_count() == 0).await;
    }

    #[tokio::test]
    async fn failing_handler_sends_failure() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = UdsServer::new(ServerConfig::new(&socket_path));
        server
            .start(|_payload| async { Response::Failure })
            .await
            .unwrap();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        let response = roundtrip(&mut stream, b"anything").await;
        assert_eq!(
            response.body,
            Body::Response {
                result: Response::Failure
            }
        );
    }

    #[tokio::test]
    async fn responses_may_complete_out_of_order() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = UdsServer::new(ServerConfig::new(&socket_path));
        server
            .start(|payload: Vec<u8>| async move {
                if payload == b"slow" {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Response::success(payload)
            })
            .await
            .unwrap();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        let slow = Envelope::request(b"slow".to_vec());
        let fast = Envelope::request(b"fast".to_vec());
        write_envelope(&mut stream, &slow).await.unwrap();
        write_envelope(&mut stream, &fast).await.unwrap();

        let first = read_envelope(&mut stream).await.unwrap();
        let second = read_envelope(&mut stream).await.unwrap();
        assert_eq!(first.id, fast.id);
        assert_eq!(second.id, slow.id);
    }

    #[tokio::test]
    async fn decode_error_isolated_to_one_connection() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = UdsServer::new(ServerConfig::new(&socket_path));
        server.start(echo).await.unwrap();

        let mut bad = UnixStream::connect(&socket_path).await.unwrap();
        let mut good = UnixStream::connect(&socket_path).await.unwrap();
        roundtrip(&mut good, b"before").await;
        wait_until(|| server.connection_count() == 2).await;

        bad.write_all(&5u32.to_be_bytes()).await.unwrap();
        bad.write_all(b"oops!").await.unwrap();

        // The server closes the bad connection.
        let result = read_envelope(&mut bad).await;
        assert!(matches!(result, Err(ReceiveError::ConnectionClosed)));
        wait_until(|| server.connection_count() == 1).await;

        roundtrip(&mut good, b"after").await;
        assert!(server.is_running());
    }

    #[tokio::test]
    async fn truncated_frame_closes_connection() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = UdsServer::new(ServerConfig::new(&socket_path));
        server.start(echo).await.unwrap();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        wait_until(|| server.connection_count() == 1).await;
        stream.write_all(&64u32.to_be_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();

        wait_until(|| server.connection_count() == 0).await;
    }

    #[tokio::test]
    async fn half_closed_client_still_gets_response() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = UdsServer::new(ServerConfig::new(&socket_path));
        server
            .start(|payload| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Response::success(payload)
            })
            .await
            .unwrap();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        let request = Envelope::request(b"last words".to_vec());
        write_envelope(&mut stream, &request).await.unwrap();
        stream.shutdown().await.unwrap();

        let response = read_envelope(&mut stream).await.unwrap();
        assert_eq!(response, request.success_response(Some(b"last words".to_vec())));
        wait_until(|| server.connection_count() == 0).await;
    }

    #[tokio::test]
    async fn oversized_response_becomes_failure() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = UdsServer::new(ServerConfig::new(&socket_path));
        server
            .start(|_| async { Response::success(vec![7u8; udsipc_protocol::max_payload_len() + 1]) })
            .await
            .unwrap();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        let response = roundtrip(&mut stream, b"big please").await;
        assert_eq!(response.body, Body::Response { result: Response::Failure });

        // The connection keeps serving.
        roundtrip(&mut stream, b"again").await;
        assert_eq!(server.connection_count(), 1);
        server.stop().await;
    }

    #[tokio::test]
    async fn response_envelopes_from_clients_are_ignored() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = UdsServer::new(ServerConfig::new(&socket_path));
        server.start(echo).await.unwrap();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        let stray = Envelope::response(udsipc_protocol::Uuid::new_v4(), Response::empty());
        write_envelope(&mut stream, &stray).await.unwrap();

        roundtrip(&mut stream, b"still open").await;
    }

    #[tokio::test]
    async fn stop_closes_open_connections() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = UdsServer::new(ServerConfig::new(&socket_path));
        server.start(echo).await.unwrap();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        roundtrip(&mut stream, b"hi").await;

        server.stop().await;
        assert_eq!(server.connection_count(), 0);
        let result = read_envelope(&mut stream).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn restart_after_stop() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = UdsServer::new(ServerConfig::new(&socket_path));

        server.start(echo).await.unwrap();
        server.stop().await;
        server.start(echo).await.unwrap();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        roundtrip(&mut stream, b"again").await;
    }

    #[tokio::test]
    async fn long_path_binds_through_alias() {
        let dir = tempdir().unwrap();
        let mut socket_dir = dir.path().to_path_buf();
        while socket_dir.as_os_str().len() <= udsipc_core::max_socket_path_len() {
            socket_dir.push("deeply-nested-shared-container");
        }
        std::fs::create_dir_all(&socket_dir).unwrap();
        let socket_path = socket_dir.join("agent.sock");

        let alias = format!("udsipc-test-{}", std::process::id());
        let server =
            UdsServer::new(ServerConfig::new(&socket_path).with_symlink_alias(alias.clone()));
        server.start(echo).await.unwrap();

        let bound = server.bound_path().unwrap();
        assert!(fits_socket_path(&bound));
        assert!(socket_path.exists());

        let mut stream = UnixStream::connect(&bound).await.unwrap();
        roundtrip(&mut stream, b"short").await;

        server.stop().await;
        let _ = std::fs::remove_file(std::env::temp_dir().join(alias));
    }

    #[tokio::test]
    async fn long_path_without_alias_fails() {
        let dir = tempdir().unwrap();
        let mut socket_dir = dir.path().to_path_buf();
        while socket_dir.as_os_str().len() <= udsipc_core::max_socket_path_len() {
            socket_dir.push("deeply-nested-shared-container");
        }
        std::fs::create_dir_all(&socket_dir).unwrap();

        let result = UdsServer::new(ServerConfig::new(socket_dir.join("agent.sock")))
            .start(echo)
            .await;
        assert!(result.is_err());
    }
}
