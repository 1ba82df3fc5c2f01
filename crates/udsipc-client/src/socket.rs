//! Unix socket client multiplexing calls over one connection.
//!
//! Each [`UdsClient::send`] gets a fresh correlation ID and a slot in the
//! pending-call table before its frame is written. A single receive loop per
//! connection resolves slots as response envelopes arrive, in whatever order
//! the server answers. When a connection's receive loop ends, every call
//! still waiting on that connection fails with
//! [`ClientError::ConnectionLost`] and the next `send` reconnects.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use udsipc_protocol::{Body, Envelope, ReceiveError, Response, encode_message, receive_messages};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Client for calling a udsipc server over a Unix socket.
///
/// The connection is opened lazily on the first `send` and reopened after it
/// is lost. `send` may be called concurrently; calls share the connection.
pub struct UdsClient {
    config: ClientConfig,
    inner: Arc<ClientInner>,
}

struct ClientInner {
    pending: Mutex<PendingTable>,
    /// Current connection. Holding this lock serializes connection
    /// establishment and frame writes.
    connection: tokio::sync::Mutex<Option<ActiveConnection>>,
    next_generation: AtomicU64,
}

/// Calls awaiting a response, keyed by correlation ID.
#[derive(Default)]
struct PendingTable {
    calls: HashMap<Uuid, PendingEntry>,
    /// Generation of the connection whose receive loop is still running.
    open_generation: Option<u64>,
}

struct PendingEntry {
    generation: u64,
    tx: oneshot::Sender<Response>,
}

struct ActiveConnection {
    generation: u64,
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
    /// Set while a frame is being written; still set afterwards means the
    /// writing call was dropped midway and the stream is unusable.
    write_pending: bool,
}


/// A registered call. Dropping it removes the pending entry.
struct InFlight<'a> {
    id: Uuid,
    rx: oneshot::Receiver<Response>,
    inner: &'a ClientInner,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl UdsClient {
    /// Creates a client. No connection is made until the first `send`.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            inner: Arc::new(ClientInner {
                pending: Mutex::new(PendingTable::default()),
                connection: tokio::sync::Mutex::new(None),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a client with the default socket path.
    pub fn with_defaults() -> Self {
        Self::new(ClientConfig::default())
    }

    /// Returns the configured socket path.
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Returns the number of calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        lock(&self.inner.pending).calls.len()
    }

    /// Returns true if a usable connection is currently open.
    pub async fn is_connected(&self) -> bool {
        self.inner
            .connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| self.inner.is_usable(active))
    }

    /// Sends a request and waits for its response payload.
    ///
    /// Returns `Ok(None)` for a success response without payload and
    /// [`ClientError::RemoteFailure`] when the server answered with a
    /// failure. There is no built-in response timeout; see
    /// [`send_with_timeout`](Self::send_with_timeout).
    pub async fn send(&self, payload: impl Into<Vec<u8>>) -> ClientResult<Option<Vec<u8>>> {
        let call = self.start_call(payload.into()).await?;
        call.response().await
    }

    /// Like [`send`](Self::send), but gives up if no response arrives within
    /// `timeout`. A late response is then dropped as unknown.
    pub async fn send_with_timeout(
        &self,
        payload: impl Into<Vec<u8>>,
        timeout: Duration,
    ) -> ClientResult<Option<Vec<u8>>> {
        let call = self.start_call(payload.into()).await?;
        let id = call.id;
        match tokio::time::timeout(timeout, call.response()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(request_id = %id, timeout_ms = timeout.as_millis(), "Request timed out");
                Err(ClientError::Timeout(format!(
                    "no response within {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    /// Closes the current connection. Calls waiting on it fail with
    /// [`ClientError::ConnectionLost`].
    pub async fn disconnect(&self) {
        let active = self.inner.connection.lock().await.take();
        if let Some(mut active) = active {
            self.inner.discard(&active);
            if let Err(e) = active.writer.shutdown().await {
                debug!(error = %e, "Socket shutdown failed");
            }
            info!(socket = %self.config.socket_path.display(), "Disconnected");
        }
    }

    /// Registers a call and writes its request frame.
    async fn start_call(&self, payload: Vec<u8>) -> ClientResult<InFlight<'_>> {
        let envelope = Envelope::request(payload);
        let frame = encode_message(&envelope)?;

        let mut slot = self.inner.connection.lock().await;
        let active = match slot.take() {
            Some(active) if self.inner.is_usable(&active) => active,
            stale => {
                if let Some(stale) = stale {
                    debug!(generation = stale.generation, "Connection lost, reconnecting");
                    self.inner.discard(&stale);
                }
                self.connect().await?
            }
        };
        let active = slot.insert(active);

        let call = self.inner.register(envelope.id, active.generation)?;

        active.write_pending = true;
        let written = async {
            active.writer.write_all(&frame).await?;
            active.writer.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                active.write_pending = false;
                debug!(request_id = %envelope.id, len = frame.len(), "Request sent");
                Ok(call)
            }
            Err(e) => {
                warn!(request_id = %envelope.id, error = %e, "Failed to send request");
                if let Some(broken) = slot.take() {
                    self.inner.discard(&broken);
                }
                Err(ClientError::Io(e))
            }
        }
    }

    /// Opens a connection and starts its receive loop.
    async fn connect(&self) -> ClientResult<ActiveConnection> {
        let socket_path = self.config.resolve_socket_path()?;
        debug!(socket = %socket_path.display(), "Connecting to server");

        let stream = tokio::time::timeout(self.config.connect_timeout, UnixStream::connect(&socket_path))
            .await
            .map_err(|_| {
                ClientError::Connection(format!(
                    "connection timed out after {}ms",
                    self.config.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| {
                ClientError::Connection(format!(
                    "failed to connect to {}: {}",
                    socket_path.display(),
                    e
                ))
            })?;

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.pending).open_generation = Some(generation);

        let (read_half, writer) = stream.into_split();
        let inner = self.inner.clone();
        let reader = tokio::spawn(async move {
            receive_messages(
                read_half,
                |envelope| {
                    inner.resolve(envelope);
                    std::future::ready(ControlFlow::Continue(()))
                },
                |e| {
                    log_receive_error(generation, &e);
                    ControlFlow::Break(())
                },
            )
            .await;
            inner.close_generation(generation);
        });

        info!(socket = %socket_path.display(), generation, "Connected to server");
        Ok(ActiveConnection {
            generation,
            writer,
            reader,
            write_pending: false,
        })
    }
}

impl Drop for UdsClient {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.inner.connection.try_lock()
            && let Some(active) = slot.take()
        {
            self.inner.discard(&active);
        }
    }
}

impl ClientInner {
    /// A connection is usable until its receive loop has closed its
    /// generation or a write on it was abandoned midway.
    fn is_usable(&self, connection: &ActiveConnection) -> bool {
        !connection.write_pending
            && !connection.reader.is_finished()
            && lock(&self.pending).open_generation == Some(connection.generation)
    }

    /// Adds a pending entry for `id` on connection `generation`.
    fn register(&self, id: Uuid, generation: u64) -> ClientResult<InFlight<'_>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = lock(&self.pending);

        if pending.open_generation != Some(generation) {
            return Err(ClientError::ConnectionLost);
        }
        if pending.calls.contains_key(&id) {
            error!(request_id = %id, "Duplicate correlation id");
            return Err(ClientError::Protocol(format!("duplicate correlation id {id}")));
        }

        pending.calls.insert(id, PendingEntry { generation, tx });
        Ok(InFlight {
            id,
            rx,
            inner: self,
        })
    }

    /// Routes an incoming envelope to the call waiting for it.
    fn resolve(&self, envelope: Envelope) {
        match envelope.body {
            Body::Response { result } => {
                let entry = lock(&self.pending).calls.remove(&envelope.id);
                match entry {
                    Some(entry) => {
                        if entry.tx.send(result).is_err() {
                            debug!(request_id = %envelope.id, "Caller went away before response");
                        }
                    }
                    None => {
                        debug!(request_id = %envelope.id, "Dropping response for unknown request");
                    }
                }
            }
            Body::Request { .. } => {
                debug!(request_id = %envelope.id, "Ignoring request envelope from server");
            }
        }
    }

    /// Marks a connection closed and fails every call still waiting on it.
    fn close_generation(&self, generation: u64) {
        let lost: Vec<PendingEntry> = {
            let mut pending = lock(&self.pending);
            if pending.open_generation == Some(generation) {
                pending.open_generation = None;
            }
            let ids: Vec<Uuid> = pending
                .calls
                .iter()
                .filter(|(_, entry)| entry.generation == generation)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| pending.calls.remove(id))
                .collect()
        };

        if !lost.is_empty() {
            warn!(generation, count = lost.len(), "Connection lost with calls in flight");
        }
        // Dropping the senders fails the waiting calls.
        drop(lost);
    }

    /// Stops a connection's receive loop and fails its pending calls.
    fn discard(&self, connection: &ActiveConnection) {
        connection.reader.abort();
        self.close_generation(connection.generation);
    }
}

impl InFlight<'_> {
    async fn response(mut self) -> ClientResult<Option<Vec<u8>>> {
        let result = (&mut self.rx).await;
        debug!(request_id = %self.id, "Response received");
        match result {
            Ok(Response::Success { payload }) => Ok(payload),
            Ok(Response::Failure) => Err(ClientError::RemoteFailure),
            Err(_) => Err(ClientError::ConnectionLost),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(&self.inner.pending).calls.remove(&self.id);
    }
}

fn log_receive_error(generation: u64, e: &ReceiveError) {
    match e {
        ReceiveError::ConnectionClosed => debug!(generation, "Server closed connection"),
        ReceiveError::Decode(err) => error!(
            generation,
            error = %err,
            "Malformed envelope from server, possible protocol mismatch"
        ),
        other => warn!(generation, error = %other, "Connection read failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_client_creation() {
        let client = UdsClient::new(ClientConfig::new("/tmp/test.sock"));
        assert_eq!(client.socket_path(), Path::new("/tmp/test.sock"));
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn default_client() {
        let client = UdsClient::with_defaults();
        assert!(client.socket_path().to_string_lossy().contains("udsipc"));
    }

    #[test]
    fn register_rejects_closed_generation() {
        let client = UdsClient::with_defaults();
        let result = client.inner.register(Uuid::new_v4(), 0);
        assert!(matches!(result, Err(ClientError::ConnectionLost)));
    }

    #[test]
    fn register_rejects_duplicate_id() {
        let client = UdsClient::with_defaults();
        lock(&client.inner.pending).open_generation = Some(3);

        let id = Uuid::new_v4();
        let _first = client.inner.register(id, 3).unwrap();
        let second = client.inner.register(id, 3);
        assert!(matches!(second, Err(ClientError::Protocol(_))));
        assert_eq!(client.pending_calls(), 1);
    }

    #[tokio::test]
    async fn resolve_matches_by_id() {
        let client = UdsClient::with_defaults();
        lock(&client.inner.pending).open_generation = Some(0);

        let a = client.inner.register(Uuid::new_v4(), 0).unwrap();
        let b = client.inner.register(Uuid::new_v4(), 0).unwrap();

        client
            .inner
            .resolve(Envelope::response(b.id, Response::success(b"for b".to_vec())));
        client
            .inner
            .resolve(Envelope::response(a.id, Response::success(b"for a".to_vec())));

        assert_eq!(b.response().await.unwrap(), Some(b"for b".to_vec()));
        assert_eq!(a.response().await.unwrap(), Some(b"for a".to_vec()));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_response_is_dropped() {
        let client = UdsClient::with_defaults();
        lock(&client.inner.pending).open_generation = Some(0);
        let call = client.inner.register(Uuid::new_v4(), 0).unwrap();

        client
            .inner
            .resolve(Envelope::response(Uuid::new_v4(), Response::Failure));
        assert_eq!(client.pending_calls(), 1);

        client.inner.resolve(Envelope::response(call.id, Response::empty()));
        assert_eq!(call.response().await.unwrap(), None);
    }

    #[tokio::test]
    async fn close_generation_fails_only_its_calls() {
        let client = UdsClient::with_defaults();
        lock(&client.inner.pending).open_generation = Some(1);
        let old = client.inner.register(Uuid::new_v4(), 1).unwrap();

        lock(&client.inner.pending).open_generation = Some(2);
        let current = client.inner.register(Uuid::new_v4(), 2).unwrap();

        client.inner.close_generation(1);
        assert!(matches!(old.response().await, Err(ClientError::ConnectionLost)));
        assert_eq!(client.pending_calls(), 1);
        assert_eq!(lock(&client.inner.pending).open_generation, Some(2));

        client.inner.resolve(Envelope::response(current.id, Response::Failure));
        assert!(current.response().await.unwrap_err().is_remote_failure());
    }

    #[test]
    fn dropped_call_clears_entry() {
        let client = UdsClient::with_defaults();
        lock(&client.inner.pending).open_generation = Some(0);
        let call = client.inner.register(Uuid::new_v4(), 0).unwrap();
        assert_eq!(client.pending_calls(), 1);
        drop(call);
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn closed_generation_is_replaced_on_send() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("echo.sock");
        let server = udsipc_server::UdsServer::new(udsipc_server::ServerConfig::new(&path));
        server
            .start(|payload| async move { Response::success(payload) })
            .await
            .unwrap();

        // A connection whose receive loop closed its generation but whose
        // task has not finished yet.
        let (stream, _peer) = UnixStream::pair().unwrap();
        let (_read_half, writer) = stream.into_split();
        let stale = ActiveConnection {
            generation: 41,
            writer,
            reader: tokio::spawn(std::future::pending::<()>()),
            write_pending: false,
        };
        let client = UdsClient::new(ClientConfig::new(&path));
        lock(&client.inner.pending).open_generation = Some(41);
        assert!(client.inner.is_usable(&stale));

        client.inner.close_generation(41);
        assert!(!stale.reader.is_finished());
        assert!(!client.inner.is_usable(&stale));
        *client.inner.connection.lock().await = Some(stale);

        let reply = client.send(b"fresh".to_vec()).await.unwrap();
        assert_eq!(reply, Some(b"fresh".to_vec()));
        assert!(client.is_connected().await);

        server.stop().await;
    }

    #[tokio::test]
    async fn connect_failure_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = UdsClient::new(ClientConfig::new(dir.path().join("nobody.sock")));

        let result = client.send(b"hello".to_vec()).await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
        assert!(!client.is_connected().await);
        assert_eq!(client.pending_calls(), 0);
    }
}
