//! Read loop turning a byte stream into envelopes.
//!
//! The receiver owns no connection state. It reads frames off any
//! [`AsyncRead`] and hands each decoded [`Envelope`] to a handler until the
//! handler or the error callback asks it to stop. Closing the connection is
//! left to the caller.

use std::future::Future;
use std::io;
use std::ops::ControlFlow;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::LENGTH_PREFIX_LEN;
use crate::error::ProtocolError;
use crate::framing::{decode_envelope, frame_len};
use crate::types::Envelope;

/// Errors ending a receive loop iteration.
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// The stream ended partway through a length prefix or an envelope.
    #[error("not enough data: expected {expected} bytes, received {received}")]
    NotEnoughData { expected: usize, received: usize },

    /// The underlying connection reported an error while reading.
    #[error("connection error: {0}")]
    Connection(#[source] io::Error),

    /// The peer closed the connection between frames.
    #[error("connection closed")]
    ConnectionClosed,

    /// A complete frame arrived but did not decode as an envelope.
    #[error("decode error: {0}")]
    Decode(#[source] ProtocolError),
}

impl ReceiveError {
    /// Returns true for malformed frames, which point at a protocol mismatch
    /// rather than ordinary connection loss.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// Reads exactly one framed envelope.
pub async fn read_envelope<R>(reader: &mut R) -> Result<Envelope, ReceiveError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
    match read_full(reader, &mut len_buf).await? {
        0 => return Err(ReceiveError::ConnectionClosed),
        n if n < LENGTH_PREFIX_LEN => {
            return Err(ReceiveError::NotEnoughData {
                expected: LENGTH_PREFIX_LEN,
                received: n,
            });
        }
        _ => {}
    }

    let len = frame_len(&len_buf).map_err(ReceiveError::Decode)?;
    if len == 0 {
        return Err(ReceiveError::Decode(ProtocolError::EmptyMessage));
    }

    let mut payload = vec![0u8; len];
    let received = read_full(reader, &mut payload).await?;
    if received < len {
        return Err(ReceiveError::NotEnoughData {
            expected: len,
            received,
        });
    }

    trace!(len, "frame received");
    decode_envelope(&payload).map_err(ReceiveError::Decode)
}

/// Runs the receive loop until the handler or the error callback breaks.
///
/// `on_error` is invoked for every [`ReceiveError`]; returning
/// `ControlFlow::Continue(())` retries the read, which only makes sense for
/// errors the caller knows to be recoverable.
pub async fn receive_messages<R, H, Fut, E>(mut reader: R, mut handler: H, mut on_error: E)
where
    R: AsyncRead + Unpin,
    H: FnMut(Envelope) -> Fut,
    Fut: Future<Output = ControlFlow<()>>,
    E: FnMut(ReceiveError) -> ControlFlow<()>,
{
    loop {
        let flow = match read_envelope(&mut reader).await {
            Ok(envelope) => handler(envelope).await,
            Err(e) => on_error(e),
        };
        if flow.is_break() {
            break;
        }
    }
}

/// Spawns [`receive_messages`] on the current tokio runtime.
pub fn start_receiving<R, H, Fut, E>(reader: R, handler: H, on_error: E) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    H: FnMut(Envelope) -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    E: FnMut(ReceiveError) -> ControlFlow<()> + Send + 'static,
{
    tokio::spawn(receive_messages(reader, handler, on_error))
}

/// Fills `buf` unless the stream ends first; returns the bytes read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ReceiveError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ReceiveError::Connection(e)),
        }
    }
    Ok(filled)
}
