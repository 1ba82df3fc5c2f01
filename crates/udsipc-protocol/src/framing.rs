//! Length-prefixed message framing for IPC.
//!
//! Every envelope is framed with a 4-byte big-endian length prefix followed
//! by the JSON-encoded envelope:
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  JSON envelope   |
//! +----------------+------------------+
//! ```

use tokio::io::{AsyncWrite, AsyncWriteExt};

use uuid::Uuid;

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Envelope, Response};
use crate::{LENGTH_PREFIX_LEN, MAX_MESSAGE_SIZE, MessageLength};

/// Serializes an envelope without the length prefix.
pub fn encode_envelope(envelope: &Envelope) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(envelope)?)
}

/// Deserializes an envelope from its encoded bytes (no length prefix).
pub fn decode_envelope(data: &[u8]) -> ProtocolResult<Envelope> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    Ok(serde_json::from_slice(data)?)
}

/// Encodes an envelope to bytes with length prefix.
///
/// Returns the complete framed message ready for transmission. Envelopes
/// larger than [`MAX_MESSAGE_SIZE`] are rejected rather than truncated.
///
/// # Example
///
/// ```rust
/// use udsipc_protocol::{Envelope, encode_message};
///
/// let bytes = encode_message(&Envelope::request(b"ping".to_vec())).unwrap();
/// assert!(bytes.len() > 4);
/// ```
pub fn encode_message(envelope: &Envelope) -> ProtocolResult<Vec<u8>> {
    let json = encode_envelope(envelope)?;
    let len = check_len(json.len())?;

    let mut buffer = Vec::with_capacity(LENGTH_PREFIX_LEN + json.len());
    buffer.extend_from_slice(&len.to_be_bytes());
    buffer.extend_from_slice(&json);
    Ok(buffer)
}

/// Decodes an envelope from bytes with length prefix.
///
/// The input should be a complete framed message (length prefix + payload).
///
/// # Example
///
/// ```rust
/// use udsipc_protocol::{Envelope, decode_message, encode_message};
///
/// let envelope = Envelope::request(b"ping".to_vec());
/// let bytes = encode_message(&envelope).unwrap();
/// assert_eq!(decode_message(&bytes).unwrap(), envelope);
/// ```
pub fn decode_message(data: &[u8]) -> ProtocolResult<Envelope> {
    let Some(prefix) = data.get(..LENGTH_PREFIX_LEN) else {
        return Err(ProtocolError::IncompleteMessage {
            expected: LENGTH_PREFIX_LEN,
            received: data.len(),
        });
    };

    let len = frame_len(prefix)?;
    let end = LENGTH_PREFIX_LEN + len;

    let Some(body) = data.get(LENGTH_PREFIX_LEN..end) else {
        return Err(ProtocolError::IncompleteMessage {
            expected: end,
            received: data.len(),
        });
    };

    decode_envelope(body)
}

/// Frames and writes an envelope, flushing the writer.
pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    let data = encode_message(envelope)?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Largest payload that fits in a request envelope and in a success
/// response carrying it back, after base64 inflation.
pub fn max_payload_len() -> usize {
    let overhead = [
        Envelope::request(Vec::new()),
        Envelope::response(Uuid::nil(), Response::success(Vec::new())),
    ]
    .iter()
    .map(|envelope| encode_envelope(envelope).map_or(0, |bytes| bytes.len()))
    .max()
    .unwrap_or(0);

    // Standard base64 turns every 3 bytes into 4 characters.
    (MAX_MESSAGE_SIZE as usize).saturating_sub(overhead) / 4 * 3
}

/// Parses and bounds-checks a length prefix.
pub(crate) fn frame_len(prefix: &[u8]) -> ProtocolResult<usize> {
    let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
    len_buf.copy_from_slice(prefix);
    let len = MessageLength::from_be_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE as usize {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(len)
}

fn check_len(len: usize) -> ProtocolResult<MessageLength> {
    if len > MAX_MESSAGE_SIZE as usize {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(len as MessageLength)
}
