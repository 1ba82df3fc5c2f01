//! Envelope types, framing and the frame receiver for udsipc.
//!
//! This crate defines the wire protocol spoken between a udsipc client and
//! server over a Unix domain socket.
//!
//! # Protocol Overview
//!
//! Messages are sent as length-prefixed JSON:
//! - 4 bytes: envelope length (u32, big-endian)
//! - N bytes: JSON envelope
//!
//! # Envelope Structure
//!
//! Every message is an [`Envelope`] containing:
//! - `id`: UUID generated by the requester and echoed in the response
//! - `body`: a request carrying an opaque payload, or a response carrying a
//!   [`Response`] (success with optional payload, or failure)
//!
//! Payload bytes travel as base64 strings inside the JSON.
//!
//! # Example
//!
//! ```rust
//! use udsipc_protocol::{Envelope, decode_message, encode_message};
//!
//! let request = Envelope::request(b"ping".to_vec());
//! let bytes = encode_message(&request).unwrap();
//! let decoded = decode_message(&bytes).unwrap();
//! assert_eq!(decoded.id, request.id);
//! ```

mod error;
mod framing;
pub mod receiver;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{
    decode_envelope, decode_message, encode_envelope, encode_message, max_payload_len,
    write_envelope,
};
pub use receiver::{ReceiveError, read_envelope, receive_messages, start_receiving};
pub use types::{Body, Envelope, Response};
pub use uuid::Uuid;

/// Integer type of the length prefix.
pub type MessageLength = u32;

/// Width of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = std::mem::size_of::<MessageLength>();

/// Maximum encoded envelope size (1 MB).
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;
