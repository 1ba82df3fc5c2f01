//! Envelope types exchanged over the socket.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message envelope wrapping every request and response.
///
/// The `id` is generated by whoever issues the request and echoed unchanged
/// in the response, which is how replies are matched to calls even when they
/// arrive out of order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation identifier.
    pub id: Uuid,
    /// Request or response body.
    pub body: Body,
}

impl Envelope {
    /// Creates a request envelope with a fresh correlation ID.
    pub fn request(payload: impl Into<Vec<u8>>) -> Self {
        Self::request_with_id(Uuid::new_v4(), payload)
    }

    /// Creates a request envelope with the given correlation ID.
    pub fn request_with_id(id: Uuid, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            body: Body::Request {
                payload: payload.into(),
            },
        }
    }

    /// Creates a response envelope answering the request with `id`.
    pub fn response(id: Uuid, result: Response) -> Self {
        Self {
            id,
            body: Body::Response { result },
        }
    }

    /// Builds the success response to this envelope.
    pub fn success_response(&self, payload: Option<Vec<u8>>) -> Self {
        Self::response(self.id, Response::Success { payload })
    }

    /// Builds the failure response to this envelope.
    pub fn failure_response(&self) -> Self {
        Self::response(self.id, Response::Failure)
    }

    /// Returns true if the body is a request.
    pub fn is_request(&self) -> bool {
        matches!(self.body, Body::Request { .. })
    }
}

/// Envelope body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Body {
    /// Opaque application payload, handed as-is to the handler.
    Request {
        #[serde(with = "base64_bytes")]
        payload: Vec<u8>,
    },

    /// Outcome of a previously sent request.
    Response { result: Response },
}

/// Outcome carried by a response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// The request was handled.
    Success {
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "base64_bytes::option"
        )]
        payload: Option<Vec<u8>>,
    },

    /// The remote could not fulfil the request.
    Failure,
}

impl Response {
    /// Creates a success response.
    pub fn success(payload: impl Into<Vec<u8>>) -> Self {
        Self::Success {
            payload: Some(payload.into()),
        }
    }

    /// Creates a success response without payload.
    pub fn empty() -> Self {
        Self::Success { payload: None }
    }

    /// Returns true for [`Response::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl<E> From<Result<Option<Vec<u8>>, E>> for Response {
    fn from(result: Result<Option<Vec<u8>>, E>) -> Self {
        match result {
            Ok(payload) => Self::Success { payload },
            Err(_) => Self::Failure,
        }
    }
}

/// Serde adapter carrying byte payloads as standard base64 strings.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => super::serialize(bytes, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let encoded = Option::<String>::deserialize(deserializer)?;
            encoded
                .map(|s| STANDARD.decode(s.as_bytes()))
                .transpose()
                .map_err(serde::de::Error::custom)
        }
    }
}
