//! Failure kinds surfaced to callers of outbound requests.

use std::time::Duration;

use thiserror::Error;

use crate::{rpc::RpcError, transport::TransportError};

/// Why an outbound request did not produce a result.
#[derive(Debug, Error)]
pub enum CallError {
    /// No terminal response arrived within the deadline. The entry has been
    /// evicted and a late response will be discarded.
    #[error("request {id} timed out after {after:?}")]
    Timeout {
        /// Identifier of the abandoned request.
        id: String,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// The session was torn down before the request completed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer answered with a JSON-RPC error.
    #[error("remote error: {0}")]
    Rpc(#[from] RpcError),

    /// Another request with the same identifier is already in flight.
    #[error("request id {0} is already in flight")]
    DuplicateId(String),

    /// The request could not be written.
    #[error("failed to send request: {0}")]
    Transport(#[source] TransportError),

    /// The request parameters could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// The terminal response did not contain a JSON-RPC response.
    #[error("invalid response payload: {0}")]
    InvalidResponse(String),
}

impl From<TransportError> for CallError {
    /// A send refused because the session is closing is reported as
    /// [`CallError::ConnectionClosed`], the same kind teardown gives pending
    /// calls.
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Closed => Self::ConnectionClosed,
            other => Self::Transport(other),
        }
    }
}

impl CallError {
    #[must_use]
    pub fn is_timeout(&self) -> bool { matches!(self, Self::Timeout { .. }) }

    #[must_use]
    pub fn is_connection_closed(&self) -> bool { matches!(self, Self::ConnectionClosed) }

    /// The remote error, when the peer answered with one.
    #[must_use]
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            Self::Rpc(error) => Some(error),
            _ => None,
        }
    }
}
