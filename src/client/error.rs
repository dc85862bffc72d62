//! Error types for tool client operations.

use std::io;

use crate::error::CallError;

/// Errors emitted by [`ToolClient`](super::ToolClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Establishing the connection failed.
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    /// The WebSocket handshake failed.
    #[cfg(feature = "websocket")]
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// The `initialize` handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(#[source] CallError),
    /// A call to the host failed.
    #[error(transparent)]
    Call(#[from] CallError),
    /// The host answered with a result of an unexpected shape.
    #[error("unexpected result: {0}")]
    InvalidResult(String),
}
