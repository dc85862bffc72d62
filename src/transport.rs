//! Transports carrying envelopes between peers.
//!
//! A [`Transport`] is a boxed stream of inbound envelopes paired with a boxed
//! sink for outbound ones. The session drives either variant identically:
//!
//! - [`framed`] wraps any byte stream in the length-prefixed codec with one
//!   JSON [`Envelope`] per frame.
//! - [`websocket`] (feature `websocket`) carries one bare JSON-RPC text
//!   message per WebSocket message and classifies it into an envelope.

use std::{net::SocketAddr, pin::Pin};

use futures::{SinkExt, StreamExt, future, sink::Sink, stream::BoxStream};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::{
    codec::{CodecError, LengthPrefixedCodec},
    envelope::Envelope,
};

pub mod message;

#[cfg(feature = "websocket")]
pub use message::websocket;

/// Failure reading or writing envelopes.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Framing or I/O failure on the byte stream.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A message arrived intact but could not be interpreted.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// WebSocket protocol or I/O failure.
    #[cfg(feature = "websocket")]
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The session is no longer open.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Whether the connection must be torn down.
    ///
    /// Only malformed messages are survivable; framing and I/O errors leave
    /// the stream unusable.
    #[must_use]
    pub fn is_fatal(&self) -> bool { !matches!(self, Self::Malformed(_)) }
}

/// Inbound half of a transport.
pub type EnvelopeStream = BoxStream<'static, Result<Envelope, TransportError>>;

/// Outbound half of a transport.
pub type EnvelopeSink = Pin<Box<dyn Sink<Envelope, Error = TransportError> + Send>>;

/// Wire flavour of a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Length-prefixed envelopes.
    Framed,
    /// One JSON-RPC text message per WebSocket message.
    Message,
}

/// Envelope stream and sink for one physical connection.
pub struct Transport {
    pub(crate) reader: EnvelopeStream,
    pub(crate) writer: EnvelopeSink,
    kind: TransportKind,
    peer_addr: Option<SocketAddr>,
}

impl Transport {
    /// Assemble a transport from pre-built halves.
    #[must_use]
    pub fn new(reader: EnvelopeStream, writer: EnvelopeSink, kind: TransportKind) -> Self {
        Self {
            reader,
            writer,
            kind,
            peer_addr: None,
        }
    }

    /// Record the remote address for diagnostics.
    #[must_use]
    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    #[must_use]
    pub fn kind(&self) -> TransportKind { self.kind }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.peer_addr }
}

fn malformed(err: &serde_json::Error) -> TransportError { TransportError::Malformed(err.to_string()) }

/// Length-prefixed envelope transport over any byte stream.
///
/// # Examples
///
/// ```
/// use toolwire::transport::{self, TransportKind};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (stream, _peer) = tokio::io::duplex(1024);
/// let transport = transport::framed(stream, 1 << 20);
/// assert_eq!(transport.kind(), TransportKind::Framed);
/// # }
/// ```
pub fn framed<S>(stream: S, max_frame_length: usize) -> Transport
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let codec = LengthPrefixedCodec::new(max_frame_length);
    let (read_half, write_half) = tokio::io::split(stream);

    let reader = FramedRead::new(read_half, codec)
        .map(|frame| {
            let text = frame?;
            Envelope::decode(&text).map_err(|e| malformed(&e))
        })
        .boxed();

    let writer = FramedWrite::new(write_half, codec)
        .with(|envelope: Envelope| future::ready(envelope.encode().map_err(|e| malformed(&e))));

    Transport::new(reader, Box::pin(writer), TransportKind::Framed)
}
