//! A hand-driven envelope peer.

use std::{io, time::Duration};

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{io::DuplexStream, time::timeout};
use tokio_util::codec::Framed;
use toolwire::{
    codec::{CodecError, DEFAULT_MAX_FRAME_LENGTH, LengthPrefixedCodec},
    envelope::{Envelope, MessageType},
    rpc::{RequestId, RpcRequest, RpcResponse},
};

/// How long [`RawPeer::recv`] waits before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// The far end of a session, driven one envelope at a time.
pub struct RawPeer {
    frames: Framed<DuplexStream, LengthPrefixedCodec>,
}

fn invalid(e: impl ToString) -> io::Error { io::Error::new(io::ErrorKind::InvalidData, e.to_string()) }

fn from_codec(e: CodecError) -> io::Error {
    match e {
        CodecError::Io(e) => e,
        other => invalid(other),
    }
}

impl RawPeer {
    #[must_use]
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            frames: Framed::new(stream, LengthPrefixedCodec::new(DEFAULT_MAX_FRAME_LENGTH)),
        }
    }

    /// Write a raw frame payload.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying stream.
    pub async fn send_text(&mut self, text: &str) -> io::Result<()> {
        self.frames.send(text).await.map_err(from_codec)
    }

    /// Encode and write `envelope`.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying stream.
    pub async fn send(&mut self, envelope: &Envelope) -> io::Result<()> {
        let text = envelope.encode().map_err(invalid)?;
        self.send_text(&text).await
    }

    /// Send a request envelope for `method` under `id`.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying stream.
    pub async fn send_request(&mut self, id: &str, method: &str, params: Option<Value>) -> io::Result<()> {
        let request = RpcRequest::new(RequestId::from(id), method, params);
        let jsonrpc = serde_json::to_string(&request).map_err(invalid)?;
        self.send(&Envelope::request(id, jsonrpc)).await
    }

    /// Send a terminal response to `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying stream.
    pub async fn respond(&mut self, correlation_id: &str, response: &RpcResponse) -> io::Result<()> {
        let jsonrpc = serde_json::to_string(response).map_err(invalid)?;
        self.send(&Envelope::response(Some(correlation_id.to_owned()), jsonrpc).with_fin(true))
            .await
    }

    /// Read the next envelope, or `None` once the session has closed the
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::TimedOut`] if nothing arrives within
    /// [`RECV_TIMEOUT`], or an error for undecodable frames.
    pub async fn recv(&mut self) -> io::Result<Option<Envelope>> {
        let next = timeout(RECV_TIMEOUT, self.frames.next())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no envelope received"))?;
        match next {
            None => Ok(None),
            Some(frame) => {
                let text = frame.map_err(from_codec)?;
                Envelope::decode(&text).map(Some).map_err(invalid)
            }
        }
    }

    /// Read envelopes until one of `kind` arrives.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::UnexpectedEof`] if the stream closes first.
    pub async fn recv_kind(&mut self, kind: MessageType) -> io::Result<Envelope> {
        loop {
            match self.recv().await? {
                Some(envelope) if envelope.message_type() == kind => return Ok(envelope),
                Some(_) => {}
                None => return Err(io::ErrorKind::UnexpectedEof.into()),
            }
        }
    }

    /// Read the next response and decode its JSON-RPC body.
    ///
    /// # Errors
    ///
    /// See [`recv_kind`](Self::recv_kind).
    pub async fn recv_response(&mut self) -> io::Result<(Envelope, RpcResponse)> {
        let envelope = self.recv_kind(MessageType::Response).await?;
        let response = serde_json::from_str(envelope.jsonrpc()).map_err(invalid)?;
        Ok((envelope, response))
    }

    /// Read the next request and decode its JSON-RPC body.
    ///
    /// # Errors
    ///
    /// See [`recv_kind`](Self::recv_kind).
    pub async fn recv_request(&mut self) -> io::Result<(Envelope, RpcRequest)> {
        let envelope = self.recv_kind(MessageType::Request).await?;
        let request = serde_json::from_str(envelope.jsonrpc()).map_err(invalid)?;
        Ok((envelope, request))
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// See [`recv_kind`](Self::recv_kind).
    pub async fn call(&mut self, id: &str, method: &str, params: Option<Value>) -> io::Result<RpcResponse> {
        self.send_request(id, method, params).await?;
        let (_, response) = self.recv_response().await?;
        Ok(response)
    }

    /// Whether the session has closed its end of the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if an envelope arrives instead.
    pub async fn expect_closed(&mut self) -> io::Result<()> {
        match self.recv().await? {
            None => Ok(()),
            Some(envelope) => Err(invalid(format!("expected close, got {envelope:?}"))),
        }
    }

    /// Drop the peer's end of the connection.
    pub fn hang_up(self) { drop(self); }
}
