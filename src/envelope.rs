//! Routing wrapper around one JSON-RPC payload.
//!
//! An [`Envelope`] carries session identity, message kind and correlation
//! metadata next to the embedded JSON-RPC text. The payload is kept as an
//! un-reparsed string so intermediaries can route without understanding it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of message carried by an [`Envelope`].
///
/// Values other than the three known kinds decode as [`MessageType::Unknown`]
/// so that a newer peer cannot crash the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum MessageType {
    /// Expects a correlated response.
    Request,
    /// Answers a request.
    Response,
    /// Fire and forget.
    Notification,
    /// Unrecognised kind.
    Unknown,
}

impl MessageType {
    /// Wire name of the message type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Notification => "notification",
            Self::Unknown => "unknown",
        }
    }
}

impl From<String> for MessageType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "request" => Self::Request,
            "response" => Self::Response,
            "notification" => Self::Notification,
            _ => Self::Unknown,
        }
    }
}

impl From<MessageType> for &'static str {
    fn from(value: MessageType) -> Self { value.as_str() }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

const fn default_seq() -> u64 { 1 }

/// Envelope exchanged on the stream transport.
///
/// Exactly one of `request_id` and `correlation_id` is meaningful, selected
/// by [`Envelope::message_type`].
///
/// # Examples
///
/// ```
/// use toolwire::envelope::{Envelope, MessageType};
///
/// let env = Envelope::request("cli-1", r#"{"jsonrpc":"2.0","id":"cli-1","method":"initialize"}"#);
/// assert_eq!(env.message_type(), MessageType::Request);
/// let text = env.encode().unwrap();
/// assert!(text.contains("\"requestId\":\"cli-1\""));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(default = "default_seq")]
    seq: u64,
    #[serde(default)]
    fin: bool,
    jsonrpc: String,
}

impl Envelope {
    fn new(message_type: MessageType, jsonrpc: String) -> Self {
        Self {
            session_id: None,
            message_type,
            request_id: None,
            correlation_id: None,
            seq: default_seq(),
            fin: false,
            jsonrpc,
        }
    }

    /// Build a request envelope for `request_id`.
    #[must_use]
    pub fn request(request_id: impl Into<String>, jsonrpc: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Self::new(MessageType::Request, jsonrpc.into())
        }
    }

    /// Build a terminal response envelope answering `correlation_id`.
    #[must_use]
    pub fn response(correlation_id: Option<String>, jsonrpc: impl Into<String>) -> Self {
        Self {
            correlation_id,
            fin: true,
            ..Self::new(MessageType::Response, jsonrpc.into())
        }
    }

    /// Build a notification envelope.
    #[must_use]
    pub fn notification(jsonrpc: impl Into<String>) -> Self {
        Self::new(MessageType::Notification, jsonrpc.into())
    }

    /// Build an envelope of unrecognised kind, optionally carrying a request id.
    #[must_use]
    pub fn unknown(request_id: Option<String>, jsonrpc: impl Into<String>) -> Self {
        Self {
            request_id,
            ..Self::new(MessageType::Unknown, jsonrpc.into())
        }
    }

    /// Replace the session id.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Replace the sequence number.
    #[must_use]
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    /// Replace the terminal flag.
    #[must_use]
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> { self.session_id.as_deref() }

    #[must_use]
    pub fn message_type(&self) -> MessageType { self.message_type }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> { self.request_id.as_deref() }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> { self.correlation_id.as_deref() }

    #[must_use]
    pub fn seq(&self) -> u64 { self.seq }

    /// Whether this response completes its correlation id.
    #[must_use]
    pub fn fin(&self) -> bool { self.fin }

    /// Embedded JSON-RPC text.
    #[must_use]
    pub fn jsonrpc(&self) -> &str { &self.jsonrpc }

    /// Consume the envelope, returning the embedded JSON-RPC text.
    #[must_use]
    pub fn into_jsonrpc(self) -> String { self.jsonrpc }

    /// Serialize to the JSON wire form.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` serialization failures.
    pub fn encode(&self) -> Result<String, serde_json::Error> { serde_json::to_string(self) }

    /// Parse the JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not a JSON envelope.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> { serde_json::from_str(text) }
}
