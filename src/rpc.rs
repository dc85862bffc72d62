//! JSON-RPC 2.0 message types and protocol constants.
//!
//! These types describe the payload embedded in an
//! [`Envelope`](crate::envelope::Envelope) or sent as a bare text message on
//! the message transport.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// JSON-RPC version string carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal error while servicing the request.
pub const INTERNAL_ERROR: i64 = -32603;

/// Method names used by the tool protocol.
pub mod methods {
    /// Handshake.
    pub const INITIALIZE: &str = "initialize";
    /// Tool catalogue.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Tool invocation.
    pub const TOOLS_CALL: &str = "tools/call";
    /// Peer-originated confirmation prompt.
    pub const ELICITATION_CREATE: &str = "elicitation/create";
}

/// JSON-RPC request identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self { Self::String(value) }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self { Self::String(value.to_owned()) }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self { Self::Number(value) }
}

/// Request or notification. Notifications carry no `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    #[must_use]
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Parse a request, distinguishing unparseable text from a wrong shape.
    ///
    /// # Errors
    ///
    /// Returns a [`PARSE_ERROR`] error for invalid JSON and an
    /// [`INVALID_REQUEST`] error for JSON that is not a request object.
    pub fn parse(text: &str) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RpcError::parse_error().with_data(json!({ "message": e.to_string() })))?;
        serde_json::from_value(value).map_err(|e| {
            RpcError::invalid_request("Invalid Request")
                .with_data(json!({ "message": e.to_string() }))
        })
    }

    /// Whether this message expects a response.
    #[must_use]
    pub fn is_notification(&self) -> bool { self.id.is_none() }
}

/// Response carrying either a result or an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    #[must_use]
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Convert into the call outcome. A missing result reads as `null`.
    ///
    /// # Errors
    ///
    /// Returns the embedded [`RpcError`] when present.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Structured JSON-RPC error object.
#[derive(Clone, Debug, PartialEq, Error, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn parse_error() -> Self { Self::new(PARSE_ERROR, "Parse error") }

    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self { Self::new(INVALID_PARAMS, message) }

    /// Generic internal error with the failure description under
    /// `data.message`.
    #[must_use]
    pub fn internal(detail: impl fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, "Internal error")
            .with_data(json!({ "message": detail.to_string() }))
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_ids_accept_numbers_and_strings() {
        let numeric = RpcRequest::parse(r#"{"jsonrpc":"2.0","id":7,"method":"m"}"#).expect("parse");
        assert_eq!(numeric.id, Some(RequestId::Number(7)));
        let text = RpcRequest::parse(r#"{"jsonrpc":"2.0","id":"cli-1","method":"m"}"#)
            .expect("parse");
        assert_eq!(text.id, Some(RequestId::from("cli-1")));
        assert_eq!(text.id.map(|id| id.to_string()).as_deref(), Some("cli-1"));
    }

    #[test]
    fn parse_distinguishes_bad_json_from_bad_shape() {
        assert_eq!(RpcRequest::parse("{").expect_err("bad json").code, PARSE_ERROR);
        assert_eq!(
            RpcRequest::parse(r#"{"jsonrpc":"2.0","id":1}"#)
                .expect_err("no method")
                .code,
            INVALID_REQUEST
        );
    }

    #[test]
    fn notification_omits_id() {
        let text = serde_json::to_string(&RpcRequest::notification("ping", None)).expect("json");
        assert_eq!(text, r#"{"jsonrpc":"2.0","method":"ping"}"#);
    }

    #[test]
    fn response_into_result() {
        let ok: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"srv-1","result":{"a":1}}"#)
                .expect("json");
        assert_eq!(ok.into_result().expect("result"), json!({"a": 1}));

        let null: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"srv-1","result":null}"#).expect("json");
        assert_eq!(null.into_result().expect("result"), Value::Null);

        let err: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":"srv-1","error":{"code":-32601,"message":"nope"}}"#,
        )
        .expect("json");
        assert_eq!(err.into_result().expect_err("error").code, METHOD_NOT_FOUND);
    }

    #[test]
    fn internal_error_carries_detail() {
        let err = RpcError::internal("disk on fire");
        assert_eq!(err.code, INTERNAL_ERROR);
        assert_eq!(err.data, Some(json!({"message": "disk on fire"})));
    }
}
