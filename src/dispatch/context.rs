//! Narrow capability handed to request handlers.

use serde_json::{Value, json};
use tracing::debug;

use crate::{
    error::CallError,
    rpc::methods::ELICITATION_CREATE,
    session::{ConnectionId, Session},
};

/// Prompt sent when a write would replace an existing file.
pub const CONFIRM_PROMPT: &str = "File exists. Overwrite?";

/// Schema of a yes/no confirmation form.
#[must_use]
pub fn confirmation_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "confirm": { "type": "boolean" } },
        "required": ["confirm"],
    })
}

/// What a handler may do with the peer while servicing one request.
///
/// Borrowed for the duration of the call, so handlers cannot retain the
/// session.
pub struct CallContext<'a> {
    session: &'a Session,
    request_id: &'a str,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(session: &'a Session, request_id: &'a str) -> Self {
        Self {
            session,
            request_id,
        }
    }

    /// Identifier of the request being serviced.
    #[must_use]
    pub fn request_id(&self) -> &str { self.request_id }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId { self.session.connection_id() }

    #[must_use]
    pub fn session_id(&self) -> String { self.session.session_id() }

    /// Issue a nested request to the peer and wait for its result.
    ///
    /// # Errors
    ///
    /// See [`Session::send_request`].
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, CallError> {
        self.session.send_request(method, params).await
    }

    /// Send a notification to the peer.
    ///
    /// # Errors
    ///
    /// See [`Session::notify`].
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), CallError> {
        self.session.notify(method, params).await
    }

    /// Ask the peer a yes/no question via `elicitation/create`.
    ///
    /// A peer that answers with a JSON-RPC error, or without
    /// `values.confirm`, is treated as declining.
    ///
    /// # Errors
    ///
    /// Returns timeouts and connection failures.
    pub async fn confirm(&self, prompt: &str) -> Result<bool, CallError> {
        let params = json!({ "message": prompt, "schema": confirmation_schema() });
        match self.request(ELICITATION_CREATE, Some(params)).await {
            Ok(answer) => Ok(answer
                .pointer("/values/confirm")
                .and_then(Value::as_bool)
                .unwrap_or(false)),
            Err(CallError::Rpc(error)) => {
                debug!(
                    "confirmation refused by peer: conn={} error={error}",
                    self.connection_id()
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
