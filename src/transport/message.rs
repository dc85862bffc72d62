//! Message-oriented transport: one JSON-RPC text per message, no envelope.
//!
//! Session identity is the physical connection, so inbound messages are
//! classified into envelopes locally:
//!
//! | shape | kind |
//! |---|---|
//! | `method` and `id` | request |
//! | `method` only | notification |
//! | `result` or `error` | response |
//! | anything else | unknown (answered with `-32600` when an `id` is present) |

use serde_json::Value;

use super::TransportError;
use crate::envelope::Envelope;

/// Render a JSON-RPC `id` as a correlation key.
fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Classify one JSON-RPC text message.
///
/// # Errors
///
/// Returns [`TransportError::Malformed`] when the text is not a JSON object.
///
/// # Examples
///
/// ```
/// use toolwire::{envelope::MessageType, transport::message::classify};
///
/// let env = classify(r#"{"jsonrpc":"2.0","id":4,"result":{}}"#).unwrap();
/// assert_eq!(env.message_type(), MessageType::Response);
/// assert_eq!(env.correlation_id(), Some("4"));
/// ```
pub fn classify(text: &str) -> Result<Envelope, TransportError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| TransportError::Malformed(e.to_string()))?;
    let Value::Object(map) = &value else {
        return Err(TransportError::Malformed(
            "JSON-RPC message is not an object".to_owned(),
        ));
    };

    let id = map.get("id").and_then(id_key);
    let envelope = if map.contains_key("method") {
        match id {
            Some(id) => Envelope::request(id, text),
            None => Envelope::notification(text),
        }
    } else if map.contains_key("result") || map.contains_key("error") {
        Envelope::response(id, text)
    } else {
        Envelope::unknown(id, text)
    };
    Ok(envelope)
}

#[cfg(feature = "websocket")]
mod ws {
    use futures::{SinkExt, StreamExt, future};
    use tokio::io::{AsyncRead, AsyncWrite};
    use tokio_tungstenite::{
        WebSocketStream,
        tungstenite::{self, Message},
    };

    use super::classify;
    use crate::{
        envelope::Envelope,
        transport::{Transport, TransportError, TransportKind},
    };

    fn decode(
        message: Result<Message, tungstenite::Error>,
    ) -> Option<Result<Envelope, TransportError>> {
        match message {
            Ok(Message::Text(text)) => Some(classify(&text)),
            Ok(Message::Binary(bytes)) => Some(
                String::from_utf8(bytes)
                    .map_err(|_| {
                        TransportError::Malformed("binary message is not UTF-8".to_owned())
                    })
                    .and_then(|text| classify(&text)),
            ),
            // Control frames are answered by tungstenite itself.
            Ok(_) => None,
            Err(e) => Some(Err(e.into())),
        }
    }

    /// Message transport over an established WebSocket.
    pub fn websocket<S>(socket: WebSocketStream<S>) -> Transport
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = socket.split();
        let reader = stream
            .filter_map(|message| future::ready(decode(message)))
            .boxed();
        let writer = sink.with(|envelope: Envelope| {
            future::ready(Ok::<_, TransportError>(Message::Text(envelope.into_jsonrpc())))
        });
        Transport::new(reader, Box::pin(writer), TransportKind::Message)
    }
}

#[cfg(feature = "websocket")]
pub use ws::websocket;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::envelope::MessageType;

    #[rstest]
    #[case::request(r#"{"jsonrpc":"2.0","id":"a","method":"m"}"#, MessageType::Request)]
    #[case::notification(r#"{"jsonrpc":"2.0","method":"m"}"#, MessageType::Notification)]
    #[case::result(r#"{"jsonrpc":"2.0","id":1,"result":null}"#, MessageType::Response)]
    #[case::error(
        r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"x"}}"#,
        MessageType::Response
    )]
    #[case::neither(r#"{"jsonrpc":"2.0","id":1}"#, MessageType::Unknown)]
    fn classifies_by_shape(#[case] text: &str, #[case] expected: MessageType) {
        let env = classify(text).expect("classify");
        assert_eq!(env.message_type(), expected);
        assert_eq!(env.jsonrpc(), text);
    }

    #[test]
    fn request_ids_become_request_keys() {
        let env = classify(r#"{"jsonrpc":"2.0","id":12,"method":"m"}"#).expect("classify");
        assert_eq!(env.request_id(), Some("12"));
        assert!(env.correlation_id().is_none());
    }

    #[test]
    fn unknown_shape_keeps_id_for_error_reply() {
        let env = classify(r#"{"id":"q"}"#).expect("classify");
        assert_eq!(env.request_id(), Some("q"));
    }

    #[rstest]
    #[case("not json")]
    #[case("[1,2]")]
    #[case("\"text\"")]
    fn rejects_non_objects(#[case] text: &str) {
        let err = classify(text).expect_err("malformed");
        assert!(!err.is_fatal());
    }
}
