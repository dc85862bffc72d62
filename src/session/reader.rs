//! Session read loop and inbound routing.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::{Role, Session, counter::LiveSession};
use crate::{
    dispatch::{self, Queued},
    envelope::{Envelope, MessageType},
    error::CallError,
    metrics,
    rpc::{RequestId, RpcError, RpcRequest, RpcResponse},
    session::NotificationListener,
    transport::EnvelopeStream,
};

/// Read envelopes until EOF, a fatal error or shutdown, then tear down.
///
/// The loop only suspends on the transport; routing never awaits.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub(super) async fn read_loop(
    session: Session,
    mut reader: EnvelopeStream,
    queue: UnboundedSender<Queued>,
    notifications: Arc<dyn NotificationListener>,
) {
    let _live = LiveSession::enter();
    let conn = session.connection_id();
    loop {
        let next = tokio::select! {
            biased;
            () = session.shutdown_requested() => break,
            next = reader.next() => next,
        };
        match next {
            None => {
                debug!("peer closed the connection: conn={conn}");
                break;
            }
            Some(Ok(envelope)) => session.route(envelope, &queue, notifications.as_ref()),
            Some(Err(e)) if e.is_fatal() => {
                metrics::inc_errors();
                warn!("read failed; closing session: conn={conn} error={e}");
                break;
            }
            Some(Err(e)) => {
                metrics::inc_errors();
                warn!("dropping undecodable message: conn={conn} error={e}");
            }
        }
    }
    drop(reader);
    session.teardown().await;
}

impl Session {
    fn route(
        &self,
        envelope: Envelope,
        queue: &UnboundedSender<Queued>,
        notifications: &dyn NotificationListener,
    ) {
        let conn = self.connection_id();
        metrics::inc_frames(metrics::Direction::Inbound);
        self.inner.observer.on_receive(conn, &envelope);
        self.adopt_session_id(&envelope);

        match envelope.message_type() {
            MessageType::Response => self.complete_outbound(&envelope),
            MessageType::Notification => match RpcRequest::parse(envelope.jsonrpc()) {
                Ok(notification) => notifications.on_notification(conn, notification),
                Err(e) => warn!("dropping malformed notification: conn={conn} error={e}"),
            },
            MessageType::Request => self.accept_request(envelope, queue),
            MessageType::Unknown if envelope.request_id().is_some() => {
                warn!("unrecognised message type; rejecting: conn={conn}");
                self.enqueue(
                    Queued {
                        envelope,
                        pending: None,
                    },
                    queue,
                );
            }
            MessageType::Unknown => warn!("dropping unrecognised message: conn={conn}"),
        }
    }

    fn adopt_session_id(&self, envelope: &Envelope) {
        if self.inner.role == Role::Dialer
            && let Some(id) = envelope.session_id()
            && self.inner.peer_session_id.set(id.to_owned()).is_ok()
        {
            debug!("adopted session id: conn={} session={id}", self.connection_id());
        }
    }

    /// Register the request on the inbound table, then queue it.
    fn accept_request(&self, envelope: Envelope, queue: &UnboundedSender<Queued>) {
        let conn = self.connection_id();
        let Some(id) = envelope.request_id().map(str::to_owned) else {
            warn!("dropping request without request id: conn={conn}");
            return;
        };
        match self.inner.inbound.register(id.as_str()) {
            Ok(pending) => self.enqueue(
                Queued {
                    envelope,
                    pending: Some(pending),
                },
                queue,
            ),
            Err(CallError::DuplicateId(_)) => {
                metrics::inc_errors();
                warn!("rejecting request with an id already in flight: conn={conn} id={id}");
                self.reject_duplicate(id, &envelope);
            }
            Err(_) => debug!("session closing; dropping request: conn={conn} id={id}"),
        }
    }

    /// Answer a reused request id with `-32600` without waiting for the
    /// dispatcher, which may still be running the original.
    fn reject_duplicate(&self, id: String, envelope: &Envelope) {
        let reply_id = RpcRequest::parse(envelope.jsonrpc())
            .ok()
            .and_then(|request| request.id)
            .unwrap_or_else(|| RequestId::from(id.as_str()));
        let error = RpcError::invalid_request(format!("Duplicate request id: {id}"));
        let response = RpcResponse::failure(Some(reply_id), error);
        let session = self.clone();
        self.inner.tasks.spawn(async move {
            dispatch::reply(&session, &id, response).await;
        });
    }

    fn enqueue(&self, queued: Queued, queue: &UnboundedSender<Queued>) {
        if queue.send(queued).is_err() {
            debug!(
                "dispatcher stopped; dropping request: conn={}",
                self.connection_id()
            );
        }
    }

    fn complete_outbound(&self, envelope: &Envelope) {
        let conn = self.connection_id();
        let Some(id) = envelope.correlation_id() else {
            warn!("dropping response without correlation id: conn={conn}");
            return;
        };
        if !envelope.fin() {
            info!("non-terminal response; request left pending: conn={conn} corr={id}");
            return;
        }
        let outcome = serde_json::from_str::<RpcResponse>(envelope.jsonrpc())
            .map_err(|e| CallError::InvalidResponse(e.to_string()));
        if !self.inner.outbound.complete(id, outcome) {
            warn!("discarding response with no pending request: conn={conn} corr={id}");
        }
    }
}
