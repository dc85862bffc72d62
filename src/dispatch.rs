//! Inbound request dispatch.
//!
//! Each session runs one dispatcher worker that takes queued request
//! envelopes in arrival order and runs them against the session's
//! [`RequestHandler`]. Every request receives exactly one terminal response:
//! the handler's result, its [`RpcError`], or an internal error if it panics.
//! A handler still running when the session tears down is cancelled.
//!
//! The read loop registers each request id on the inbound table before
//! queueing it, so a request reusing an id that is still queued or running
//! is rejected with `-32600` instead of being run twice.

use std::{collections::HashMap, future::Future, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, warn};

use crate::{
    correlation::PendingCall,
    envelope::Envelope,
    metrics,
    panic::format_panic,
    rpc::{RequestId, RpcError, RpcRequest, RpcResponse},
    session::Session,
};

mod context;

pub use context::{CONFIRM_PROMPT, CallContext, confirmation_schema};

/// A request handed from the read loop to the dispatcher worker.
pub(crate) struct Queued {
    pub(crate) envelope: Envelope,
    /// Inbound registration made when the request was read; `None` for
    /// envelopes that are only answered with an error.
    pub(crate) pending: Option<PendingCall<()>>,
}

/// Services requests originated by the peer.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the result for `request`.
    ///
    /// `ctx` allows nested calls back to the peer for the duration of the
    /// request only.
    async fn handle(&self, request: RpcRequest, ctx: &CallContext<'_>) -> Result<Value, RpcError>;
}

/// Handler that rejects every method.
#[derive(Clone, Copy, Debug, Default)]
pub struct MethodNotFound;

#[async_trait]
impl RequestHandler for MethodNotFound {
    async fn handle(&self, request: RpcRequest, _ctx: &CallContext<'_>) -> Result<Value, RpcError> {
        Err(RpcError::method_not_found(&request.method))
    }
}

/// Handles one method of a [`Router`].
#[async_trait]
pub trait MethodHandler: Send + Sync + 'static {
    async fn call(&self, params: Option<Value>, ctx: &CallContext<'_>) -> Result<Value, RpcError>;
}

/// [`MethodHandler`] built from an async closure that needs no callbacks.
pub struct FnHandler<F>(F);

/// Wrap `f` as a [`MethodHandler`].
///
/// ```
/// use serde_json::json;
/// use toolwire::{
///     dispatch::{Router, handler_fn},
///     rpc::RpcError,
/// };
///
/// let router = Router::new()
///     .route(
///         "ping",
///         handler_fn(|_params| async { Ok::<_, RpcError>(json!("pong")) }),
///     )
///     .unwrap();
/// assert!(router.contains("ping"));
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    async fn call(&self, params: Option<Value>, _ctx: &CallContext<'_>) -> Result<Value, RpcError> {
        (self.0)(params).await
    }
}

/// A method name was registered twice.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("method {0} was already registered")]
pub struct DuplicateMethod(pub String);

/// Routes requests to a [`MethodHandler`] by method name.
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<String, Arc<dyn MethodHandler>>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `handler` for `method`.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateMethod`] if `method` already has a handler.
    pub fn route(
        mut self,
        method: impl Into<String>,
        handler: impl MethodHandler,
    ) -> Result<Self, DuplicateMethod> {
        let method = method.into();
        if self.routes.contains_key(&method) {
            return Err(DuplicateMethod(method));
        }
        self.routes.insert(method, Arc::new(handler));
        Ok(self)
    }

    #[must_use]
    pub fn contains(&self, method: &str) -> bool { self.routes.contains_key(method) }
}

#[async_trait]
impl RequestHandler for Router {
    async fn handle(&self, request: RpcRequest, ctx: &CallContext<'_>) -> Result<Value, RpcError> {
        match self.routes.get(&request.method) {
            Some(handler) => handler.call(request.params, ctx).await,
            None => Err(RpcError::method_not_found(&request.method)),
        }
    }
}

/// Dispatcher worker: serve queued requests until the session shuts down.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub(crate) async fn run_worker(
    session: Session,
    mut queue: UnboundedReceiver<Queued>,
    handler: Arc<dyn RequestHandler>,
) {
    loop {
        let queued = tokio::select! {
            biased;
            () = session.shutdown_requested() => break,
            next = queue.recv() => match next {
                Some(queued) => queued,
                None => break,
            },
        };
        serve(&session, queued, handler.as_ref()).await;
    }
    debug!("dispatcher stopped: conn={}", session.connection_id());
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn serve(session: &Session, queued: Queued, handler: &dyn RequestHandler) {
    let conn = session.connection_id();
    let Queued { envelope, pending } = queued;
    let Some(request_id) = envelope.request_id().map(str::to_owned) else {
        warn!("dropping request without request id: conn={conn}");
        return;
    };
    let fallback_id = Some(RequestId::from(request_id.as_str()));

    // Only well-typed requests are registered; anything else is rejected.
    let Some(pending) = pending else {
        let error = RpcError::invalid_request("Invalid JSON-RPC message");
        reply(session, &request_id, RpcResponse::failure(fallback_id, error)).await;
        return;
    };
    let request = match RpcRequest::parse(envelope.jsonrpc()) {
        Ok(request) => request,
        Err(error) => {
            session.inbound().complete(&request_id, Ok(()));
            metrics::inc_errors();
            warn!("rejecting malformed request: conn={conn} id={request_id} error={error}");
            reply(session, &request_id, RpcResponse::failure(fallback_id, error)).await;
            return;
        }
    };
    let reply_id = request.id.clone().or(fallback_id);

    let method = request.method.clone();
    let ctx = CallContext::new(session, &request_id);
    let outcome = tokio::select! {
        outcome = AssertUnwindSafe(handler.handle(request, &ctx)).catch_unwind() => outcome,
        _ = pending.wait() => {
            debug!("abandoning request on teardown: conn={conn} id={request_id} method={method}");
            return;
        }
    };
    session.inbound().complete(&request_id, Ok(()));

    let response = match outcome {
        Ok(Ok(result)) => RpcResponse::success(reply_id, result),
        Ok(Err(error)) => {
            debug!("handler failed: conn={conn} id={request_id} method={method} error={error}");
            RpcResponse::failure(reply_id, error)
        }
        Err(panic) => {
            metrics::inc_handler_panics();
            let message = format_panic(panic.as_ref());
            error!("handler panicked: conn={conn} id={request_id} method={method} panic={message}");
            RpcResponse::failure(reply_id, RpcError::internal(message))
        }
    };
    reply(session, &request_id, response).await;
}

pub(crate) async fn reply(session: &Session, request_id: &str, response: RpcResponse) {
    let jsonrpc = match serde_json::to_string(&response) {
        Ok(text) => text,
        Err(e) => {
            error!("failed to encode response: conn={} id={request_id} error={e}", session.connection_id());
            return;
        }
    };
    let envelope = Envelope::response(Some(request_id.to_owned()), jsonrpc);
    if let Err(e) = session.send_envelope(envelope).await {
        debug!(
            "could not deliver response: conn={} id={request_id} error={e}",
            session.connection_id()
        );
    }
}
