//! Listener side: accepts connections and serves each with a [`Session`].
//!
//! [`ToolServer`] carries a typestate `S` recording whether it has been
//! bound to a TCP listener. New servers start [`Unbound`]; only a [`Bound`]
//! server exposes [`run`](ToolServer::run) and
//! [`run_with_shutdown`](ToolServer::run_with_shutdown). Every accepted
//! connection gets its own session and dispatcher worker sharing one
//! [`RequestHandler`].
//!
//! [`Session`]: crate::session::Session

use std::sync::Arc;

use tokio::{net::TcpListener, sync::oneshot};

use crate::{
    dispatch::RequestHandler,
    session::{SessionConfig, SessionRegistry, WireObserver},
};

/// Tokio-based server hosting a [`RequestHandler`] for every connection.
pub struct ToolServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) handler: Arc<dyn RequestHandler>,
    pub(crate) session_config: SessionConfig,
    pub(crate) backoff: BackoffConfig,
    pub(crate) mode: TransportMode,
    pub(crate) observer: Arc<dyn WireObserver>,
    pub(crate) registry: Arc<SessionRegistry>,
    /// Fires once all accept machinery is running. Single use: a new sender
    /// is needed for each run.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) state: S,
}

/// How accepted sockets carry envelopes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportMode {
    /// Length-prefixed envelope frames.
    #[default]
    Framed,
    /// One JSON-RPC text message per WebSocket message.
    #[cfg(feature = "websocket")]
    WebSocket,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod config;
mod connection;
pub mod error;
mod runtime;

pub use error::ServerError;
pub use runtime::BackoffConfig;

#[cfg(test)]
pub(crate) mod test_util;
