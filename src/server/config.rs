//! Builder methods and binding for [`ToolServer`].

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use tokio::{net::TcpListener, sync::oneshot};

use super::{BackoffConfig, Bound, ServerError, ServerState, ToolServer, TransportMode, Unbound};
use crate::{
    dispatch::RequestHandler,
    session::{SessionConfig, SessionRegistry, TracingWireObserver, WireObserver},
};

impl ToolServer<Unbound> {
    /// Create an unbound server serving every connection with `handler`.
    ///
    /// Call [`bind`](Self::bind) or
    /// [`bind_existing_listener`](Self::bind_existing_listener) before
    /// running.
    #[must_use]
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            handler,
            session_config: SessionConfig::default(),
            backoff: BackoffConfig::default(),
            mode: TransportMode::default(),
            observer: Arc::new(TracingWireObserver::default()),
            registry: Arc::new(SessionRegistry::default()),
            ready_tx: None,
            state: Unbound,
        }
    }

    /// Bind to `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if binding or configuring the listener
    /// fails.
    pub fn bind(self, addr: SocketAddr) -> Result<ToolServer<Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr)?;
        self.bind_existing_listener(std_listener)
    }

    /// Serve connections from an already bound standard listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be made
    /// non-blocking or registered with Tokio.
    pub fn bind_existing_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<ToolServer<Bound>, ServerError> {
        std_listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(std_listener)?;
        Ok(ToolServer {
            handler: self.handler,
            session_config: self.session_config,
            backoff: self.backoff,
            mode: self.mode,
            observer: self.observer,
            registry: self.registry,
            ready_tx: self.ready_tx,
            state: Bound {
                listener: Arc::new(listener),
            },
        })
    }
}

impl<S> ToolServer<S>
where
    S: ServerState,
{
    /// Session settings applied to every accepted connection.
    #[must_use]
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Back-off applied when `accept()` fails.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    #[must_use]
    pub fn transport_mode(mut self, mode: TransportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Observer shared by every session; defaults to
    /// [`TracingWireObserver`].
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn WireObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Configure a channel used to signal when the server is ready to accept
    /// connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Registry of the sessions this server has accepted.
    #[must_use]
    pub fn registry(&self) -> Arc<SessionRegistry> { Arc::clone(&self.registry) }

    #[must_use]
    pub fn config(&self) -> &SessionConfig { &self.session_config }
}

impl ToolServer<Bound> {
    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.state.listener.local_addr().ok() }
}
