//! Per-connection session.
//!
//! A [`Session`] owns one physical connection. Spawning it starts two tasks:
//!
//! - the read loop, which decodes envelopes, completes outbound calls,
//!   delivers notifications and queues inbound requests;
//! - the dispatcher worker, which runs inbound requests one at a time.
//!
//! Because handlers run on the worker rather than the read loop, a handler
//! may issue a nested [`Session::send_request`] to the same peer and still
//! receive the answer. Sends from any task are serialised by an async mutex
//! around the transport sink.
//!
//! When the read loop ends (peer EOF, fatal transport error or
//! [`Session::close`]) the session tears down: both correlation tables fail
//! their pending entries with [`CallError::ConnectionClosed`], in-flight
//! handlers are cancelled and the transport is closed.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        OnceLock,
        Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::SinkExt;
use serde_json::Value;
use tokio::{
    sync::{Mutex, mpsc},
    task::AbortHandle,
    time::timeout,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    correlation::CorrelationTable,
    dispatch::{self, MethodNotFound, RequestHandler},
    envelope::Envelope,
    error::CallError,
    metrics,
    rpc::{RequestId, RpcRequest, RpcResponse},
    transport::{EnvelopeSink, Transport, TransportError, TransportKind},
};

mod config;
mod counter;
mod observer;
mod reader;
mod registry;
mod state;

pub use config::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_SHUTDOWN_GRACE, SessionConfig};
pub use counter::live_session_count;
pub use observer::{
    DEFAULT_PAYLOAD_PREVIEW,
    LogNotifications,
    NotificationListener,
    SilentWireObserver,
    TracingWireObserver,
    WireObserver,
    truncate,
};
pub use registry::{ConnectionId, SessionRegistry};
pub use state::SessionState;
use state::AtomicState;

/// Which end of the connection this session represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Accepted by a listener; mints the session id.
    Acceptor,
    /// Opened by a dialer; adopts the acceptor's session id.
    Dialer,
}

impl Role {
    const fn request_prefix(self) -> &'static str {
        match self {
            Self::Acceptor => "srv",
            Self::Dialer => "cli",
        }
    }

    const fn session_prefix(self) -> &'static str {
        match self {
            Self::Acceptor => "s",
            Self::Dialer => "c",
        }
    }

    const fn initial_state(self) -> SessionState {
        match self {
            Self::Acceptor => SessionState::Open,
            Self::Dialer => SessionState::Connecting,
        }
    }
}

fn mint_session_id(role: Role) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", role.session_prefix(), hex.get(..8).unwrap_or(&hex))
}

pub(crate) struct SessionInner {
    connection_id: ConnectionId,
    role: Role,
    kind: TransportKind,
    peer_addr: Option<SocketAddr>,
    local_session_id: String,
    peer_session_id: OnceLock<String>,
    seq: AtomicU64,
    next_request: AtomicU64,
    outbound: CorrelationTable<RpcResponse>,
    inbound: CorrelationTable<()>,
    writer: Mutex<EnvelopeSink>,
    state: AtomicState,
    torn_down: AtomicBool,
    shutdown: CancellationToken,
    terminated: CancellationToken,
    tasks: TaskTracker,
    aborts: OnceLock<Vec<AbortHandle>>,
    observer: Arc<dyn WireObserver>,
    config: SessionConfig,
}

/// Configures and spawns a [`Session`].
///
/// # Examples
///
/// ```
/// use toolwire::{
///     session::{Role, Session, SessionConfig},
///     transport,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (stream, _peer) = tokio::io::duplex(4096);
/// let session = Session::builder(Role::Acceptor)
///     .config(SessionConfig::default())
///     .spawn(transport::framed(stream, 1 << 20));
/// assert!(session.session_id().starts_with("s-"));
/// session.close().await;
/// # }
/// ```
pub struct SessionBuilder {
    role: Role,
    config: SessionConfig,
    handler: Arc<dyn RequestHandler>,
    notifications: Arc<dyn NotificationListener>,
    observer: Arc<dyn WireObserver>,
}

impl SessionBuilder {
    /// Start a builder with no request handler, logging notifications and
    /// tracing wire traffic.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            role,
            config: SessionConfig::default(),
            handler: Arc::new(MethodNotFound),
            notifications: Arc::new(LogNotifications),
            observer: Arc::new(TracingWireObserver::default()),
        }
    }

    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Handler for requests originated by the peer.
    #[must_use]
    pub fn request_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Listener for notifications sent by the peer.
    #[must_use]
    pub fn notification_listener(mut self, listener: Arc<dyn NotificationListener>) -> Self {
        self.notifications = listener;
        self
    }

    /// Observer receiving every envelope read or written.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn WireObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Spawn the read loop and dispatcher worker over `transport`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self, transport: Transport) -> Session {
        let Self {
            role,
            config,
            handler,
            notifications,
            observer,
        } = self;
        let kind = transport.kind();
        let peer_addr = transport.peer_addr();
        let Transport { reader, writer, .. } = transport;

        let session = Session {
            inner: Arc::new(SessionInner {
                connection_id: ConnectionId::next(),
                role,
                kind,
                peer_addr,
                local_session_id: mint_session_id(role),
                peer_session_id: OnceLock::new(),
                seq: AtomicU64::new(1),
                next_request: AtomicU64::new(1),
                outbound: CorrelationTable::new(),
                inbound: CorrelationTable::new(),
                writer: Mutex::new(writer),
                state: AtomicState::new(role.initial_state()),
                torn_down: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                terminated: CancellationToken::new(),
                tasks: TaskTracker::new(),
                aborts: OnceLock::new(),
                observer,
                config,
            }),
        };

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let read = session.inner.tasks.spawn(reader::read_loop(
            session.clone(),
            reader,
            queue_tx,
            notifications,
        ));
        let work = session
            .inner
            .tasks
            .spawn(dispatch::run_worker(session.clone(), queue_rx, handler));
        let _ = session
            .inner
            .aborts
            .set(vec![read.abort_handle(), work.abort_handle()]);

        info!(
            "session opened: conn={} role={role:?} session={} peer={peer_addr:?}",
            session.connection_id(),
            session.inner.local_session_id,
        );
        session
    }
}

/// Handle to a live connection. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    #[must_use]
    pub fn builder(role: Role) -> SessionBuilder { SessionBuilder::new(role) }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self { Self { inner } }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> { Arc::downgrade(&self.inner) }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId { self.inner.connection_id }

    #[must_use]
    pub fn role(&self) -> Role { self.inner.role }

    #[must_use]
    pub fn transport_kind(&self) -> TransportKind { self.inner.kind }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.inner.peer_addr }

    /// Session id minted locally when the session was created.
    #[must_use]
    pub fn local_session_id(&self) -> &str { &self.inner.local_session_id }

    /// Session id stamped on outgoing envelopes: the acceptor's id once it
    /// has been learned, the local id before that.
    #[must_use]
    pub fn session_id(&self) -> String {
        self.inner
            .peer_session_id
            .get()
            .unwrap_or(&self.inner.local_session_id)
            .clone()
    }

    #[must_use]
    pub fn state(&self) -> SessionState { self.inner.state.load() }

    #[must_use]
    pub fn is_open(&self) -> bool { self.state().accepts_sends() }

    /// Outbound requests still awaiting a response.
    #[must_use]
    pub fn pending_outbound(&self) -> usize { self.inner.outbound.len() }

    /// Inbound requests still being serviced.
    #[must_use]
    pub fn pending_inbound(&self) -> usize { self.inner.inbound.len() }

    /// Session tasks that have not yet finished.
    #[must_use]
    pub fn live_tasks(&self) -> usize { self.inner.tasks.len() }

    #[must_use]
    pub fn config(&self) -> &SessionConfig { &self.inner.config }

    /// Promote a dialed session from `Connecting` to `Open`.
    pub(crate) fn mark_open(&self) -> bool {
        self.inner
            .state
            .transition(SessionState::Connecting, SessionState::Open)
    }

    pub(crate) fn inbound(&self) -> &CorrelationTable<()> { &self.inner.inbound }

    pub(crate) async fn shutdown_requested(&self) { self.inner.shutdown.cancelled().await; }

    fn next_request_id(&self) -> String {
        let n = self.inner.next_request.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.inner.role.request_prefix())
    }

    /// Send `method` to the peer and wait for its result, using the
    /// configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Rpc`] when the peer answers with an error,
    /// [`CallError::Timeout`] when no terminal response arrives in time and
    /// [`CallError::ConnectionClosed`] when the session tears down first.
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value, CallError> {
        self.send_request_with_timeout(method, params, self.inner.config.request_timeout_value())
            .await
    }

    /// [`send_request`](Self::send_request) with an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`send_request`](Self::send_request).
    pub async fn send_request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        limit: Duration,
    ) -> Result<Value, CallError> {
        let id = self.next_request_id();
        let jsonrpc = serde_json::to_string(&RpcRequest::new(
            RequestId::from(id.as_str()),
            method,
            params,
        ))?;
        let pending = self.inner.outbound.register(id.as_str())?;

        if let Err(e) = self.send_envelope(Envelope::request(id.as_str(), jsonrpc)).await {
            self.inner.outbound.evict(&id);
            return Err(e.into());
        }

        let response = pending
            .wait_for(&self.inner.outbound, limit)
            .await
            .inspect_err(|e| {
                if e.is_timeout() {
                    metrics::inc_call_timeouts();
                    warn!(
                        "request timed out: conn={} id={id} method={method} after={limit:?}",
                        self.connection_id()
                    );
                }
            })?;
        response.into_result().map_err(CallError::from)
    }

    /// Send a notification; no response is expected.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be encoded or written.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), CallError> {
        let jsonrpc = serde_json::to_string(&RpcRequest::notification(method, params))?;
        self.send_envelope(Envelope::notification(jsonrpc)).await?;
        Ok(())
    }

    /// Stamp and write one envelope. Sends are serialised per session.
    pub(crate) async fn send_envelope(&self, envelope: Envelope) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let mut writer = self.inner.writer.lock().await;
        // Sequence numbers are assigned under the lock so they follow wire order.
        let envelope = envelope
            .with_session_id(self.session_id())
            .with_seq(self.inner.seq.fetch_add(1, Ordering::Relaxed));
        self.inner
            .observer
            .on_send(self.inner.connection_id, &envelope);
        match writer.send(envelope).await {
            Ok(()) => {
                metrics::inc_frames(metrics::Direction::Outbound);
                Ok(())
            }
            Err(e) => {
                metrics::inc_errors();
                warn!("write failed: conn={} error={e}", self.connection_id());
                self.inner.shutdown.cancel();
                Err(e)
            }
        }
    }

    /// Close the session and wait for its tasks to stop.
    ///
    /// Idempotent. Tasks still running after the shutdown grace period are
    /// aborted. Must not be awaited from inside a request handler of the same
    /// session.
    pub async fn close(&self) {
        if self.inner.state.begin_closing() {
            debug!("closing session: conn={}", self.connection_id());
        }
        self.inner.shutdown.cancel();
        self.inner.tasks.close();

        let grace = self.inner.config.shutdown_grace_value();
        if timeout(grace, self.inner.tasks.wait()).await.is_err() {
            warn!(
                "session tasks did not stop within {grace:?}; aborting: conn={}",
                self.connection_id()
            );
            for handle in self.inner.aborts.get().into_iter().flatten() {
                handle.abort();
            }
            self.inner.tasks.wait().await;
        }
        self.teardown().await;
    }

    /// Resolves once the session has fully torn down.
    pub async fn closed(&self) { self.inner.terminated.cancelled().await; }

    /// Fail all pending work and release the transport. Runs once.
    pub(crate) async fn teardown(&self) {
        let inner = &self.inner;
        if inner.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.state.begin_closing();
        inner.shutdown.cancel();
        let failed_outbound = inner.outbound.close();
        let failed_inbound = inner.inbound.close();

        let grace = inner.config.shutdown_grace_value();
        let released = timeout(grace, async {
            let mut writer = inner.writer.lock().await;
            let result = writer.close().await;
            *writer = Box::pin(
                futures::sink::drain::<Envelope>()
                    .sink_map_err(|never| -> TransportError { match never {} }),
            );
            result
        })
        .await;
        match released {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("error closing transport: conn={} error={e}", inner.connection_id),
            Err(_) => warn!("timed out closing transport: conn={}", inner.connection_id),
        }

        inner.state.store(SessionState::Closed);
        inner.terminated.cancel();
        info!(
            "session closed: conn={} failed_outbound={failed_outbound} failed_inbound={failed_inbound}",
            inner.connection_id
        );
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.inner.connection_id)
            .field("role", &self.inner.role)
            .field("session_id", &self.session_id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
