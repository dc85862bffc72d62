//! Builder for configuring and connecting a tool client.

use std::sync::Arc;

use serde_json::json;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, ToSocketAddrs},
};
use tracing::{info, warn};

use super::{ClientError, ConfirmationPolicy, ElicitationResponder, ToolClient};
use crate::{
    dispatch::Router,
    rpc::{PROTOCOL_VERSION, methods},
    session::{NotificationListener, Role, Session, SessionConfig, TracingWireObserver, WireObserver},
    transport::{self, Transport},
};

/// Default name sent in the `initialize` request.
pub const DEFAULT_CLIENT_NAME: &str = "toolwire-client";

/// Builder for [`ToolClient`].
///
/// # Examples
///
/// ```
/// use toolwire::client::{ConfirmationPolicy, ToolClientBuilder};
///
/// let builder = ToolClientBuilder::new()
///     .client_name("docs")
///     .confirmation(ConfirmationPolicy::Decline);
/// let _ = builder;
/// ```
pub struct ToolClientBuilder {
    config: SessionConfig,
    policy: ConfirmationPolicy,
    client_name: String,
    observer: Arc<dyn WireObserver>,
    notifications: Option<Arc<dyn NotificationListener>>,
}

impl Default for ToolClientBuilder {
    fn default() -> Self { Self::new() }
}

impl ToolClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            policy: ConfirmationPolicy::default(),
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            observer: Arc::new(TracingWireObserver::default()),
            notifications: None,
        }
    }

    #[must_use]
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// How confirmation prompts from the host are answered. Defaults to
    /// accepting them.
    #[must_use]
    pub fn confirmation(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Answer confirmation prompts with `f`.
    #[must_use]
    pub fn confirm_with(self, f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.confirmation(ConfirmationPolicy::ask(f))
    }

    #[must_use]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn WireObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn notification_listener(mut self, listener: Arc<dyn NotificationListener>) -> Self {
        self.notifications = Some(listener);
        self
    }

    /// Connect over TCP using length-prefixed frames.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the connection cannot be opened and
    /// [`ClientError::Handshake`] if `initialize` fails.
    pub async fn connect(self, addr: impl ToSocketAddrs) -> Result<ToolClient, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        let transport = transport::framed(stream, self.config.max_frame_length_value())
            .with_peer_addr(peer_addr);
        self.connect_transport(transport).await
    }

    /// Connect over an already established byte stream using
    /// length-prefixed frames.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Handshake`] if `initialize` fails.
    pub async fn connect_stream<S>(self, stream: S) -> Result<ToolClient, ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let transport = transport::framed(stream, self.config.max_frame_length_value());
        self.connect_transport(transport).await
    }

    /// Connect to a WebSocket endpoint such as `ws://127.0.0.1:7071`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::WebSocket`] if the upgrade fails and
    /// [`ClientError::Handshake`] if `initialize` fails.
    #[cfg(feature = "websocket")]
    pub async fn connect_websocket(self, url: &str) -> Result<ToolClient, ClientError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url).await?;
        self.connect_transport(transport::websocket(socket)).await
    }

    /// Spawn the session over `transport` and perform the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Handshake`] if `initialize` fails; the session
    /// is closed before returning.
    pub async fn connect_transport(self, transport: Transport) -> Result<ToolClient, ClientError> {
        let Self {
            config,
            policy,
            client_name,
            observer,
            notifications,
        } = self;
        let router = Router::new()
            .route(methods::ELICITATION_CREATE, ElicitationResponder::new(policy))
            .map_err(|e| ClientError::InvalidResult(e.to_string()))?;
        let mut builder = Session::builder(Role::Dialer)
            .config(config)
            .request_handler(Arc::new(router))
            .observer(observer);
        if let Some(listener) = notifications {
            builder = builder.notification_listener(listener);
        }
        let session = builder.spawn(transport);

        let params = json!({ "clientName": client_name, "protocolVersion": PROTOCOL_VERSION });
        let server_info = match session.send_request(methods::INITIALIZE, Some(params)).await {
            Ok(info) => info,
            Err(e) => {
                warn!("handshake failed: conn={} error={e}", session.connection_id());
                session.close().await;
                return Err(ClientError::Handshake(e));
            }
        };
        session.mark_open();
        info!(
            "connected: conn={} session={} protocol={}",
            session.connection_id(),
            session.session_id(),
            server_info["protocolVersion"]
        );
        Ok(ToolClient::new(session, server_info))
    }
}
