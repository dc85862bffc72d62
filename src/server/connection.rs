//! Per-connection task for [`ToolServer`](super::ToolServer).

use std::{net::SocketAddr, sync::Arc};

use futures::FutureExt;
use log::error;
use tokio::net::TcpStream;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::TransportMode;
use crate::{
    dispatch::RequestHandler,
    metrics,
    panic::format_panic,
    session::{Role, Session, SessionConfig, SessionRegistry, WireObserver},
    transport::{self, Transport},
};

/// Everything a connection task needs to build its session.
#[derive(Clone)]
pub(super) struct ConnectionOptions {
    pub handler: Arc<dyn RequestHandler>,
    pub config: SessionConfig,
    pub mode: TransportMode,
    pub observer: Arc<dyn WireObserver>,
    pub registry: Arc<SessionRegistry>,
    pub shutdown: CancellationToken,
}

/// Spawn a task serving one TCP connection, logging and discarding any
/// panics.
pub(super) fn spawn_connection_task(
    stream: TcpStream,
    peer_addr: SocketAddr,
    options: ConnectionOptions,
    tracker: &TaskTracker,
) {
    tracker.spawn(async move {
        let fut = std::panic::AssertUnwindSafe(serve_connection(stream, peer_addr, options))
            .catch_unwind();

        if let Err(panic) = fut.await {
            metrics::inc_errors();
            let panic_msg = format_panic(panic.as_ref());
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("connection task panicked: panic={panic_msg}, peer_addr={peer_addr}");
            tracing::error!(panic = %panic_msg, %peer_addr, "connection task panicked");
        }
    });
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn serve_connection(stream: TcpStream, peer_addr: SocketAddr, options: ConnectionOptions) {
    let ConnectionOptions {
        handler,
        config,
        mode,
        observer,
        registry,
        shutdown,
    } = options;

    let Some(transport) = open_transport(stream, peer_addr, mode, &config).await else {
        return;
    };
    let session = Session::builder(Role::Acceptor)
        .config(config)
        .request_handler(handler)
        .observer(observer)
        .spawn(transport);
    registry.insert(&session);

    tokio::select! {
        () = session.closed() => {}
        () = shutdown.cancelled() => session.close().await,
    }
    registry.remove(&session.connection_id());
}

async fn open_transport(
    stream: TcpStream,
    peer_addr: SocketAddr,
    mode: TransportMode,
    config: &SessionConfig,
) -> Option<Transport> {
    match mode {
        TransportMode::Framed => {
            Some(transport::framed(stream, config.max_frame_length_value()).with_peer_addr(peer_addr))
        }
        #[cfg(feature = "websocket")]
        TransportMode::WebSocket => match tokio_tungstenite::accept_async(stream).await {
            Ok(socket) => Some(transport::websocket(socket).with_peer_addr(peer_addr)),
            Err(e) => {
                tracing::warn!("websocket handshake failed: error={e}, peer_addr={peer_addr}");
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::{SinkExt, StreamExt};
    use rstest::rstest;
    use serde_json::{Value, json};
    use tokio::{
        net::{TcpListener, TcpStream},
        time::{Duration, timeout},
    };
    use tokio_util::codec::Framed;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        codec::LengthPrefixedCodec,
        dispatch::CallContext,
        envelope::Envelope,
        rpc::{RpcError, RpcRequest},
        server::test_util::free_listener,
        session::SilentWireObserver,
    };

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, request: RpcRequest, _ctx: &CallContext<'_>) -> Result<Value, RpcError> {
            Ok(request.params.unwrap_or(Value::Null))
        }
    }

    fn options(shutdown: CancellationToken) -> ConnectionOptions {
        ConnectionOptions {
            handler: Arc::new(Echo),
            config: SessionConfig::default(),
            mode: TransportMode::Framed,
            observer: Arc::new(SilentWireObserver),
            registry: Arc::new(SessionRegistry::default()),
            shutdown,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn connection_task_serves_and_deregisters(free_listener: std::net::TcpListener) {
        free_listener.set_nonblocking(true).expect("nonblocking");
        let listener = TcpListener::from_std(free_listener).expect("listener");
        let addr = listener.local_addr().expect("addr");
        let tracker = TaskTracker::new();
        let options = options(CancellationToken::new());
        let registry = Arc::clone(&options.registry);

        let client = TcpStream::connect(addr).await.expect("connect");
        let (stream, peer) = listener.accept().await.expect("accept");
        spawn_connection_task(stream, peer, options, &tracker);

        let mut framed = Framed::new(client, LengthPrefixedCodec::default());
        let body = json!({"jsonrpc": "2.0", "id": "cli-1", "method": "echo", "params": 7});
        framed
            .send(Envelope::request("cli-1", body.to_string()).encode().expect("encode"))
            .await
            .expect("send");
        let frame = timeout(Duration::from_secs(5), framed.next())
            .await
            .expect("reply in time")
            .expect("open")
            .expect("frame");
        let reply = Envelope::decode(&frame).expect("envelope");
        assert_eq!(reply.correlation_id(), Some("cli-1"));
        assert_eq!(registry.len(), 1);

        drop(framed);
        tracker.close();
        timeout(Duration::from_secs(5), tracker.wait())
            .await
            .expect("connection task finished");
        assert!(registry.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn shutdown_closes_live_connection(free_listener: std::net::TcpListener) {
        free_listener.set_nonblocking(true).expect("nonblocking");
        let listener = TcpListener::from_std(free_listener).expect("listener");
        let addr = listener.local_addr().expect("addr");
        let tracker = TaskTracker::new();
        let token = CancellationToken::new();

        let _client = TcpStream::connect(addr).await.expect("connect");
        let (stream, peer) = listener.accept().await.expect("accept");
        spawn_connection_task(stream, peer, options(token.clone()), &tracker);

        token.cancel();
        tracker.close();
        timeout(Duration::from_secs(5), tracker.wait())
            .await
            .expect("connection task stopped on shutdown");
    }

    #[cfg(feature = "websocket")]
    #[rstest]
    #[traced_test]
    #[tokio::test]
    async fn failed_websocket_handshake_is_logged(free_listener: std::net::TcpListener) {
        free_listener.set_nonblocking(true).expect("nonblocking");
        let listener = TcpListener::from_std(free_listener).expect("listener");
        let addr = listener.local_addr().expect("addr");
        let tracker = TaskTracker::new();
        let mut options = options(CancellationToken::new());
        options.mode = TransportMode::WebSocket;

        let client = TcpStream::connect(addr).await.expect("connect");
        let (stream, peer) = listener.accept().await.expect("accept");
        spawn_connection_task(stream, peer, options, &tracker);
        client.writable().await.expect("writable");
        client.try_write(b"not http\r\n\r\n").expect("write");
        drop(client);

        tracker.close();
        timeout(Duration::from_secs(5), tracker.wait())
            .await
            .expect("task finished");
        assert!(logs_contain("websocket handshake failed"));
    }
}
