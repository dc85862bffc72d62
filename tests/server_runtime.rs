//! End-to-end runs of a tool server and client over TCP.

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::{Arc, Mutex},
};

use rstest::rstest;
use tokio::{sync::oneshot, task::JoinHandle};
use toolwire::{
    ClientError,
    client::{ConfirmationPolicy, ToolClient},
    server::{ServerError, ToolServer, TransportMode},
    session::{SessionRegistry, SilentWireObserver},
};
use toolwire_testing::{FileHost, file_host, free_listener, wait_until, within};

struct Running {
    addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl Running {
    async fn stop(self) {
        let _ = self.stop.send(());
        within(self.handle)
            .await
            .expect("join server")
            .expect("server run");
    }
}

async fn start(host: &FileHost, listener: StdTcpListener, mode: TransportMode) -> Running {
    let (ready_tx, ready_rx) = oneshot::channel();
    let server = ToolServer::new(host.handler())
        .transport_mode(mode)
        .observer(Arc::new(SilentWireObserver))
        .ready_signal(ready_tx)
        .bind_existing_listener(listener)
        .expect("bind");
    let addr = server.local_addr().expect("addr");
    let registry = server.registry();
    let (stop, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_with_shutdown(async {
        let _ = stop_rx.await;
    }));
    within(ready_rx).await.expect("ready");
    Running {
        addr,
        registry,
        stop,
        handle,
    }
}

async fn connect(addr: SocketAddr, policy: ConfirmationPolicy) -> ToolClient {
    ToolClient::builder()
        .observer(Arc::new(SilentWireObserver))
        .confirmation(policy)
        .connect(addr)
        .await
        .expect("connect")
}

#[rstest]
#[tokio::test]
async fn client_drives_every_file_tool(file_host: FileHost, free_listener: StdTcpListener) {
    let server = start(&file_host, free_listener, TransportMode::Framed).await;
    let client = connect(server.addr, ConfirmationPolicy::Accept).await;
    assert!(client.session_id().starts_with("s-"));

    let created = client.write_text("docs/a.txt", "alpha", false).await.expect("write");
    assert_eq!(created["status"], "created");

    let listing = client.list_files("docs").await.expect("list");
    assert_eq!(listing["entries"][0]["path"], "docs/a.txt");
    assert_eq!(listing["entries"][0]["type"], "file");

    let read = client.read_text("docs/a.txt").await.expect("read");
    assert_eq!(read["content"], "alpha");

    let updated = client.write_text("docs/a.txt", "beta", false).await.expect("overwrite");
    assert_eq!(updated["status"], "updated");

    let deleted = client.delete_file("docs/a.txt", false).await.expect("delete");
    assert_eq!(deleted["status"], "deleted");
    assert!(!file_host.path("docs/a.txt").exists());

    let missing = client.read_text("docs/a.txt").await.expect("read missing");
    assert_eq!(missing["content"], "<missing>");

    client.close().await;
    server.stop().await;
}

#[rstest]
#[tokio::test]
async fn confirmation_callback_sees_the_prompt(file_host: FileHost, free_listener: StdTcpListener) {
    std::fs::write(file_host.path("keep.txt"), "keep").expect("seed");
    let server = start(&file_host, free_listener, TransportMode::Framed).await;
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&prompts);
    let client = connect(
        server.addr,
        ConfirmationPolicy::ask(move |message| {
            seen.lock().expect("prompts").push(message.to_owned());
            false
        }),
    )
    .await;

    let result = client.delete_file("keep.txt", false).await.expect("delete");
    assert_eq!(result["status"], "skipped");
    assert!(file_host.path("keep.txt").exists());
    assert_eq!(*prompts.lock().expect("prompts"), ["Delete keep.txt?"]);

    let forced = client.delete_file("keep.txt", true).await.expect("force");
    assert_eq!(forced["status"], "deleted");
    assert_eq!(prompts.lock().expect("prompts").len(), 1);

    client.close().await;
    server.stop().await;
}

#[rstest]
#[tokio::test]
async fn sessions_are_tracked_and_closed_on_shutdown(file_host: FileHost, free_listener: StdTcpListener) {
    let server = start(&file_host, free_listener, TransportMode::Framed).await;
    let first = connect(server.addr, ConfirmationPolicy::Accept).await;
    let second = connect(server.addr, ConfirmationPolicy::Accept).await;
    assert_ne!(first.session_id(), second.session_id());

    let registry = Arc::clone(&server.registry);
    assert!(wait_until(|| registry.len() == 2).await);

    first.close().await;
    assert!(wait_until(|| registry.len() == 1).await);

    server.stop().await;
    within(second.session().closed()).await;
    assert!(registry.is_empty());

    assert!(!second.session().is_open());
    let err = second.list_tools().await.expect_err("closed");
    assert!(matches!(err, ClientError::Call(_)), "unexpected error: {err}");
}

#[rstest]
#[tokio::test]
async fn client_reports_refused_connection(free_listener: StdTcpListener) {
    let addr = free_listener.local_addr().expect("addr");
    drop(free_listener);
    let err = ToolClient::builder()
        .observer(Arc::new(SilentWireObserver))
        .connect(addr)
        .await
        .expect_err("refused");
    assert!(matches!(err, ClientError::Io(_)), "unexpected error: {err}");
}

#[cfg(feature = "websocket")]
#[rstest]
#[tokio::test]
async fn websocket_clients_use_the_same_tools(file_host: FileHost, free_listener: StdTcpListener) {
    let server = start(&file_host, free_listener, TransportMode::WebSocket).await;
    let client = ToolClient::builder()
        .observer(Arc::new(SilentWireObserver))
        .confirmation(ConfirmationPolicy::Decline)
        .connect_websocket(&format!("ws://{}", server.addr))
        .await
        .expect("connect");
    assert_eq!(client.server_info()["protocolVersion"], "1.0");

    std::fs::write(file_host.path("ws.txt"), "before").expect("seed");
    let result = client
        .call_tool("write_text", serde_json::json!({"path": "ws.txt", "content": "after"}))
        .await
        .expect("write");
    assert_eq!(result["status"], "skipped");
    assert_eq!(std::fs::read_to_string(file_host.path("ws.txt")).expect("read"), "before");

    client.close().await;
    server.stop().await;
}
