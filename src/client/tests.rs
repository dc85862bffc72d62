//! Client against an in-memory tool host.

use std::sync::Arc;

use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::{
    dispatch::{MethodNotFound, RequestHandler},
    host::ToolHost,
    rpc::METHOD_NOT_FOUND,
    session::{Role, Session, SilentWireObserver},
    tools::Sandbox,
    transport,
};

struct Host {
    dir: TempDir,
    session: Session,
}

fn host_with(handler: Arc<dyn RequestHandler>) -> (Session, tokio::io::DuplexStream) {
    let (server_side, client_side) = tokio::io::duplex(64 * 1024);
    let session = Session::builder(Role::Acceptor)
        .request_handler(handler)
        .observer(Arc::new(SilentWireObserver))
        .spawn(transport::framed(server_side, 1 << 20));
    (session, client_side)
}

#[fixture]
fn files_host() -> (Host, tokio::io::DuplexStream) {
    let dir = tempfile::tempdir().expect("tempdir");
    let sandbox = Sandbox::open(dir.path()).expect("sandbox");
    let (session, stream) = host_with(Arc::new(ToolHost::new().with_file_tools(&sandbox)));
    (Host { dir, session }, stream)
}

fn quiet() -> ToolClientBuilder { ToolClientBuilder::new().observer(Arc::new(SilentWireObserver)) }

#[rstest]
#[tokio::test]
async fn handshake_adopts_host_session_id(files_host: (Host, tokio::io::DuplexStream)) {
    let (host, stream) = files_host;
    let client = quiet().connect_stream(stream).await.expect("connect");

    assert_eq!(client.server_info()["protocolVersion"], "1.0");
    assert_eq!(client.server_info()["capabilities"]["elicitation"]["create"], true);
    assert_eq!(client.session_id(), host.session.local_session_id());
    assert!(client.session().is_open());
    client.close().await;
}

#[tokio::test]
async fn failed_handshake_closes_the_session() {
    let (_host, stream) = host_with(Arc::new(MethodNotFound));
    let err = quiet().connect_stream(stream).await.expect_err("handshake");
    match err {
        ClientError::Handshake(call) => {
            assert_eq!(call.rpc_error().map(|e| e.code), Some(METHOD_NOT_FOUND));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
#[tokio::test]
async fn lists_file_tools(files_host: (Host, tokio::io::DuplexStream)) {
    let (_host, stream) = files_host;
    let client = quiet().connect_stream(stream).await.expect("connect");
    let names: Vec<String> = client
        .list_tools()
        .await
        .expect("tools")
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, ["list_files", "read_text", "write_text", "delete_file"]);
}

#[rstest]
#[case::declined(ConfirmationPolicy::Decline, "skipped", "old")]
#[case::accepted(ConfirmationPolicy::Accept, "updated", "new")]
#[tokio::test]
async fn overwrite_prompts_are_answered_by_policy(
    files_host: (Host, tokio::io::DuplexStream),
    #[case] policy: ConfirmationPolicy,
    #[case] status: &str,
    #[case] contents: &str,
) {
    let (host, stream) = files_host;
    std::fs::write(host.dir.path().join("f.txt"), "old").expect("seed");
    let client = quiet()
        .confirmation(policy)
        .connect_stream(stream)
        .await
        .expect("connect");

    let result = client.write_text("f.txt", "new", false).await.expect("write");
    assert_eq!(result["status"], status);
    assert_eq!(
        std::fs::read_to_string(host.dir.path().join("f.txt")).expect("read"),
        contents
    );
}

#[rstest]
#[tokio::test]
async fn unknown_tool_is_invalid_params(files_host: (Host, tokio::io::DuplexStream)) {
    let (_host, stream) = files_host;
    let client = quiet().connect_stream(stream).await.expect("connect");
    let err = client.call_tool("nope", json!({})).await.expect_err("unknown");
    let call = match err {
        ClientError::Call(call) => call,
        other => panic!("unexpected error: {other}"),
    };
    let rpc = call.rpc_error().expect("rpc error");
    assert_eq!(rpc.code, crate::rpc::INVALID_PARAMS);
    assert_eq!(rpc.message, "Unknown tool: nope");
}
