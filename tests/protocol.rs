//! Wire-level behaviour of an accepted session serving a tool host.
//!
//! A [`RawPeer`] plays the client so every envelope the host writes can be
//! inspected.

use rstest::rstest;
use serde_json::{Value, json};
use toolwire::{
    envelope::{Envelope, MessageType},
    rpc::{INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, RequestId, RpcResponse},
    session::SessionState,
};
use toolwire_testing::{FileHost, acceptor_with_peer, file_host, wait_until, within};

#[rstest]
#[tokio::test]
async fn initialize_answers_with_a_terminal_correlated_response(file_host: FileHost) {
    let (session, mut peer) = acceptor_with_peer(file_host.handler());

    peer.send_request(
        "cli-1",
        "initialize",
        Some(json!({"clientName": "raw", "protocolVersion": "1.0"})),
    )
    .await
    .expect("send");
    let (envelope, response) = peer.recv_response().await.expect("response");

    assert!(envelope.fin());
    assert_eq!(envelope.correlation_id(), Some("cli-1"));
    assert_eq!(envelope.session_id(), Some(session.local_session_id()));
    assert_eq!(response.id, Some(RequestId::from("cli-1")));
    let result = response.into_result().expect("result");
    assert_eq!(result["protocolVersion"], "1.0");
    assert_eq!(result["sessionId"], session.local_session_id());
    assert_eq!(result["capabilities"]["tools"]["list"], true);
    session.close().await;
}

#[rstest]
#[tokio::test]
async fn sequence_numbers_increase_per_sender(file_host: FileHost) {
    let (session, mut peer) = acceptor_with_peer(file_host.handler());
    let mut seqs = Vec::new();
    for n in 1..=3 {
        peer.send_request(&format!("cli-{n}"), "tools/list", None)
            .await
            .expect("send");
        let (envelope, _) = peer.recv_response().await.expect("response");
        seqs.push(envelope.seq());
    }
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "seqs not increasing: {seqs:?}");
    session.close().await;
}

#[rstest]
#[case::unknown_method("resources/list", None, METHOD_NOT_FOUND)]
#[case::bad_call_shape("tools/call", Some(json!({"arguments": {}})), INVALID_PARAMS)]
#[case::unknown_tool("tools/call", Some(json!({"name": "nope"})), INVALID_PARAMS)]
#[case::missing_path("tools/call", Some(json!({"name": "read_text", "arguments": {}})), INVALID_PARAMS)]
#[tokio::test]
async fn request_errors_carry_json_rpc_codes(
    file_host: FileHost,
    #[case] method: &str,
    #[case] params: Option<Value>,
    #[case] code: i64,
) {
    let (session, mut peer) = acceptor_with_peer(file_host.handler());
    let response = peer.call("cli-7", method, params).await.expect("response");
    assert_eq!(response.error.map(|e| e.code), Some(code));
    assert!(session.is_open());
    session.close().await;
}

#[rstest]
#[tokio::test]
async fn undecodable_envelope_does_not_end_the_session(file_host: FileHost) {
    let (session, mut peer) = acceptor_with_peer(file_host.handler());
    peer.send_text("{not an envelope").await.expect("send");

    let response = peer.call("cli-2", "tools/list", None).await.expect("response");
    assert!(response.error.is_none());
    session.close().await;
}

#[rstest]
#[case::unparseable_body("{oops", PARSE_ERROR)]
#[case::not_a_request("[1, 2]", INVALID_REQUEST)]
#[tokio::test]
async fn malformed_request_bodies_are_answered(
    file_host: FileHost,
    #[case] body: &str,
    #[case] code: i64,
) {
    let (session, mut peer) = acceptor_with_peer(file_host.handler());
    peer.send(&Envelope::request("cli-3", body)).await.expect("send");
    let (envelope, response) = peer.recv_response().await.expect("response");
    assert_eq!(envelope.correlation_id(), Some("cli-3"));
    assert_eq!(response.error.map(|e| e.code), Some(code));
    session.close().await;
}

#[rstest]
#[tokio::test]
async fn notifications_receive_no_response(file_host: FileHost) {
    let (session, mut peer) = acceptor_with_peer(file_host.handler());
    peer.send(&Envelope::notification(
        json!({"jsonrpc": "2.0", "method": "progress", "params": {"done": 1}}).to_string(),
    ))
    .await
    .expect("send");

    // The next envelope must be the answer to the following request.
    peer.send_request("cli-4", "tools/list", None).await.expect("send");
    let envelope = peer.recv().await.expect("recv").expect("envelope");
    assert_eq!(envelope.correlation_id(), Some("cli-4"));
    session.close().await;
}

#[rstest]
#[tokio::test]
async fn overwrite_decline_leaves_file_untouched(file_host: FileHost) {
    std::fs::write(file_host.path("notes.txt"), "original").expect("seed");
    let (session, mut peer) = acceptor_with_peer(file_host.handler());

    peer.send_request(
        "cli-5",
        "tools/call",
        Some(json!({
            "name": "write_text",
            "arguments": {"path": "notes.txt", "content": "replacement"}
        })),
    )
    .await
    .expect("send");

    let (prompt_envelope, prompt) = peer.recv_request().await.expect("prompt");
    assert_eq!(prompt.method, "elicitation/create");
    let prompt_id = prompt_envelope.request_id().expect("prompt id").to_owned();
    assert!(prompt_id.starts_with("srv-"));
    assert_eq!(
        prompt.params.as_ref().and_then(|p| p.get("message")),
        Some(&json!("File exists. Overwrite?"))
    );
    peer.respond(
        &prompt_id,
        &RpcResponse::success(
            prompt.id.clone(),
            json!({"decision": "decline", "values": {"confirm": false}}),
        ),
    )
    .await
    .expect("answer");

    let (_, response) = peer.recv_response().await.expect("response");
    let result = response.into_result().expect("result");
    assert_eq!(result["status"], "skipped");
    assert_eq!(
        std::fs::read_to_string(file_host.path("notes.txt")).expect("read"),
        "original"
    );
    session.close().await;
}

#[rstest]
#[tokio::test]
async fn escaping_paths_fail_without_touching_disk(file_host: FileHost) {
    let (session, mut peer) = acceptor_with_peer(file_host.handler());
    let response = peer
        .call(
            "cli-6",
            "tools/call",
            Some(json!({
                "name": "write_text",
                "arguments": {"path": "../outside.txt", "content": "x", "overwrite": true}
            })),
        )
        .await
        .expect("response");
    let error = response.error.expect("error");
    assert_eq!(error.code, INTERNAL_ERROR);
    let detail = error.data.as_ref().and_then(|d| d["message"].as_str()).unwrap_or_default();
    assert!(detail.contains("escapes"), "unexpected detail: {detail}");
    assert!(!file_host.dir.path().join("../outside.txt").exists());
    session.close().await;
}

#[rstest]
#[tokio::test]
async fn peer_hang_up_closes_session_and_stops_tasks(file_host: FileHost) {
    let (session, peer) = acceptor_with_peer(file_host.handler());
    peer.hang_up();

    within(session.closed()).await;
    assert_eq!(session.state(), SessionState::Closed);
    assert!(wait_until(|| session.live_tasks() == 0).await);
}

#[rstest]
#[tokio::test]
async fn unknown_message_type_with_id_is_invalid_request(file_host: FileHost) {
    let (session, mut peer) = acceptor_with_peer(file_host.handler());
    peer.send(&Envelope::unknown(Some("cli-8".to_owned()), "{}"))
        .await
        .expect("send");
    let (envelope, response) = peer.recv_response().await.expect("response");
    assert_eq!(envelope.message_type(), MessageType::Response);
    assert_eq!(envelope.correlation_id(), Some("cli-8"));
    assert_eq!(response.error.map(|e| e.code), Some(INVALID_REQUEST));
    session.close().await;
}

#[rstest]
#[tokio::test]
async fn close_is_seen_by_the_peer(file_host: FileHost) {
    let (session, mut peer) = acceptor_with_peer(file_host.handler());
    session.close().await;
    peer.expect_closed().await.expect("closed");
}
