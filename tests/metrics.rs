#![cfg(feature = "metrics")]
//! Tests for `toolwire` metrics.
//!
//! Counters and gauges are captured with
//! `metrics_util::debugging::DebuggingRecorder`. Async cases run on a
//! current-thread runtime inside `with_local_recorder` so every session task
//! records into the local recorder.

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use serde_json::json;
use toolwire::{
    dispatch::{MethodNotFound, Router, handler_fn},
    metrics::{self as tw_metrics, Direction},
    rpc::RpcError,
};
use toolwire_testing::{acceptor_with_peer, session_pair, wait_until};

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(k, _, _, _)| k.key().name() == name)
        .filter(|(k, _, _, _)| {
            label.is_none_or(|(key, value)| {
                k.key().labels().any(|l| l.key() == key && l.value() == value)
            })
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(fut)
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn frame_metric_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || tw_metrics::inc_frames(direction));
    assert_eq!(
        counter(&snapshotter, tw_metrics::FRAMES_PROCESSED, Some(("direction", label))),
        1
    );
}

#[test]
fn error_and_timeout_helpers_increment() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        tw_metrics::inc_errors();
        tw_metrics::inc_errors();
        tw_metrics::inc_call_timeouts();
    });
    assert_eq!(counter(&snapshotter, tw_metrics::ERRORS_TOTAL, None), 2);
    assert_eq!(counter(&snapshotter, tw_metrics::CALL_TIMEOUTS, None), 1);
}

#[test]
fn request_round_trip_counts_frames_both_ways() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        block_on(async {
            let router = Router::new()
                .route("ping", handler_fn(|_| async { Ok::<_, RpcError>(json!("pong")) }))
                .expect("route");
            let (server, client) = session_pair(Arc::new(router), Arc::new(MethodNotFound));
            let reply = client.send_request("ping", None).await.expect("ping");
            assert_eq!(reply, json!("pong"));
            client.close().await;
            server.close().await;
        });
    });
    // One request and one response, each sent once and received once.
    assert_eq!(
        counter(&snapshotter, tw_metrics::FRAMES_PROCESSED, Some(("direction", "outbound"))),
        2
    );
    assert_eq!(
        counter(&snapshotter, tw_metrics::FRAMES_PROCESSED, Some(("direction", "inbound"))),
        2
    );
}

#[test]
fn undecodable_frames_count_as_errors() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        block_on(async {
            let (session, mut peer) = acceptor_with_peer(Arc::new(MethodNotFound));
            peer.send_text("garbage").await.expect("send");
            let response = peer.call("cli-1", "ping", None).await.expect("response");
            assert!(response.error.is_some());
            session.close().await;
        });
    });
    assert!(counter(&snapshotter, tw_metrics::ERRORS_TOTAL, None) >= 1);
}

#[test]
fn handler_panics_are_counted() {
    struct Explodes;

    #[async_trait::async_trait]
    impl toolwire::dispatch::MethodHandler for Explodes {
        async fn call(
            &self,
            _params: Option<serde_json::Value>,
            _ctx: &toolwire::dispatch::CallContext<'_>,
        ) -> Result<serde_json::Value, RpcError> {
            panic!("boom");
        }
    }

    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        block_on(async {
            let router = Router::new().route("explode", Explodes).expect("route");
            let (session, mut peer) = acceptor_with_peer(Arc::new(router));
            let response = peer.call("cli-1", "explode", None).await.expect("response");
            assert_eq!(
                response.error.map(|e| e.code),
                Some(toolwire::rpc::INTERNAL_ERROR)
            );
            assert!(wait_until(|| session.pending_inbound() == 0).await);
            session.close().await;
        });
    });
    assert_eq!(counter(&snapshotter, tw_metrics::HANDLER_PANICS, None), 1);
}
