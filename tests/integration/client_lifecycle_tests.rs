//! Integration tests for lazy connection, reuse, shutdown, and launch
//! failures of the RPC client.

use std::sync::Arc;

use serde_json::json;

use moodle_agent_bridge::rpc::RpcClient;
use moodle_agent_bridge::worker::protocol::methods;
use moodle_agent_bridge::AppError;

use super::test_helpers::{test_client, test_options, FakeLauncher};

#[tokio::test]
async fn nothing_is_launched_before_first_call() {
    let launcher = FakeLauncher::echo();
    let client = test_client(&launcher);

    assert!(!client.is_connected().await);
    assert_eq!(client.launch_count(), 0);
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn first_call_connects_and_later_calls_reuse_connection() {
    let launcher = FakeLauncher::echo();
    let client = test_client(&launcher);

    let first = client
        .invoke("get_course_contents", json!({ "course_id": 6 }))
        .await
        .expect("first call succeeds");
    assert_eq!(first, r#"{"course_id":6}"#);

    let second = client
        .invoke("get_courses", json!({}))
        .await
        .expect("second call succeeds");
    assert_eq!(second, "{}");

    assert!(client.is_connected().await);
    assert_eq!(client.launch_count(), 1, "one worker serves both calls");
    assert_eq!(launcher.tool_calls().len(), 2);
}

#[tokio::test]
async fn ensure_connected_is_idempotent() {
    let launcher = FakeLauncher::echo();
    let client = test_client(&launcher);

    let a = client.ensure_connected().await.expect("connects");
    let b = client.ensure_connected().await.expect("reuses");

    assert_eq!(a.id(), b.id());
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test]
async fn concurrent_first_calls_share_one_launch() {
    let launcher = FakeLauncher::echo();
    let client = test_client(&launcher);

    let (a, b, c) = tokio::join!(
        client.invoke("get_courses", json!({ "n": 1 })),
        client.invoke("get_courses", json!({ "n": 2 })),
        client.invoke("get_courses", json!({ "n": 3 })),
    );

    assert_eq!(a.expect("a"), r#"{"n":1}"#);
    assert_eq!(b.expect("b"), r#"{"n":2}"#);
    assert_eq!(c.expect("c"), r#"{"n":3}"#);
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test]
async fn null_members_are_dropped_from_payload() {
    let launcher = FakeLauncher::echo();
    let client = test_client(&launcher);

    let out = client
        .invoke("get_courses", json!({ "course_name_filter": null, "moodle_token": "t" }))
        .await
        .expect("call succeeds");

    assert_eq!(out, r#"{"moodle_token":"t"}"#);
    let calls = launcher.tool_calls();
    let call = &calls[0];
    assert_eq!(call.operation_name(), "get_courses");
    assert_eq!(call.tool_input(), Some(&json!({ "moodle_token": "t" })));
}

#[tokio::test]
async fn shutdown_then_call_reconnects() {
    let launcher = FakeLauncher::echo();
    let client = test_client(&launcher);

    client.invoke("get_courses", json!({})).await.expect("first call");
    client.shutdown().await;
    assert!(!client.is_connected().await);

    client.invoke("get_courses", json!({})).await.expect("call after shutdown");
    assert!(client.is_connected().await);
    assert_eq!(client.launch_count(), 2);
}

#[tokio::test]
async fn shutdown_without_connection_is_noop() {
    let launcher = FakeLauncher::echo();
    let client = test_client(&launcher);

    client.shutdown().await;
    client.shutdown().await;
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn launch_failure_surfaces_as_spawn_error_and_is_retried() {
    let launcher = FakeLauncher::echo();
    launcher.fail_next_launches(1);
    let client = test_client(&launcher);

    let err = client
        .invoke("get_courses", json!({}))
        .await
        .expect_err("launch fails");
    assert!(matches!(err, AppError::Spawn(_)), "got {err:?}");
    assert!(!client.is_connected().await);
    assert_eq!(client.launch_count(), 0);

    let out = client
        .invoke("get_courses", json!({}))
        .await
        .expect("next call launches again");
    assert_eq!(out, "{}");
    assert_eq!(launcher.launches(), 2);
}

#[tokio::test]
async fn call_ids_stay_unique_across_reconnects() {
    let launcher = FakeLauncher::echo();
    let client = test_client(&launcher);

    client.invoke("get_courses", json!({})).await.expect("first");
    client.shutdown().await;
    client.invoke("get_courses", json!({})).await.expect("second");

    let ids: Vec<u64> = launcher.requests().iter().map(|call| call.id).collect();
    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(ids.len(), unique.len(), "ids must not repeat: {ids:?}");
}

#[tokio::test]
async fn handshake_can_be_disabled() {
    let launcher = FakeLauncher::echo();
    let mut options = test_options();
    options.handshake = false;
    let client = Arc::new(RpcClient::new(Arc::new(launcher.clone()), options));

    client.invoke("get_courses", json!({})).await.expect("call succeeds");

    let requests = launcher.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, methods::TOOLS_CALL);
    assert!(launcher.notifications().is_empty());
}
