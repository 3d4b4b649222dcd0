//! Integration tests for the `initialize` handshake.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use moodle_agent_bridge::rpc::handshake::{perform_handshake, CLIENT_NAME};
use moodle_agent_bridge::rpc::RpcClient;
use moodle_agent_bridge::worker::protocol::{methods, PROTOCOL_VERSION};
use moodle_agent_bridge::AppError;

use super::test_helpers::{test_client, test_options, FakeLauncher};

#[tokio::test]
async fn handshake_precedes_first_tool_call() {
    let launcher = FakeLauncher::echo();
    let client = test_client(&launcher);

    client.invoke("get_courses", json!({})).await.expect("call succeeds");

    let requests = launcher.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, methods::INITIALIZE);
    assert_eq!(requests[0].params["protocolVersion"], PROTOCOL_VERSION);
    assert_eq!(requests[0].params["clientInfo"]["name"], CLIENT_NAME);
    assert_eq!(requests[1].method, methods::TOOLS_CALL);

    assert_eq!(launcher.notifications(), vec![methods::INITIALIZED.to_owned()]);
}

#[tokio::test]
async fn handshake_reports_server_info() {
    let launcher = FakeLauncher::echo();
    let client = test_client(&launcher);
    let handle = client.ensure_connected().await.expect("connects");

    // A second handshake on the same connection is answered the same way.
    let info = perform_handshake(&handle, Duration::from_secs(2))
        .await
        .expect("handshake succeeds");
    assert_eq!(info.name, "fake-moodle");
    assert_eq!(info.version, "1.0.0");
}

#[tokio::test]
async fn silent_worker_fails_handshake_with_timeout() {
    let launcher = FakeLauncher::echo();
    launcher.ignore_initialize();
    let mut options = test_options();
    options.startup_timeout = Duration::from_millis(100);
    let client = RpcClient::new(Arc::new(launcher.clone()), options);

    let err = client
        .invoke("get_courses", json!({}))
        .await
        .expect_err("handshake times out");
    assert!(
        matches!(err, AppError::Timeout(ref msg) if msg.starts_with("worker handshake")),
        "got {err:?}"
    );
    assert!(!client.is_connected().await, "half-started worker is discarded");
    assert!(launcher.tool_calls().is_empty(), "no tool call before the handshake");
}
