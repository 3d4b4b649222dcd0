//! Integration tests for call events recorded by the client.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use moodle_agent_bridge::events::{CallEvent, EventSink, EventType};
use moodle_agent_bridge::rpc::RpcClient;

use super::test_helpers::{test_options, Action, FakeLauncher};

/// Sink collecting events in memory.
#[derive(Default)]
struct MemorySink {
    events: Mutex<Vec<CallEvent>>,
}

impl MemorySink {
    fn types(&self) -> Vec<EventType> {
        self.events.lock().unwrap().iter().map(|e| e.event_type).collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: CallEvent) -> moodle_agent_bridge::Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

fn client_with_sink(launcher: &FakeLauncher) -> (RpcClient, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::default());
    let client = RpcClient::new(Arc::new(launcher.clone()), test_options())
        .with_event_sink(sink.clone());
    (client, sink)
}

#[tokio::test]
async fn successful_call_records_spawn_start_and_completion() {
    let launcher = FakeLauncher::echo();
    let (client, sink) = client_with_sink(&launcher);

    client.invoke("get_courses", json!({})).await.expect("call succeeds");

    assert_eq!(
        sink.types(),
        vec![
            EventType::CallStarted,
            EventType::WorkerSpawned,
            EventType::CallCompleted
        ]
    );

    let events = sink.events.lock().unwrap();
    assert!(events.iter().all(|e| e.client_id == Some(client.instance_id())));
    assert_eq!(events[1].connection, Some(1));
    assert_eq!(events[2].operation.as_deref(), Some("get_courses"));
    assert!(events[2].duration_ms.is_some());
}

#[tokio::test]
async fn failed_call_records_summary() {
    let launcher = FakeLauncher::new(|_call| Action::Silent);
    let (client, sink) = client_with_sink(&launcher);

    let err = client
        .invoke_with_timeout("get_courses", json!({}), Some(Duration::from_millis(50)))
        .await
        .expect_err("times out");

    let events = sink.events.lock().unwrap();
    let failed = events.last().expect("at least one event");
    assert_eq!(failed.event_type, EventType::CallFailed);
    assert_eq!(failed.summary.as_deref(), Some(err.to_string().as_str()));
}
