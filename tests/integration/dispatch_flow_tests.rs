//! Integration tests for the dispatch layer over a fake worker.
//!
//! Verifies the payload each operation sends, that invalid calls are
//! rejected before any worker is launched, and that every failure comes back
//! as one normalized error string.

use serde_json::json;

use moodle_agent_bridge::dispatch::CallContext;

use super::test_helpers::{test_context, test_dispatcher, Action, FakeLauncher};

#[tokio::test]
async fn get_courses_with_null_filter_sends_only_credential() {
    let launcher = FakeLauncher::echo();
    let dispatcher = test_dispatcher(&launcher);

    let output = dispatcher
        .dispatch("get_courses", json!({ "course_name_filter": null }), &test_context())
        .await;

    assert!(!output.is_error, "unexpected error: {}", output.text);
    let calls = launcher.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation_name(), "get_courses");
    let input = calls[0].tool_input().expect("tools/call carries input");
    assert_eq!(input, &json!({ "moodle_token": "user-token" }));
    assert!(input.get("course_name_filter").is_none());
}

#[tokio::test]
async fn get_courses_forwards_trimmed_filter() {
    let launcher = FakeLauncher::echo();
    let dispatcher = test_dispatcher(&launcher);

    let output = dispatcher
        .dispatch("get_courses", json!({ "course_name_filter": "  Algebra " }), &test_context())
        .await;

    assert!(!output.is_error);
    assert_eq!(
        launcher.tool_calls()[0].params["input"],
        json!({ "moodle_token": "user-token", "course_name_filter": "Algebra" })
    );
}

#[tokio::test]
async fn worker_text_is_returned_verbatim() {
    let launcher = FakeLauncher::new(|call| {
        Action::Reply(moodle_agent_bridge::worker::protocol::ReplyEnvelope::text(
            call.id,
            "[{\"id\":6,\"fullname\":\"Algebra I\"}]",
        ))
    });
    let dispatcher = test_dispatcher(&launcher);

    let output = dispatcher.dispatch("get_courses", json!({}), &test_context()).await;

    assert!(!output.is_error);
    assert_eq!(output.text, "[{\"id\":6,\"fullname\":\"Algebra I\"}]");
}

#[tokio::test]
async fn string_course_id_is_sent_as_integer() {
    let launcher = FakeLauncher::echo();
    let dispatcher = test_dispatcher(&launcher);

    let output = dispatcher
        .dispatch("get_course_contents", json!({ "course_id": "6" }), &test_context())
        .await;

    assert!(!output.is_error, "unexpected error: {}", output.text);
    assert_eq!(
        launcher.tool_calls()[0].params["input"],
        json!({ "moodle_token": "user-token", "course_id": 6 })
    );
}

#[tokio::test]
async fn get_course_activities_sends_course_id() {
    let launcher = FakeLauncher::echo();
    let dispatcher = test_dispatcher(&launcher);

    let output = dispatcher
        .dispatch("get_course_activities", json!({ "course_id": 12 }), &test_context())
        .await;

    assert!(!output.is_error);
    let echoed: serde_json::Value = serde_json::from_str(&output.text).expect("echoed input");
    assert_eq!(echoed, json!({ "moodle_token": "user-token", "course_id": 12 }));
}

#[tokio::test]
async fn activity_lookup_without_target_is_rejected_before_launch() {
    let launcher = FakeLauncher::echo();
    let dispatcher = test_dispatcher(&launcher);

    let output = dispatcher
        .dispatch("fetch_activity_content", json!({}), &test_context())
        .await;

    assert!(output.is_error);
    assert!(
        output.text.starts_with("Error in tool fetch_activity_content: validation:"),
        "text was {}",
        output.text
    );
    assert_eq!(launcher.launches(), 0, "no worker is launched for invalid arguments");
    assert_eq!(dispatcher.client().launch_count(), 0);
}

#[tokio::test]
async fn activity_name_uses_default_course_from_context() {
    let launcher = FakeLauncher::echo();
    let dispatcher = test_dispatcher(&launcher);
    let ctx = CallContext::new(Some("user-token".into()), Some(6));

    let output = dispatcher
        .dispatch("get_activity_details", json!({ "activity_name": "Quiz 1" }), &ctx)
        .await;

    assert!(!output.is_error, "unexpected error: {}", output.text);
    assert_eq!(
        launcher.tool_calls()[0].params["input"],
        json!({ "moodle_token": "user-token", "course_id": 6, "activity_name": "Quiz 1" })
    );
}

#[tokio::test]
async fn page_url_must_parse() {
    let launcher = FakeLauncher::echo();
    let dispatcher = test_dispatcher(&launcher);

    let output = dispatcher
        .dispatch(
            "get_page_module_content",
            json!({ "page_content_url": "mod/page/view.php?id=3" }),
            &test_context(),
        )
        .await;

    assert!(output.is_error);
    assert!(output.text.contains("is not a valid URL"), "text was {}", output.text);
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn page_url_is_forwarded_as_written() {
    let launcher = FakeLauncher::echo();
    let dispatcher = test_dispatcher(&launcher);
    let written = "HTTPS://Moodle.Example/mod/page/view.php?id=3&x=a b";

    let output = dispatcher
        .dispatch(
            "get_page_module_content",
            json!({ "page_content_url": format!("  {written} ") }),
            &test_context(),
        )
        .await;

    assert!(!output.is_error, "unexpected error: {}", output.text);
    let calls = launcher.tool_calls();
    assert_eq!(calls[0].params["input"]["page_content_url"], written);
}

#[tokio::test]
async fn resource_file_call_sends_url_and_mimetype() {
    let launcher = FakeLauncher::echo();
    let dispatcher = test_dispatcher(&launcher);

    let output = dispatcher
        .dispatch(
            "get_resource_file_content",
            json!({
                "resource_file_url": "https://moodle.example.edu/pluginfile.php/1/mod_resource/content/0/notes.pdf",
                "mimetype": "application/pdf"
            }),
            &test_context(),
        )
        .await;

    assert!(!output.is_error, "unexpected error: {}", output.text);
    let calls = launcher.tool_calls();
    let input = &calls[0].params["input"];
    assert_eq!(input["mimetype"], "application/pdf");
    assert_eq!(
        input["resource_file_url"],
        "https://moodle.example.edu/pluginfile.php/1/mod_resource/content/0/notes.pdf"
    );
    assert_eq!(input["moodle_token"], "user-token");
}

#[tokio::test]
async fn missing_credential_is_reported_without_launch() {
    let launcher = FakeLauncher::echo();
    let dispatcher = test_dispatcher(&launcher);

    let output = dispatcher
        .dispatch("get_courses", json!({}), &CallContext::default())
        .await;

    assert!(output.is_error);
    assert_eq!(
        output.text,
        "Error in tool get_courses: unauthorized: no user credential available for get_courses"
    );
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn unknown_tool_is_reported() {
    let launcher = FakeLauncher::echo();
    let dispatcher = test_dispatcher(&launcher);

    let output = dispatcher.dispatch("delete_course", json!({}), &test_context()).await;

    assert!(output.is_error);
    assert_eq!(
        output.text,
        "Error in tool delete_course: not found: unknown tool 'delete_course'"
    );
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn worker_failure_is_normalized() {
    let launcher = FakeLauncher::new(|call| {
        Action::Reply(moodle_agent_bridge::worker::protocol::ReplyEnvelope::failure(
            call.id,
            -32000,
            "Course not found",
        ))
    });
    let dispatcher = test_dispatcher(&launcher);

    let output = dispatcher
        .dispatch("get_course_contents", json!({ "course_id": 404 }), &test_context())
        .await;

    assert!(output.is_error);
    assert_eq!(
        output.text,
        "Error in tool get_course_contents: worker: Course not found (code -32000)"
    );
}

#[tokio::test]
async fn datetime_helper_runs_locally() {
    let launcher = FakeLauncher::echo();
    let dispatcher = test_dispatcher(&launcher);

    let output = dispatcher
        .dispatch(
            "datetime_helper",
            json!({ "action": "getStartAndEndOfWeekISO", "value": "2024-01-10" }),
            &CallContext::default(),
        )
        .await;

    assert!(!output.is_error, "unexpected error: {}", output.text);
    let bounds: serde_json::Value = serde_json::from_str(&output.text).expect("json output");
    assert_eq!(bounds["start_of_week"], "2024-01-08T00:00:00.000Z");
    assert_eq!(bounds["end_of_week"], "2024-01-14T23:59:59.999Z");
    assert_eq!(launcher.launches(), 0, "datetime_helper never contacts the worker");
}
