//! Contract tests for the input schemas advertised per operation.
//!
//! Each test encodes the required/optional field structure the calling
//! agent relies on. The credential never appears in any schema: it is
//! injected from the call context.

use serde_json::Value;

use moodle_agent_bridge::dispatch::{Dispatcher, OperationContract};

fn contract(name: &str) -> OperationContract {
    Dispatcher::contract(name).expect("operation exists")
}

fn required(contract: &OperationContract) -> Vec<String> {
    contract.input_schema["required"]
        .as_array()
        .expect("required is an array")
        .iter()
        .map(|v| v.as_str().expect("required entries are strings").to_owned())
        .collect()
}

fn properties(contract: &OperationContract) -> Vec<String> {
    let mut keys: Vec<String> = contract.input_schema["properties"]
        .as_object()
        .expect("properties is an object")
        .keys()
        .cloned()
        .collect();
    keys.sort();
    keys
}

#[test]
fn every_schema_is_an_object_schema() {
    for contract in Dispatcher::contracts() {
        assert_eq!(contract.input_schema["type"], "object", "{}", contract.name);
        assert!(contract.input_schema["properties"].is_object(), "{}", contract.name);
        assert!(contract.input_schema["required"].is_array(), "{}", contract.name);
    }
}

#[test]
fn credential_is_never_a_caller_field() {
    for contract in Dispatcher::contracts() {
        let props = properties(&contract);
        assert!(
            !props.iter().any(|p| p.contains("token")),
            "{} exposes a credential field",
            contract.name
        );
    }
}

#[test]
fn get_courses_filter_is_optional() {
    let c = contract("get_courses");
    assert_eq!(properties(&c), vec!["course_name_filter"]);
    assert!(required(&c).is_empty());
}

#[test]
fn course_operations_require_course_id() {
    for name in ["get_course_contents", "get_course_activities"] {
        let c = contract(name);
        assert_eq!(properties(&c), vec!["course_id"], "{name}");
        assert_eq!(required(&c), vec!["course_id"], "{name}");
    }
}

#[test]
fn activity_lookups_have_no_single_required_field() {
    for name in ["fetch_activity_content", "get_activity_details"] {
        let c = contract(name);
        assert_eq!(
            properties(&c),
            vec!["activity_id", "activity_name", "course_id"],
            "{name}"
        );
        assert!(required(&c).is_empty(), "{name}: either id or name+course");
    }
}

#[test]
fn page_content_requires_url() {
    let c = contract("get_page_module_content");
    assert_eq!(required(&c), vec!["page_content_url"]);
    assert_eq!(c.input_schema["properties"]["page_content_url"]["format"], "uri");
}

#[test]
fn resource_file_requires_url_and_mimetype() {
    let c = contract("get_resource_file_content");
    assert_eq!(required(&c), vec!["resource_file_url", "mimetype"]);
}

#[test]
fn datetime_helper_action_enum() {
    let c = contract("datetime_helper");
    assert_eq!(required(&c), vec!["action"]);

    let actions: Vec<&str> = c.input_schema["properties"]["action"]["enum"]
        .as_array()
        .expect("enum array")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(
        actions,
        vec![
            "getCurrentDateTimeISO",
            "convertTimestampToDateTimeISO",
            "getStartAndEndOfWeekISO",
            "getStartAndEndOfMonthISO",
        ]
    );
}

#[test]
fn contracts_serialize_for_listing() {
    let listing = serde_json::to_value(Dispatcher::contracts()).expect("serialize");
    let first = &listing[0];
    assert_eq!(first["name"], "get_courses");
    assert!(first["input_schema"].is_object());
    assert_eq!(first["requires_credential"], true);
}
