//! `get_courses` adapter.
//!
//! Lists the courses visible to the user, optionally narrowed by a name
//! filter.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::dispatch::context::CallContext;
use crate::dispatch::contract::{parse_args, schema, OperationContract};
use crate::dispatch::tools::util::non_blank;
use crate::rpc::RpcClient;
use crate::Result;

/// Operation name.
pub const NAME: &str = "get_courses";

#[derive(Debug, Deserialize)]
struct GetCoursesInput {
    /// Text to filter course names by.
    #[serde(default)]
    course_name_filter: Option<String>,
}

/// Contract advertised to the calling agent.
#[must_use]
pub fn contract() -> OperationContract {
    OperationContract {
        name: NAME,
        description: "Retrieves the list of courses the user can access. Optionally filters by course name.",
        input_schema: schema(
            &json!({
                "course_name_filter": {
                    "type": ["string", "null"],
                    "description": "Text to filter course names by."
                }
            }),
            &[],
        ),
        requires_credential: true,
    }
}

/// Handle a `get_courses` call.
///
/// # Errors
///
/// Returns `AppError::Validation` for a non-string filter,
/// `AppError::Unauthorized` without a credential, or the client's error.
pub async fn handle(client: &RpcClient, ctx: &CallContext, args: Value) -> Result<String> {
    let input: GetCoursesInput = parse_args(NAME, args)?;
    let token = ctx.require_token(NAME)?;

    let mut payload = Map::new();
    payload.insert("moodle_token".into(), Value::String(token.to_owned()));
    if let Some(filter) = non_blank(input.course_name_filter) {
        payload.insert("course_name_filter".into(), Value::String(filter));
    }

    client.invoke(NAME, Value::Object(payload)).await
}
