//! `get_course_activities` adapter.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatch::context::CallContext;
use crate::dispatch::contract::{parse_args, schema, EntityId, OperationContract};
use crate::rpc::RpcClient;
use crate::Result;

/// Operation name.
pub const NAME: &str = "get_course_activities";

#[derive(Debug, Deserialize)]
struct GetCourseActivitiesInput {
    course_id: EntityId,
}

/// Contract advertised to the calling agent.
#[must_use]
pub fn contract() -> OperationContract {
    OperationContract {
        name: NAME,
        description: "Retrieves a flat list of the activities in a course (id, name, URL, \
                      file URL, last modification time).",
        input_schema: schema(
            &json!({
                "course_id": {
                    "type": ["integer", "string"],
                    "description": "ID of the course whose activities to retrieve."
                }
            }),
            &["course_id"],
        ),
        requires_credential: true,
    }
}

/// Handle a `get_course_activities` call.
///
/// # Errors
///
/// Returns `AppError::Validation` when `course_id` is missing or not an
/// integer, `AppError::Unauthorized` without a credential, or the client's
/// error.
pub async fn handle(client: &RpcClient, ctx: &CallContext, args: Value) -> Result<String> {
    let input: GetCourseActivitiesInput = parse_args(NAME, args)?;
    let token = ctx.require_token(NAME)?;

    client
        .invoke(
            NAME,
            json!({ "moodle_token": token, "course_id": input.course_id }),
        )
        .await
}
