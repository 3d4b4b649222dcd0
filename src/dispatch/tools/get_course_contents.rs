//! `get_course_contents` adapter: sections and modules of one course.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatch::context::CallContext;
use crate::dispatch::contract::{parse_args, schema, EntityId, OperationContract};
use crate::rpc::RpcClient;
use crate::Result;

/// Operation name.
pub const NAME: &str = "get_course_contents";

#[derive(Debug, Deserialize)]
struct GetCourseContentsInput {
    course_id: EntityId,
}

/// Contract advertised to the calling agent.
#[must_use]
pub fn contract() -> OperationContract {
    OperationContract {
        name: NAME,
        description: "Retrieves the sections and modules of a specific course.",
        input_schema: schema(
            &json!({
                "course_id": {
                    "type": ["integer", "string"],
                    "description": "ID of the course whose contents to retrieve."
                }
            }),
            &["course_id"],
        ),
        requires_credential: true,
    }
}

/// Handle a `get_course_contents` call.
///
/// # Errors
///
/// Returns `AppError::Validation` when `course_id` is missing or not an
/// integer, `AppError::Unauthorized` without a credential, or the client's
/// error.
pub async fn handle(client: &RpcClient, ctx: &CallContext, args: Value) -> Result<String> {
    let input: GetCourseContentsInput = parse_args(NAME, args)?;
    let token = ctx.require_token(NAME)?;

    client
        .invoke(
            NAME,
            json!({ "moodle_token": token, "course_id": input.course_id }),
        )
        .await
}
