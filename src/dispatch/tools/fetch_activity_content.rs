//! `fetch_activity_content` adapter: description, text, and attached files
//! of one activity.

use serde_json::Value;

use crate::dispatch::context::CallContext;
use crate::dispatch::contract::{parse_args, OperationContract};
use crate::dispatch::tools::activity::{lookup_payload, lookup_schema, ActivityLookupInput};
use crate::rpc::RpcClient;
use crate::Result;

/// Operation name.
pub const NAME: &str = "fetch_activity_content";

/// Contract advertised to the calling agent.
#[must_use]
pub fn contract() -> OperationContract {
    OperationContract {
        name: NAME,
        description: "Fetches the detailed content of a specific activity (description, text, \
                      associated files). Identify the activity by 'activity_id' OR by \
                      'course_id' together with 'activity_name'.",
        input_schema: lookup_schema("fetch content for"),
        requires_credential: true,
    }
}

/// Handle a `fetch_activity_content` call.
///
/// # Errors
///
/// Returns `AppError::Validation` when the activity cannot be addressed,
/// `AppError::Unauthorized` without a credential, or the client's error.
pub async fn handle(client: &RpcClient, ctx: &CallContext, args: Value) -> Result<String> {
    let input: ActivityLookupInput = parse_args(NAME, args)?;
    let payload = lookup_payload(NAME, input, ctx)?;
    client.invoke(NAME, payload).await
}
