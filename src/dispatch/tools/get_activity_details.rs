//! `get_activity_details` adapter.

use serde_json::Value;

use crate::dispatch::context::CallContext;
use crate::dispatch::contract::{parse_args, OperationContract};
use crate::dispatch::tools::activity::{lookup_payload, lookup_schema, ActivityLookupInput};
use crate::rpc::RpcClient;
use crate::Result;

/// Operation name.
pub const NAME: &str = "get_activity_details";

/// Contract advertised to the calling agent.
#[must_use]
pub fn contract() -> OperationContract {
    OperationContract {
        name: NAME,
        description: "Retrieves the details of a specific activity (type, dates, settings). \
                      Identify the activity by 'activity_id' OR by 'course_id' together with \
                      'activity_name'.",
        input_schema: lookup_schema("describe"),
        requires_credential: true,
    }
}

/// Handle a `get_activity_details` call.
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
