//! `get_resource_file_content` adapter: text extracted from a "Resource"
//! file (PDF, DOCX, plain text).

use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatch::context::CallContext;
use crate::dispatch::contract::{parse_args, schema, OperationContract};
use crate::dispatch::tools::get_page_module_content::checked_url;
use crate::rpc::RpcClient;
use crate::{AppError, Result};

/// Operation name.
pub const NAME: &str = "get_resource_file_content";

#[derive(Debug, Deserialize)]
struct GetResourceFileContentInput {
    resource_file_url: String,
    mimetype: String,
}

/// Contract advertised to the calling agent.
#[must_use]
pub fn contract() -> OperationContract {
    OperationContract {
        name: NAME,
        description: "Extracts the text of a 'Resource' file (PDF, DOCX, TXT) from its direct URL.",
        input_schema: schema(
            &json!({
                "resource_file_url": {
                    "type": "string",
                    "format": "uri",
                    "description": "Direct URL of the resource file."
                },
                "mimetype": {
                    "type": "string",
                    "description": "MIME type of the file (e.g. \"application/pdf\", \"text/plain\")."
                }
            }),
            &["resource_file_url", "mimetype"],
        ),
        requires_credential: true,
    }
}

/// Handle a `get_resource_file_content` call.
///
/// # Errors
///
/// Returns `AppError::Validation` for an invalid URL or blank MIME type,
/// `AppError::Unauthorized` without a credential, or the client's error.
pub async fn handle(client: &RpcClient, ctx: &CallContext, args: Value) -> Result<String> {
    let input: GetResourceFileContentInput = parse_args(NAME, args)?;
    let url = checked_url(NAME, "resource_file_url", &input.resource_file_url)?;
    let mimetype = input.mimetype.trim();
    if mimetype.is_empty() {
        return Err(AppError::Validation(format!("{NAME}: mimetype must not be empty")));
    }
    let token = ctx.require_token(NAME)?;

    client
        .invoke(
            NAME,
            json!({
                "moodle_token": token,
                "resource_file_url": url,
                "mimetype": mimetype,
            }),
        )
        .await
}
