//! `get_page_module_content` adapter: text of a "Page" module.

use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::dispatch::context::CallContext;
use crate::dispatch::contract::{parse_args, schema, OperationContract};
use crate::rpc::RpcClient;
use crate::{AppError, Result};

/// Operation name.
pub const NAME: &str = "get_page_module_content";

#[derive(Debug, Deserialize)]
struct GetPageModuleContentInput {
    page_content_url: String,
}

/// Contract advertised to the calling agent.
#[must_use]
pub fn contract() -> OperationContract {
    OperationContract {
        name: NAME,
        description: "Extracts the text content of a 'Page' module from its direct content URL.",
        input_schema: schema(
            &json!({
                "page_content_url": {
                    "type": "string",
                    "format": "uri",
                    "description": "Direct URL of the Page module content."
                }
            }),
            &["page_content_url"],
        ),
        requires_credential: true,
    }
}

/// Check that `raw` is an absolute URL and return it trimmed but otherwise
/// as the caller wrote it; the worker resolves it against Moodle itself.
///
/// # Errors
///
/// Returns `AppError::Validation` when `raw` does not parse as a URL.
pub fn checked_url<'a>(operation: &str, field: &str, raw: &'a str) -> Result<&'a str> {
    let trimmed = raw.trim();
    Url::parse(trimmed)
        .map_err(|err| AppError::Validation(format!("{operation}: {field} is not a valid URL: {err}")))?;
    Ok(trimmed)
}

/// Handle a `get_page_module_content` call.
///
/// # Errors
///
/// Returns `AppError::Validation` for a missing or invalid URL,
/// `AppError::Unauthorized` without a credential, or the client's error.
pub async fn handle(client: &RpcClient, ctx: &CallContext, args: Value) -> Result<String> {
    let input: GetPageModuleContentInput = parse_args(NAME, args)?;
    let url = checked_url(NAME, "page_content_url", &input.page_content_url)?;
    let token = ctx.require_token(NAME)?;

    client
        .invoke(
            NAME,
            json!({ "moodle_token": token, "page_content_url": url }),
        )
        .await
}
