//! Dispatch layer: validates caller arguments, injects the call context,
//! invokes the worker, and folds every failure into one error string.
//!
//! [`Dispatcher::dispatch`] never returns an error. A failed call yields a
//! [`ToolOutput`] with `is_error` set and text of the form
//! `Error in tool <operation>: <error>`.

pub mod context;
pub mod contract;
pub mod tools;

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};

use crate::rpc::RpcClient;
use crate::AppError;

pub use context::CallContext;
pub use contract::{EntityId, OperationContract};

use tools::{
    datetime_helper, fetch_activity_content, get_activity_details, get_course_activities,
    get_course_contents, get_courses, get_page_module_content, get_resource_file_content,
};

/// Bytes of the argument object kept in log lines.
const ARGS_PREVIEW_BYTES: usize = 200;

/// Result handed back to the calling agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Worker content on success, normalized error text on failure.
    pub text: String,
    /// Whether `text` describes a failure.
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful output.
    #[must_use]
    pub fn success(text: String) -> Self {
        Self {
            text,
            is_error: false,
        }
    }

    /// Failed output.
    #[must_use]
    pub fn failure(text: String) -> Self {
        Self {
            text,
            is_error: true,
        }
    }
}

/// Render `err` as the error string returned for `operation`.
#[must_use]
pub fn normalize_error(operation: &str, err: &AppError) -> String {
    format!("Error in tool {operation}: {err}")
}

/// Routes named operations to their adapters.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Arc<RpcClient>,
}

impl Dispatcher {
    /// Dispatcher issuing worker calls through `client`.
    #[must_use]
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }

    /// Underlying RPC client.
    #[must_use]
    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    /// Contracts of every operation, in a stable order.
    #[must_use]
    pub fn contracts() -> Vec<OperationContract> {
        vec![
            get_courses::contract(),
            get_course_contents::contract(),
            get_course_activities::contract(),
            fetch_activity_content::contract(),
            get_activity_details::contract(),
            get_page_module_content::contract(),
            get_resource_file_content::contract(),
            datetime_helper::contract(),
        ]
    }

    /// Contract of the operation called `name`.
    #[must_use]
    pub fn contract(name: &str) -> Option<OperationContract> {
        Self::contracts().into_iter().find(|c| c.name == name)
    }

    /// Run the operation `name` with caller-supplied `args`.
    pub async fn dispatch(&self, name: &str, args: Value, ctx: &CallContext) -> ToolOutput {
        let span = info_span!("dispatch", tool = name);

        async move {
            info!(
                args = %tools::util::args_preview(&args, ARGS_PREVIEW_BYTES),
                "dispatching tool call"
            );

            match self.route(name, args, ctx).await {
                Ok(text) => ToolOutput::success(text),
                Err(err) => {
                    warn!(%err, "tool call failed");
                    ToolOutput::failure(normalize_error(name, &err))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn route(&self, name: &str, args: Value, ctx: &CallContext) -> crate::Result<String> {
        let client = self.client.as_ref();
        match name {
            get_courses::NAME => get_courses::handle(client, ctx, args).await,
            get_course_contents::NAME => get_course_contents::handle(client, ctx, args).await,
            get_course_activities::NAME => get_course_activities::handle(client, ctx, args).await,
            fetch_activity_content::NAME => fetch_activity_content::handle(client, ctx, args).await,
            get_activity_details::NAME => get_activity_details::handle(client, ctx, args).await,
            get_page_module_content::NAME => get_page_module_content::handle(client, ctx, args).await,
            get_resource_file_content::NAME => {
                get_resource_file_content::handle(client, ctx, args).await
            }
            datetime_helper::NAME => datetime_helper::handle(args),
            other => Err(AppError::NotFound(format!("unknown tool '{other}'"))),
        }
    }
}
