//! Activity lookup shared by `fetch_activity_content` and
//! `get_activity_details`.
//!
//! An activity is located by its module id, or by a course plus a (partial)
//! activity name. Precedence:
//! 1. `activity_id` when present;
//! 2. explicit `course_id` with `activity_name`;
//! 3. the context's default course with `activity_name`.
//!
//! Anything else is rejected before the worker is contacted.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::dispatch::context::CallContext;
use crate::dispatch::contract::{schema, EntityId};
use crate::dispatch::tools::util::non_blank;
use crate::{AppError, Result};

/// Caller-supplied lookup arguments.
#[derive(Debug, Default, Deserialize)]
pub struct ActivityLookupInput {
    /// Course module id.
    #[serde(default)]
    pub activity_id: Option<EntityId>,
    /// Course containing the activity.
    #[serde(default)]
    pub course_id: Option<EntityId>,
    /// Name, or part of the name, of the activity.
    #[serde(default)]
    pub activity_name: Option<String>,
}

/// Resolved way of addressing one activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityLocator {
    /// Direct course module id.
    ById(u64),
    /// Course plus activity name.
    ByName {
        /// Course searched.
        course_id: u64,
        /// Name, or part of the name, of the activity.
        activity_name: String,
    },
}

impl ActivityLocator {
    /// Resolve `input` for `operation`, falling back to the context's
    /// default course.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` naming `operation` and the missing
    /// combination when the activity cannot be addressed.
    pub fn resolve(operation: &str, input: ActivityLookupInput, ctx: &CallContext) -> Result<Self> {
        if let Some(id) = input.activity_id {
            return Ok(Self::ById(id.get()));
        }

        let name = non_blank(input.activity_name);
        let course = input
            .course_id
            .map(EntityId::get)
            .or(ctx.default_course_id);

        match (course, name) {
            (Some(course_id), Some(activity_name)) => Ok(Self::ByName {
                course_id,
                activity_name,
            }),
            (None, Some(_)) => Err(AppError::Validation(format!(
                "{operation} got activity_name but no course_id, and no default course is set; \
                 provide activity_id, or course_id together with activity_name"
            ))),
            (Some(_), None) => Err(AppError::Validation(format!(
                "{operation} needs activity_name alongside course_id, or an activity_id"
            ))),
            (None, None) => Err(AppError::Validation(format!(
                "{operation} needs activity_id, or course_id together with activity_name"
            ))),
        }
    }

    /// Append the locator's fields to an outbound payload.
    pub fn write_into(&self, payload: &mut Map<String, Value>) {
        match self {
            Self::ById(id) => {
                payload.insert("activity_id".into(), json!(id));
            }
            Self::ByName {
                course_id,
                activity_name,
            } => {
                payload.insert("course_id".into(), json!(course_id));
                payload.insert("activity_name".into(), json!(activity_name));
            }
        }
    }
}

/// Input schema shared by both activity operations.
#[must_use]
pub fn lookup_schema(purpose: &str) -> Value {
    schema(
        &json!({
            "activity_id": {
                "type": ["integer", "string"],
                "description": format!(
                    "Course module id (cmid) of the activity to {purpose}. Use this OR course_id and activity_name."
                )
            },
            "course_id": {
                "type": ["integer", "string"],
                "description": "ID of the course containing the activity. Needed when activity_id is not given."
            },
            "activity_name": {
                "type": "string",
                "description": "Name, or part of the name, of the activity. Needed when activity_id is not given."
            }
        }),
        &[],
    )
}

/// Build the worker payload for an activity lookup.
///
/// # Errors
///
/// Returns `AppError::Validation` when the activity cannot be addressed and
/// `AppError::Unauthorized` without a credential.
pub fn lookup_payload(operation: &str, input: ActivityLookupInput, ctx: &CallContext) -> Result<Value> {
    let locator = ActivityLocator::resolve(operation, input, ctx)?;
    let token = ctx.require_token(operation)?;

    let mut payload = Map::new();
    payload.insert("moodle_token".into(), Value::String(token.to_owned()));
    locator.write_into(&mut payload);
    Ok(Value::Object(payload))
}
