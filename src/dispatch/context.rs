//! Ambient per-call context.
//!
//! [`CallContext`] carries values the calling agent must never supply
//! itself: the user's platform credential and an optional default course.
//! Adapters inject them into the outbound payload; they never appear in
//! logged arguments.

use std::fmt;

use crate::config::ContextConfig;
use crate::{AppError, Result};

/// Credential and targeting defaults threaded alongside a call.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    /// Platform credential of the user on whose behalf the call runs.
    pub user_token: Option<String>,
    /// Course used when a lookup names an activity without a course.
    pub default_course_id: Option<u64>,
}

impl CallContext {
    /// Construct a new call context.
    #[must_use]
    pub fn new(user_token: Option<String>, default_course_id: Option<u64>) -> Self {
        Self {
            user_token,
            default_course_id,
        }
    }

    /// Context seeded from the `[context]` config section.
    #[must_use]
    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.user_token.clone(), config.default_course_id)
    }

    /// Return the credential, or fail for `operation` when none is set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` when the context has no non-empty
    /// credential.
    pub fn require_token(&self, operation: &str) -> Result<&str> {
        self.user_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(format!("no user credential available for {operation}"))
            })
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("user_token", &self.user_token.as_ref().map(|_| "<redacted>"))
            .field("default_course_id", &self.default_course_id)
            .finish()
    }
}
