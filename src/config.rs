//! Global configuration parsing, validation, and credential loading.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::worker::codec::MAX_MESSAGE_BYTES;
use crate::{AppError, Result};

/// Keychain service name under which the user credential is stored.
pub const KEYRING_SERVICE: &str = "moodle-agent-bridge";

/// Environment variable consulted when the keychain has no credential.
pub const TOKEN_ENV_VAR: &str = "MOODLE_USER_TOKEN";

/// Environment variable that overrides `context.default_course_id`.
pub const COURSE_ID_ENV_VAR: &str = "MOODLE_COURSE_ID";

/// How the tool-server worker process is launched.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Runtime executable (e.g. `node`).
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Script passed as the first argument to the runtime.
    ///
    /// Canonicalized during validation; must exist.
    pub script_path: PathBuf,
    /// Extra arguments appended after the script path.
    #[serde(default)]
    pub args: Vec<String>,
    /// Variables inherited from the parent environment.
    ///
    /// `None` selects [`crate::worker::supervisor::ALLOWED_ENV_VARS`].
    #[serde(default)]
    pub inherit_env: Option<Vec<String>>,
    /// Variables set explicitly on the worker (e.g. the platform URL).
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Maximum time to wait for the initialization handshake.
    #[serde(default = "default_startup_timeout_seconds")]
    pub startup_timeout_seconds: u64,
    /// Time allowed for a graceful exit before the worker is force-killed.
    #[serde(default = "default_shutdown_grace_millis")]
    pub shutdown_grace_millis: u64,
}

fn default_runtime() -> String {
    "node".into()
}

fn default_startup_timeout_seconds() -> u64 {
    30
}

fn default_shutdown_grace_millis() -> u64 {
    2000
}

/// Request/response tuning for the RPC client.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RpcConfig {
    /// Per-call reply deadline; 0 means no deadline.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Perform the `initialize` handshake after spawning the worker.
    #[serde(default = "default_true")]
    pub handshake: bool,
    /// Largest single message accepted from the worker.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout_seconds(),
            handshake: true,
            max_message_bytes: MAX_MESSAGE_BYTES,
        }
    }
}

fn default_request_timeout_seconds() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

fn default_max_message_bytes() -> usize {
    MAX_MESSAGE_BYTES
}

/// Ambient defaults injected into dispatched calls.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ContextConfig {
    /// Course targeted when a lookup names an activity without a course.
    #[serde(default)]
    pub default_course_id: Option<u64>,
    /// User credential (populated at runtime, never read from TOML).
    #[serde(skip)]
    pub user_token: Option<String>,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Worker launch settings.
    pub worker: WorkerConfig,
    /// RPC client settings.
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Ambient call context defaults.
    #[serde(default)]
    pub context: ContextConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the user credential from the OS keychain with env-var fallback,
    /// and apply the `MOODLE_COURSE_ID` override when present.
    ///
    /// A missing credential is not an error here: operations that need it
    /// fail individually with `AppError::Unauthorized`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `MOODLE_COURSE_ID` is set but is not
    /// a positive integer.
    pub async fn load_credentials(&mut self) -> Result<()> {
        match load_credential("moodle_user_token", TOKEN_ENV_VAR).await {
            Ok(token) => self.context.user_token = Some(token),
            Err(err) => warn!(%err, "no user credential available; platform tools will fail"),
        }

        if let Ok(raw) = env::var(COURSE_ID_ENV_VAR) {
            let course_id = raw.trim().parse::<u64>().map_err(|err| {
                AppError::Config(format!("{COURSE_ID_ENV_VAR} must be an integer: {err}"))
            })?;
            self.context.default_course_id = Some(course_id);
        }

        Ok(())
    }

    /// Reply deadline applied to calls that do not set their own.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.rpc.request_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.worker.runtime.trim().is_empty() {
            return Err(AppError::Config("worker.runtime must not be empty".into()));
        }

        if self.worker.startup_timeout_seconds == 0 {
            return Err(AppError::Config(
                "worker.startup_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.rpc.max_message_bytes == 0 {
            return Err(AppError::Config(
                "rpc.max_message_bytes must be greater than zero".into(),
            ));
        }

        let canonical_script = self
            .worker
            .script_path
            .canonicalize()
            .map_err(|err| AppError::Config(format!("worker.script_path invalid: {err}")))?;
        self.worker.script_path = canonical_script;

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // Try OS keychain first via spawn_blocking (keyring is synchronous I/O).
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            tracing::debug!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    // Fallback to environment variable.
    match env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
