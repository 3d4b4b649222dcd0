//! Unit tests for user credential loading and the course override.
//!
//! The keychain service "moodle-agent-bridge" is absent in CI/test
//! environments, so these exercise the env-var fallback.
//!
//! NOTE: These tests mutate process-global env vars and must run serially.

use moodle_agent_bridge::config::{GlobalConfig, COURSE_ID_ENV_VAR, TOKEN_ENV_VAR};
use moodle_agent_bridge::dispatch::CallContext;
use moodle_agent_bridge::AppError;

fn make_config(extra: &str) -> (tempfile::TempDir, GlobalConfig) {
    let temp = tempfile::tempdir().expect("tempdir");
    let script = temp.path().join("server.js");
    std::fs::write(&script, "// worker").expect("write script");
    let toml = format!(
        "[worker]\nscript_path = '{}'\n{extra}",
        script.to_str().expect("utf8 path")
    );
    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");
    (temp, config)
}

fn clear_env() {
    std::env::remove_var(TOKEN_ENV_VAR);
    std::env::remove_var(COURSE_ID_ENV_VAR);
}

#[tokio::test]
#[serial_test::serial]
async fn token_is_loaded_from_env() {
    clear_env();
    std::env::set_var(TOKEN_ENV_VAR, "user-token-123");
    let (_temp, mut config) = make_config("");

    config.load_credentials().await.expect("credentials load");

    assert_eq!(config.context.user_token.as_deref(), Some("user-token-123"));
    let ctx = CallContext::from_config(&config.context);
    assert_eq!(ctx.require_token("get_courses").expect("token"), "user-token-123");

    clear_env();
}

#[tokio::test]
#[serial_test::serial]
async fn missing_token_is_not_fatal() {
    clear_env();
    let (_temp, mut config) = make_config("");

    config
        .load_credentials()
        .await
        .expect("a missing credential only fails individual operations");

    assert_eq!(config.context.user_token, None);
    let err = CallContext::from_config(&config.context)
        .require_token("get_courses")
        .expect_err("no token");
    assert!(matches!(err, AppError::Unauthorized(ref msg) if msg.contains("get_courses")));
}

#[tokio::test]
#[serial_test::serial]
async fn blank_env_token_is_treated_as_missing() {
    clear_env();
    std::env::set_var(TOKEN_ENV_VAR, "   ");
    let (_temp, mut config) = make_config("");

    config.load_credentials().await.expect("credentials load");
    assert_eq!(config.context.user_token, None);

    clear_env();
}

#[tokio::test]
#[serial_test::serial]
async fn course_id_env_overrides_config() {
    clear_env();
    std::env::set_var(COURSE_ID_ENV_VAR, " 42 ");
    let (_temp, mut config) = make_config("[context]\ndefault_course_id = 6\n");

    config.load_credentials().await.expect("credentials load");
    assert_eq!(config.context.default_course_id, Some(42));

    clear_env();
}

#[tokio::test]
#[serial_test::serial]
async fn non_numeric_course_id_env_is_config_error() {
    clear_env();
    std::env::set_var(COURSE_ID_ENV_VAR, "algebra");
    let (_temp, mut config) = make_config("");

    let err = config.load_credentials().await.expect_err("bad course id");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains(COURSE_ID_ENV_VAR)));

    clear_env();
}
