use std::time::Duration;

use moodle_agent_bridge::config::GlobalConfig;
use moodle_agent_bridge::rpc::ClientOptions;
use moodle_agent_bridge::worker::codec::MAX_MESSAGE_BYTES;
use moodle_agent_bridge::worker::supervisor::ALLOWED_ENV_VARS;
use moodle_agent_bridge::worker::SpawnConfig;
use moodle_agent_bridge::AppError;

/// Temp dir holding a stand-in worker script.
fn script_dir() -> (tempfile::TempDir, String) {
    let temp = tempfile::tempdir().expect("tempdir");
    let script = temp.path().join("server.js");
    std::fs::write(&script, "// worker").expect("write script");
    let path = script.to_str().expect("utf8 path").to_owned();
    (temp, path)
}

fn sample_toml(script: &str) -> String {
    format!(
        r#"
[worker]
runtime = "node"
script_path = '{script}'
args = ["--stdio"]
inherit_env = ["PATH"]
startup_timeout_seconds = 10
shutdown_grace_millis = 500

[worker.env]
MOODLE_URL = "https://moodle.example.edu"

[rpc]
request_timeout_seconds = 45
handshake = false
max_message_bytes = 65536

[context]
default_course_id = 6
"#
    )
}

fn minimal_toml(script: &str) -> String {
    format!(
        r#"
[worker]
script_path = '{script}'
"#
    )
}

#[test]
fn parses_valid_config() {
    let (_temp, script) = script_dir();
    let config = GlobalConfig::from_toml_str(&sample_toml(&script)).expect("config parses");

    assert_eq!(config.worker.runtime, "node");
    assert_eq!(config.worker.args, vec!["--stdio".to_owned()]);
    assert_eq!(config.worker.inherit_env, Some(vec!["PATH".to_owned()]));
    assert_eq!(
        config.worker.env.get("MOODLE_URL").map(String::as_str),
        Some("https://moodle.example.edu")
    );
    assert_eq!(config.worker.startup_timeout_seconds, 10);
    assert_eq!(config.worker.shutdown_grace_millis, 500);
    assert_eq!(config.rpc.request_timeout_seconds, 45);
    assert!(!config.rpc.handshake);
    assert_eq!(config.rpc.max_message_bytes, 65_536);
    assert_eq!(config.context.default_course_id, Some(6));
    assert_eq!(config.context.user_token, None, "token never comes from TOML");
    assert!(config.worker.script_path.is_absolute());
}

#[test]
fn minimal_config_applies_defaults() {
    let (_temp, script) = script_dir();
    let config = GlobalConfig::from_toml_str(&minimal_toml(&script)).expect("config parses");

    assert_eq!(config.worker.runtime, "node");
    assert!(config.worker.args.is_empty());
    assert_eq!(config.worker.inherit_env, None);
    assert_eq!(config.worker.startup_timeout_seconds, 30);
    assert_eq!(config.worker.shutdown_grace_millis, 2000);
    assert_eq!(config.rpc.request_timeout_seconds, 120);
    assert!(config.rpc.handshake);
    assert_eq!(config.rpc.max_message_bytes, MAX_MESSAGE_BYTES);
    assert_eq!(config.context.default_course_id, None);
    assert_eq!(config.request_timeout(), Some(Duration::from_secs(120)));
}

#[test]
fn zero_request_timeout_means_no_deadline() {
    let (_temp, script) = script_dir();
    let toml = format!("{}\n[rpc]\nrequest_timeout_seconds = 0\n", minimal_toml(&script));
    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");
    assert_eq!(config.request_timeout(), None);
}

#[test]
fn missing_script_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("absent.js");
    let toml = minimal_toml(missing.to_str().expect("utf8"));

    let err = GlobalConfig::from_toml_str(&toml).expect_err("missing script must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("worker.script_path")));
}

#[test]
fn empty_runtime_is_rejected() {
    let (_temp, script) = script_dir();
    let toml = format!(
        r#"
[worker]
runtime = "  "
script_path = '{script}'
"#
    );
    let err = GlobalConfig::from_toml_str(&toml).expect_err("blank runtime must fail");
    assert_eq!(err, AppError::Config("worker.runtime must not be empty".into()));
}

#[test]
fn zero_startup_timeout_is_rejected() {
    let (_temp, script) = script_dir();
    let toml = format!(
        r#"
[worker]
script_path = '{script}'
startup_timeout_seconds = 0
"#
    );
    let err = GlobalConfig::from_toml_str(&toml).expect_err("zero startup timeout must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("startup_timeout_seconds")));
}

#[test]
fn invalid_toml_is_config_error() {
    let err = GlobalConfig::from_toml_str("[worker\nscript_path = 1").expect_err("bad toml");
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config")));
}

#[test]
fn missing_worker_section_is_rejected() {
    let err = GlobalConfig::from_toml_str("[rpc]\nhandshake = true\n").expect_err("no worker");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn load_from_path_reads_file() {
    let (temp, script) = script_dir();
    let config_path = temp.path().join("config.toml");
    std::fs::write(&config_path, sample_toml(&script)).expect("write config");

    let config = GlobalConfig::load_from_path(&config_path).expect("config loads");
    assert_eq!(config.context.default_course_id, Some(6));
}

#[test]
fn load_from_missing_path_is_config_error() {
    let err = GlobalConfig::load_from_path("/nonexistent/moodle-agent-bridge.toml")
        .expect_err("missing file");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("failed to read config")));
}

#[test]
fn spawn_config_uses_allowlist_when_inherit_env_unset() {
    let (_temp, script) = script_dir();
    let config = GlobalConfig::from_toml_str(&minimal_toml(&script)).expect("config parses");
    let spawn = SpawnConfig::from_worker_config(&config.worker);

    assert_eq!(spawn.inherit_env.len(), ALLOWED_ENV_VARS.len());
    assert!(spawn.inherit_env.iter().any(|key| key == "PATH"));
    assert_eq!(spawn.shutdown_grace, Duration::from_millis(2000));
}

#[test]
fn client_options_follow_config() {
    let (_temp, script) = script_dir();
    let config = GlobalConfig::from_toml_str(&sample_toml(&script)).expect("config parses");
    let options = ClientOptions::from_config(&config);

    assert_eq!(options.request_timeout, Some(Duration::from_secs(45)));
    assert!(!options.handshake);
    assert_eq!(options.startup_timeout, Duration::from_secs(10));
    assert_eq!(options.max_message_bytes, 65_536);
}
