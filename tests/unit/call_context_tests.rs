use moodle_agent_bridge::config::ContextConfig;
use moodle_agent_bridge::dispatch::CallContext;
use moodle_agent_bridge::AppError;

#[test]
fn context_from_config_copies_values() {
    let config = ContextConfig {
        default_course_id: Some(6),
        user_token: Some("tok".into()),
    };
    let ctx = CallContext::from_config(&config);
    assert_eq!(ctx, CallContext::new(Some("tok".into()), Some(6)));
}

#[test]
fn require_token_returns_credential() {
    let ctx = CallContext::new(Some("tok".into()), None);
    assert_eq!(ctx.require_token("get_courses").expect("token"), "tok");
}

#[test]
fn empty_token_is_unauthorized() {
    let ctx = CallContext::new(Some(String::new()), None);
    let err = ctx.require_token("get_course_contents").expect_err("empty token");
    assert_eq!(
        err,
        AppError::Unauthorized("no user credential available for get_course_contents".into())
    );
}

#[test]
fn debug_output_redacts_token() {
    let ctx = CallContext::new(Some("super-secret".into()), Some(3));
    let debug = format!("{ctx:?}");
    assert!(!debug.contains("super-secret"));
    assert!(debug.contains("<redacted>"));
    assert!(debug.contains('3'));
}
