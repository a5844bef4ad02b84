//! Unit tests for `AppError` display format and conversions.

use progress_stream::AppError;

#[test]
fn display_uses_kind_prefix() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(AppError::Db("locked".into()).to_string(), "db: locked");
    assert_eq!(AppError::Step("boom".into()).to_string(), "step: boom");
    assert_eq!(
        AppError::Transport("reset".into()).to_string(),
        "transport: reset"
    );
}

#[test]
fn request_error_displays_payload_json() {
    let err = AppError::Request(serde_json::json!({ "message": "nope" }));
    assert_eq!(err.to_string(), r#"request error: {"message":"nope"}"#);
}

#[test]
fn messages_have_no_trailing_period() {
    let errors = [
        AppError::Serialization("eof".into()),
        AppError::Unsettled("dropped".into()),
        AppError::NotFound("op".into()),
        AppError::Io("write failed".into()),
    ];
    for err in errors {
        let s = err.to_string();
        assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
    }
}

#[test]
fn json_errors_convert_to_serialization() {
    let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
    let err: AppError = parse.unwrap_err().into();
    assert!(matches!(err, AppError::Serialization(_)));
}

#[test]
fn toml_errors_convert_to_config() {
    let parse: Result<toml::Value, _> = toml::from_str("= nope");
    let err: AppError = parse.unwrap_err().into();
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn implements_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(AppError::Step("x".into()));
    assert_eq!(err.to_string(), "step: x");
}
