use docchat::config::{API_KEY_VAR, AppConfig, load_gemini_settings};
use docchat::ingest::AcceptProfile;
use serial_test::serial;
use std::env;
use std::fs;

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("DOCCHAT_SERVER__PORT");
        env::remove_var("DOCCHAT_CHAT__HISTORY_TURNS");
        env::remove_var("DOCCHAT_PROFILE");
        env::remove_var("CONFIG_FILE");
        env::remove_var("PORT");
        env::remove_var(API_KEY_VAR);
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(["docchat"]).expect("Failed to load defaults");
    assert_eq!(config.server.port, 8501);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.max_upload_bytes, 200 * 1024 * 1024);
    assert_eq!(config.ingest.profile, AcceptProfile::Documents);
    assert_eq!(config.chat.model, "gemini-2.0-flash-exp");
    assert_eq!(config.chat.history_turns, None);
    assert_eq!(config.session.idle_timeout_secs, 1800);
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("DOCCHAT_SERVER__PORT", "9090");
        env::set_var("DOCCHAT_CHAT__HISTORY_TURNS", "6");
    }

    let config = AppConfig::load_from_args(["docchat"]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.chat.history_turns, Some(6));
    assert_eq!(config.chat.context_policy().name(), "recent");

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_beats_env() {
    clear_env_vars();
    unsafe {
        env::set_var("DOCCHAT_SERVER__PORT", "9090");
    }

    let config = AppConfig::load_from_args(["docchat", "--port", "7000", "--profile", "Excel"])
        .expect("Failed to load config");
    assert_eq!(config.server.port, 7000);
    assert_eq!(config.ingest.profile, AcceptProfile::Excel);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("docchat.yaml");
    fs::write(
        &file_path,
        r#"
server:
  port: 7070
ingest:
  profile: excel
chat:
  model: gemini-1.5-pro
"#,
    )
    .expect("Failed to write temp config");

    let config = AppConfig::load_from_args(["docchat", "--config", file_path.to_str().unwrap()])
        .expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.ingest.profile, AcceptProfile::Excel);
    assert_eq!(config.chat.model, "gemini-1.5-pro");
    // Unset keys keep their defaults
    assert_eq!(config.session.idle_timeout_secs, 1800);
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env_vars();

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yaml");
    assert!(AppConfig::load_from_args(["docchat", "--config", missing.to_str().unwrap()]).is_err());
}

#[test]
#[serial]
fn test_cwd_config_fallback() {
    clear_env_vars();

    let cwd_path = "config.yaml";
    fs::write(cwd_path, "server:\n  port: 6060\n").expect("Failed to write ./config.yaml");

    let config = AppConfig::load_from_args(["docchat"]);

    fs::remove_file(cwd_path).unwrap();
    assert_eq!(config.expect("Failed to load config").server.port, 6060);
}

#[test]
#[serial]
fn test_gemini_settings_require_key() {
    clear_env_vars();
    let config = AppConfig::load_from_args(["docchat"]).unwrap();

    let err = load_gemini_settings(&config.chat).unwrap_err();
    assert!(err.contains("GEMINI_API_KEY"));

    unsafe {
        env::set_var(API_KEY_VAR, "  ");
    }
    assert!(load_gemini_settings(&config.chat).is_err());

    unsafe {
        env::set_var(API_KEY_VAR, "secret");
    }
    let settings = load_gemini_settings(&config.chat).unwrap();
    assert_eq!(settings.api_key, "secret");
    assert_eq!(settings.model, config.chat.model);
    assert_eq!(
        settings.base_url,
        "https://generativelanguage.googleapis.com"
    );

    clear_env_vars();
}
