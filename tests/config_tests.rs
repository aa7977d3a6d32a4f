use std::env;
use std::time::Duration;

use serial_test::serial;

use pawnshop_admin::config::AdminConfig;
use pawnshop_admin::errors::AdminError;

const VARS: &[&str] = &[
    "PAWNSHOP_API_URL",
    "PAWNSHOP_SESSION_TIMEOUT_SECS",
    "PAWNSHOP_SESSION_WARNING_SECS",
    "PAWNSHOP_SESSION_TIMER_ENABLED",
    "PAWNSHOP_CACHE_TTL_SECS",
    "PAWNSHOP_RETRY_MAX_ATTEMPTS",
    "PAWNSHOP_LOG_LEVEL",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn defaults_load_and_validate() {
    clear_env();
    let config = AdminConfig::load().unwrap();

    assert_eq!(config.session.timeout(), Duration::from_secs(900));
    assert_eq!(config.session.warning_lead(), Duration::from_secs(60));
    assert!(config.session.timer_enabled);
    assert!(!config.session.activity_exits_warning);
    assert!(config.retry.max_attempts >= 1);
    assert!(!config.logging.enabled);
}

#[test]
#[serial]
fn env_overrides_file_and_defaults() {
    clear_env();
    env::set_var("PAWNSHOP_API_URL", "https://shop.example:8443");
    env::set_var("PAWNSHOP_SESSION_TIMEOUT_SECS", "300");
    env::set_var("PAWNSHOP_SESSION_WARNING_SECS", "30");
    env::set_var("PAWNSHOP_SESSION_TIMER_ENABLED", "false");
    env::set_var("PAWNSHOP_RETRY_MAX_ATTEMPTS", "5");

    let config = AdminConfig::load();
    clear_env();
    let config = config.unwrap();

    assert_eq!(config.api.base_url, "https://shop.example:8443");
    assert_eq!(config.session.timeout(), Duration::from_secs(300));
    assert_eq!(config.session.warning_lead(), Duration::from_secs(30));
    assert!(!config.session.timer_enabled);
    assert_eq!(config.retry.max_attempts, 5);
}

#[test]
#[serial]
fn warning_must_fit_inside_timeout() {
    clear_env();
    env::set_var("PAWNSHOP_SESSION_TIMEOUT_SECS", "60");
    env::set_var("PAWNSHOP_SESSION_WARNING_SECS", "60");

    let result = AdminConfig::load();
    clear_env();
    assert!(matches!(result, Err(AdminError::ConfigError(_))));
}

#[test]
#[serial]
fn unknown_log_level_is_rejected() {
    clear_env();
    env::set_var("PAWNSHOP_LOG_LEVEL", "chatty");

    let result = AdminConfig::load();
    clear_env();
    assert!(matches!(result, Err(AdminError::ConfigError(_))));
}

#[test]
#[serial]
fn unparseable_numbers_fall_back_to_defaults() {
    clear_env();
    env::set_var("PAWNSHOP_CACHE_TTL_SECS", "soon");

    let config = AdminConfig::load();
    clear_env();
    assert_eq!(config.unwrap().cache.ttl(), AdminConfig::default().cache.ttl());
}

#[test]
fn api_url_must_be_http() {
    let mut config = AdminConfig::default();
    config.api.base_url = "ftp://shop".to_string();
    assert!(config.validate().is_err());

    config.api.base_url = "http://shop".to_string();
    assert!(config.validate().is_ok());
}
