use serial_test::serial;
use std::{env, panic};
use wemorize::{
    AppConfig,
    config::{ConfigError, Env},
};

const CONFIG_VARS: [&str; 5] = [
    "APP_ENV",
    "BASE_URL",
    "ENABLE_REGISTRATION",
    "LISTEN_ADDR",
    "INSTANCE_NAME",
];

// --- Setup/Teardown Utilities ---

/// Runs `test` with the config variables set to `vars` (everything else cleared), then
/// restores whatever the environment held before.
fn run_with_env<T, R>(vars: &[(&'static str, &str)], test: T) -> R
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    let originals: Vec<(&str, Option<String>)> = CONFIG_VARS
        .iter()
        .map(|&var| (var, env::var(var).ok()))
        .collect();

    unsafe {
        for var in CONFIG_VARS {
            env::remove_var(var);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    let result = panic::catch_unwind(test);

    for (key, original_value) in originals.into_iter().rev() {
        unsafe {
            if let Some(val) = original_value {
                env::set_var(key, val);
            } else {
                env::remove_var(key);
            }
        }
    }

    match result {
        Ok(value) => value,
        Err(e) => panic::resume_unwind(e),
    }
}

// --- Tests ---

#[test]
#[serial]
fn test_production_requires_base_url() {
    let result = run_with_env(&[("APP_ENV", "production")], AppConfig::load);
    assert!(matches!(result, Err(ConfigError::Missing("BASE_URL"))));
}

#[test]
#[serial]
fn test_production_over_https() {
    let config = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("BASE_URL", "https://learn.example.org/"),
            ("INSTANCE_NAME", "Example Learning"),
        ],
        AppConfig::load,
    )
    .unwrap();

    assert_eq!(config.env, Env::Production);
    assert!(config.cookie.secure);
    assert_eq!(config.cookie.domain.as_deref(), Some("learn.example.org"));
    assert_eq!(config.instance_name, "Example Learning");
    // Registration is opt-in outside local mode.
    assert!(!config.enable_registration);
}

#[test]
#[serial]
fn test_local_env_defaults() {
    let config = run_with_env(&[], AppConfig::load).unwrap();

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.listen_addr, "127.0.0.1:3000");
    assert_eq!(config.base_url, "http://localhost:3000/");
    assert!(config.enable_registration);
    assert!(!config.cookie.secure);
    assert_eq!(config.cookie.path, "/");
}

#[test]
#[serial]
fn test_invalid_registration_flag() {
    let result = run_with_env(&[("ENABLE_REGISTRATION", "sometimes")], AppConfig::load);
    match result {
        Err(ConfigError::InvalidFlag { name, value }) => {
            assert_eq!(name, "ENABLE_REGISTRATION");
            assert_eq!(value, "sometimes");
        }
        other => panic!("expected InvalidFlag, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_invalid_base_url() {
    let result = run_with_env(&[("BASE_URL", "not a url")], AppConfig::load);
    assert!(matches!(result, Err(ConfigError::InvalidBaseUrl(_))));
}
