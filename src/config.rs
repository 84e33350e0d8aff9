use std::env;
use thiserror::Error;
use url::Url;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_BASE_URL: &str = "http://localhost:3000/";
const DEFAULT_INSTANCE_NAME: &str = "Wemorize";

/// AppConfig
///
/// Immutable configuration loaded once at startup and shared through `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Selects log format and how strict loading is.
    pub env: Env,
    // Socket address the HTTP server binds to.
    pub listen_addr: String,
    // Public URL of the instance, e.g. "https://learn.example.org/".
    pub base_url: String,
    pub instance_name: String,
    pub enable_registration: bool,
    // Session cookie attributes derived from `base_url`.
    pub cookie: CookieSettings,
}

/// Env
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// CookieSettings
///
/// Attributes of the session cookie that depend on where the instance is served from:
/// `Secure` iff the base URL is https, `Domain` is its host, `Path` its path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieSettings {
    pub secure: bool,
    pub domain: Option<String>,
    pub path: String,
}

impl CookieSettings {
    pub fn from_base_url(url: &Url) -> Self {
        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };
        Self {
            secure: url.scheme() == "https",
            domain: url.host_str().map(str::to_string),
            path,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),
    #[error("BASE_URL is not a valid URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("{name} must be `true` or `false`, got `{value}`")]
    InvalidFlag { name: &'static str, value: String },
}

impl Default for AppConfig {
    /// Safe configuration for tests: local mode, plain http on localhost, registration on.
    fn default() -> Self {
        Self {
            env: Env::Local,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
            enable_registration: true,
            cookie: CookieSettings {
                secure: false,
                domain: Some("localhost".to_string()),
                path: "/".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables (populate them from `.env` with
    /// `dotenv` first). Production refuses to start without an explicit `BASE_URL`, since
    /// cookie security attributes are derived from it.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let base_url = match (env, env::var("BASE_URL")) {
            (_, Ok(url)) => url,
            (Env::Production, Err(_)) => return Err(ConfigError::Missing("BASE_URL")),
            (Env::Local, Err(_)) => DEFAULT_BASE_URL.to_string(),
        };
        let cookie = CookieSettings::from_base_url(&Url::parse(&base_url)?);

        let enable_registration = match env::var("ENABLE_REGISTRATION") {
            Ok(value) => parse_flag("ENABLE_REGISTRATION", &value)?,
            Err(_) => env == Env::Local,
        };

        Ok(Self {
            env,
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string()),
            base_url,
            instance_name: env::var("INSTANCE_NAME")
                .unwrap_or_else(|_| DEFAULT_INSTANCE_NAME.to_string()),
            enable_registration,
            cookie,
        })
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name,
            value: value.to_string(),
        }),
    }
}
