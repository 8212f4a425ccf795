//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `FRIENDLY_URLS` (optional): read the API path after `/api/` instead of from the query string, defaults to true
/// - `DEV_MODE` (optional): expose internal error messages to clients, defaults to false
/// - `ENABLE_TEST_KEY` (optional): let the `test` key skip IP and URL-parameter restrictions
/// - `ALLOW_KEY_AS_URL_PARAM` (optional): accept `?key=` for deployments that cannot forward `Authorization`
/// - `TRUST_PROXY_HEADERS` (optional): take the caller IP from `X-Forwarded-For`
/// - `LOG_ALL_REQUESTS` (optional): write an audit entry for every request
/// - `DISABLED_APPS` (optional): comma separated application tokens that are switched off
/// - `SUPPORTED_LANGUAGES` (optional): comma separated values accepted in `X-Language`, defaults to `en`
/// - `BAN_CACHE_TTL_SECS` (optional): how long a cached ban list may be reused, defaults to 60
/// - `CORS_PERMISSIVE` (optional): attach a permissive CORS layer
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_true")]
    pub friendly_urls: bool,

    #[serde(default)]
    pub dev_mode: bool,

    #[serde(default)]
    pub enable_test_key: bool,

    #[serde(default)]
    pub allow_key_as_url_param: bool,

    #[serde(default)]
    pub trust_proxy_headers: bool,

    #[serde(default)]
    pub log_all_requests: bool,

    #[serde(default)]
    pub disabled_apps: Vec<String>,

    #[serde(default = "default_languages")]
    pub supported_languages: Vec<String>,

    #[serde(default = "default_ban_cache_ttl")]
    pub ban_cache_ttl_secs: u64,

    #[serde(default)]
    pub cors_permissive: bool,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_ban_cache_ttl() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            server_port: default_port(),
            database_max_connections: default_max_connections(),
            friendly_urls: true,
            dev_mode: false,
            enable_test_key: false,
            allow_key_as_url_param: false,
            trust_proxy_headers: false,
            log_all_requests: false,
            disabled_apps: Vec::new(),
            supported_languages: default_languages(),
            ban_cache_ttl_secs: default_ban_cache_ttl(),
            cors_permissive: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        let config = envy::from_env::<Config>()?;

        if config.database_url.is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        Ok(config)
    }

    /// Whether an application token is listed in `DISABLED_APPS`.
    pub fn is_app_disabled(&self, app: &str) -> bool {
        self.disabled_apps
            .iter()
            .any(|disabled| disabled.trim().eq_ignore_ascii_case(app))
    }
}

/// Configuration loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment: {0}")]
    Env(#[from] envy::Error),

    #[error("DATABASE_URL must be set")]
    MissingDatabaseUrl,
}
