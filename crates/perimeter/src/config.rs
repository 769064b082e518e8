use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::PerimeterError;

/// Upper bound for `default_expiry_days` (about a century).
pub const MAX_EXPIRY_DAYS: i64 = 36_500;

/// Upper bound for `cache_ttl_secs` (ten years).
pub const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Gate configuration.
///
/// Built once at startup and handed to [`Gate`](crate::gate::Gate) and
/// [`TokenStore`](crate::store::TokenStore); nothing in the crate reads
/// the environment after that.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// When `false` the middleware lets every request through (default: false).
    pub enabled: bool,

    /// Session key holding the accepted token (default: "perimeter").
    pub session_key: String,

    /// Days until a freshly issued token expires (default: 7).
    pub default_expiry_days: i64,

    /// Length of generated tokens, and the maximum for supplied ones (default: 10).
    pub token_length: usize,

    /// Path of the token entry endpoint (default: "/perimeter/").
    pub gateway_path: String,

    /// Path prefixes that skip the gate entirely.
    pub bypass_paths: Vec<String>,

    /// Safety-net TTL for cached tokens in seconds; 0 disables (default: 30 days).
    pub cache_ttl_secs: u64,

    /// Database connection URL (e.g. sqlite://perimeter.db, postgres://...)
    pub database_url: String,

    /// Redis URL for the shared token cache (optional)
    pub redis_url: Option<String>,

    /// Environment: development, production, test
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled: false,
            session_key: "perimeter".to_string(),
            default_expiry_days: 7,
            token_length: 10,
            gateway_path: "/perimeter/".to_string(),
            bypass_paths: Vec::new(),
            cache_ttl_secs: 30 * 24 * 60 * 60,
            database_url: "sqlite://perimeter.db?mode=rwc".to_string(),
            redis_url: None,
            environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (with .env support).
    pub fn from_env() -> Result<Self, PerimeterError> {
        // Load .env file if present (ignore errors if missing)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PerimeterError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Config {
            enabled: var("PERIMETER_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults.enabled),
            session_key: var("PERIMETER_SESSION_KEY").unwrap_or(defaults.session_key),
            default_expiry_days: parse_number(
                "PERIMETER_DEFAULT_EXPIRY",
                var("PERIMETER_DEFAULT_EXPIRY"),
                defaults.default_expiry_days,
            )?,
            token_length: parse_number(
                "PERIMETER_TOKEN_LENGTH",
                var("PERIMETER_TOKEN_LENGTH"),
                defaults.token_length,
            )?,
            gateway_path: var("PERIMETER_GATEWAY_PATH").unwrap_or(defaults.gateway_path),
            bypass_paths: var("PERIMETER_BYPASS_PATHS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            cache_ttl_secs: parse_number(
                "PERIMETER_CACHE_TTL_SECS",
                var("PERIMETER_CACHE_TTL_SECS"),
                defaults.cache_ttl_secs,
            )?,
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
            redis_url: var("REDIS_URL"),
            environment: var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
        .validated()
    }

    /// Reject settings the gate cannot work with. `from_env` always calls
    /// this; call it yourself when building a `Config` by hand.
    pub fn validated(self) -> Result<Self, PerimeterError> {
        if !(0..=MAX_EXPIRY_DAYS).contains(&self.default_expiry_days) {
            return Err(PerimeterError::Config(format!(
                "PERIMETER_DEFAULT_EXPIRY must be between 0 and {MAX_EXPIRY_DAYS}: {}",
                self.default_expiry_days
            )));
        }
        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(PerimeterError::Config(format!(
                "PERIMETER_CACHE_TTL_SECS must be at most {MAX_CACHE_TTL_SECS}: {}",
                self.cache_ttl_secs
            )));
        }
        if self.token_length == 0 {
            return Err(PerimeterError::Config(
                "PERIMETER_TOKEN_LENGTH must be at least 1".to_string(),
            ));
        }
        if !self.gateway_path.starts_with('/') {
            return Err(PerimeterError::Config(format!(
                "PERIMETER_GATEWAY_PATH must start with '/': {}",
                self.gateway_path
            )));
        }
        Ok(self)
    }

    /// Check if running in development mode.
    pub fn is_dev(&self) -> bool {
        self.environment == "development"
    }

    /// TTL applied to cache writes, if any.
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_number<T: FromStr>(
    name: &str,
    value: Option<String>,
    default: T,
) -> Result<T, PerimeterError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PerimeterError::Config(format!("invalid {name}: {raw}"))),
        None => Ok(default),
    }
}
