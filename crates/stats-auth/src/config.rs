//! Stats authentication configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! held as a secret and redacted in Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default health authority cache TTL in seconds (5 minutes).
pub const DEFAULT_HA_CACHE_TTL_SECONDS: u64 = 300;

/// Upper bound on the health authority cache TTL (1 hour).
///
/// Bounds how long a revoked key or removed authority can stay trusted.
pub const MAX_HA_CACHE_TTL_SECONDS: u64 = 3600;

/// Default maximum number of cached issuers.
pub const DEFAULT_HA_CACHE_MAX_CAPACITY: u64 = 10_000;

/// Default timeout for one directory lookup in milliseconds.
pub const DEFAULT_DIRECTORY_TIMEOUT_MS: u64 = 5000;

/// Default leeway for `exp`/`nbf` in seconds. Expired tokens are rejected outright.
pub const DEFAULT_JWT_EXPIRY_LEEWAY_SECONDS: u64 = 0;

/// Stats authentication configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL for the health authority directory.
    pub database_url: SecretString,

    /// Audience every stats token must carry.
    pub stats_audience: String,

    /// How long resolved issuers (found or not found) stay cached.
    pub ha_cache_ttl: Duration,

    /// Maximum number of cached issuers.
    pub ha_cache_max_capacity: u64,

    /// Timeout applied to each directory lookup.
    pub directory_timeout: Duration,

    /// How far in the future `iat` may be. Zero disables the tolerance.
    pub jwt_clock_skew: Duration,

    /// Leeway applied to `exp`/`nbf`.
    pub jwt_expiry_leeway: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("stats_audience", &self.stats_audience)
            .field("ha_cache_ttl", &self.ha_cache_ttl)
            .field("ha_cache_max_capacity", &self.ha_cache_max_capacity)
            .field("directory_timeout", &self.directory_timeout)
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("jwt_expiry_leeway", &self.jwt_expiry_leeway)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid stats audience configuration: {0}")]
    InvalidStatsAudience(String),

    #[error("Invalid health authority cache configuration: {0}")]
    InvalidHaCache(String),

    #[error("Invalid directory timeout configuration: {0}")]
    InvalidDirectoryTimeout(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid JWT expiry leeway configuration: {0}")]
    InvalidJwtExpiryLeeway(String),
}

/// Parse an optional non-negative integer variable, falling back to `default`.
fn parse_u64(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    err: fn(String) -> ConfigError,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    value_str.parse().map_err(|e| {
        err(format!(
            "{} must be a valid non-negative integer, got '{}': {}",
            name, value_str, e
        ))
    })
}

/// Like [`parse_u64`], but zero is rejected.
fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    err: fn(String) -> ConfigError,
) -> Result<u64, ConfigError> {
    let value = parse_u64(vars, name, default, err)?;
    if value == 0 {
        return Err(err(format!("{} must be greater than 0", name)));
    }
    Ok(value)
}

/// Parse a seconds variable bounded by [`MAX_CLOCK_SKEW`]. Zero is allowed.
fn parse_skew_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    err: fn(String) -> ConfigError,
) -> Result<u64, ConfigError> {
    let value = parse_u64(vars, name, default, err)?;
    if value > MAX_CLOCK_SKEW.as_secs() {
        return Err(err(format!(
            "{} must not exceed {} seconds, got {}",
            name,
            MAX_CLOCK_SKEW.as_secs(),
            value
        )));
    }
    Ok(value)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let stats_audience = vars
            .get("STATS_AUDIENCE")
            .ok_or_else(|| ConfigError::MissingEnvVar("STATS_AUDIENCE".to_string()))?
            .trim()
            .to_string();
        if stats_audience.is_empty() {
            return Err(ConfigError::InvalidStatsAudience(
                "STATS_AUDIENCE must not be empty".to_string(),
            ));
        }

        let ha_cache_ttl_seconds = parse_positive(
            vars,
            "HA_CACHE_TTL_SECONDS",
            DEFAULT_HA_CACHE_TTL_SECONDS,
            ConfigError::InvalidHaCache,
        )?;
        if ha_cache_ttl_seconds > MAX_HA_CACHE_TTL_SECONDS {
            return Err(ConfigError::InvalidHaCache(format!(
                "HA_CACHE_TTL_SECONDS must not exceed {} seconds, got {}",
                MAX_HA_CACHE_TTL_SECONDS, ha_cache_ttl_seconds
            )));
        }

        let ha_cache_max_capacity = parse_positive(
            vars,
            "HA_CACHE_MAX_CAPACITY",
            DEFAULT_HA_CACHE_MAX_CAPACITY,
            ConfigError::InvalidHaCache,
        )?;

        let directory_timeout_ms = parse_positive(
            vars,
            "DIRECTORY_TIMEOUT_MS",
            DEFAULT_DIRECTORY_TIMEOUT_MS,
            ConfigError::InvalidDirectoryTimeout,
        )?;

        let jwt_clock_skew_seconds = parse_skew_seconds(
            vars,
            "JWT_CLOCK_SKEW_SECONDS",
            DEFAULT_CLOCK_SKEW.as_secs(),
            ConfigError::InvalidJwtClockSkew,
        )?;

        let jwt_expiry_leeway_seconds = parse_skew_seconds(
            vars,
            "JWT_EXPIRY_LEEWAY_SECONDS",
            DEFAULT_JWT_EXPIRY_LEEWAY_SECONDS,
            ConfigError::InvalidJwtExpiryLeeway,
        )?;

        Ok(Config {
            database_url: SecretString::from(database_url.as_str()),
            stats_audience,
            ha_cache_ttl: Duration::from_secs(ha_cache_ttl_seconds),
            ha_cache_max_capacity,
            directory_timeout: Duration::from_millis(directory_timeout_ms),
            jwt_clock_skew: Duration::from_secs(jwt_clock_skew_seconds),
            jwt_expiry_leeway: Duration::from_secs(jwt_expiry_leeway_seconds),
        })
    }
}
