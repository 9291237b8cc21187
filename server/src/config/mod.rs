use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::registry::RegistrySettings;
use crate::store::RetryPolicy;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::{create_security_headers_layer, SecurityHeadersLayer};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}': expected {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub production: bool,
    pub cors_allowed_origins: Vec<String>,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub allow_waitlist: bool,
    pub promote_waitlist: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            production: false,
            cors_allowed_origins: split_origins(DEFAULT_ALLOWED_ORIGINS),
            retry_attempts: RetryPolicy::default().max_attempts,
            retry_backoff: RetryPolicy::default().base_backoff,
            allow_waitlist: true,
            promote_waitlist: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Config::default();

        let bind = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind.trim().parse().map_err(|_| ConfigError::Invalid {
            key: "BIND_ADDR",
            value: bind.clone(),
            expected: "a socket address such as 0.0.0.0:3001",
        })?;

        Ok(Self {
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_number(
                "DATABASE_MAX_CONNECTIONS",
                var("DATABASE_MAX_CONNECTIONS"),
                defaults.database_max_connections,
            )?,
            bind_addr,
            production: var("RUST_ENV")
                .map(|v| v.trim().eq_ignore_ascii_case("production"))
                .unwrap_or(false),
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS")
                .map(|v| split_origins(&v))
                .unwrap_or(defaults.cors_allowed_origins),
            retry_attempts: parse_number(
                "STORE_RETRY_ATTEMPTS",
                var("STORE_RETRY_ATTEMPTS"),
                defaults.retry_attempts,
            )?,
            retry_backoff: Duration::from_millis(parse_number(
                "STORE_RETRY_BACKOFF_MS",
                var("STORE_RETRY_BACKOFF_MS"),
                defaults.retry_backoff.as_millis() as u64,
            )?),
            allow_waitlist: parse_flag(
                "ALLOW_WAITLIST",
                var("ALLOW_WAITLIST"),
                defaults.allow_waitlist,
            )?,
            promote_waitlist: parse_flag(
                "PROMOTE_WAITLIST",
                var("PROMOTE_WAITLIST"),
                defaults.promote_waitlist,
            )?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_backoff)
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            allow_waitlist: self.allow_waitlist,
            promote_waitlist: self.promote_waitlist,
            retry: self.retry_policy(),
        }
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value,
            expected: "a non-negative integer",
        }),
    }
}

fn parse_flag(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = raw else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value,
            expected: "true or false",
        }),
    }
}
