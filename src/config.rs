//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Connections kept open when idle
    pub database_min_connections: u32,

    /// Recycle connections after this long
    pub database_max_lifetime: Duration,

    /// How long a request waits for a pooled connection
    pub database_acquire_timeout: Duration,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Default deadline for a request's unit of work
    pub operation_timeout: Duration,

    /// Outbox dispatcher poll interval
    pub outbox_poll_interval: Duration,

    /// Events fetched per dispatcher pass
    pub outbox_batch_size: i64,

    /// Published outbox rows older than this are purged
    pub outbox_retention: Duration,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(_) => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        let outbox_batch_size: i64 = parse_or(&lookup, "OUTBOX_BATCH_SIZE", 100)?;
        if outbox_batch_size <= 0 {
            return Err(ConfigError::InvalidValue("OUTBOX_BATCH_SIZE"));
        }

        let config = Self {
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            database_min_connections: parse_or(&lookup, "DATABASE_MIN_CONNECTIONS", 1)?,
            database_max_lifetime: Duration::from_secs(parse_or(
                &lookup,
                "DATABASE_MAX_LIFETIME_SECS",
                1800,
            )?),
            database_acquire_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                5,
            )?),
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            operation_timeout: Duration::from_millis(parse_or(
                &lookup,
                "OPERATION_TIMEOUT_MS",
                5000,
            )?),
            outbox_poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "OUTBOX_POLL_INTERVAL_MS",
                1000,
            )?),
            outbox_batch_size,
            outbox_retention: Duration::from_secs(
                parse_or::<u64, _>(&lookup, "OUTBOX_RETENTION_HOURS", 168)? * 3600,
            ),
            log_format,
        };

        if config.database_min_connections > config.database_max_connections {
            return Err(ConfigError::InvalidValue("DATABASE_MIN_CONNECTIONS"));
        }
        if config.outbox_poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue("OUTBOX_POLL_INTERVAL_MS"));
        }

        Ok(config)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/ledger")]))
            .unwrap();

        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.port, 3000);
        assert_eq!(config.operation_timeout, Duration::from_millis(5000));
        assert_eq!(config.outbox_batch_size, 100);
        assert_eq!(config.outbox_retention, Duration::from_secs(168 * 3600));
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(!config.is_production());
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
    }

    #[test]
    fn test_missing_database_url() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("DATABASE_URL")));
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("PORT")));

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("LOG_FORMAT", "xml"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("LOG_FORMAT")));

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("DATABASE_MIN_CONNECTIONS", "20"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue("DATABASE_MIN_CONNECTIONS")
        ));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("OPERATION_TIMEOUT_MS", "250"),
            ("LOG_FORMAT", "json"),
            ("ENVIRONMENT", "production"),
        ]))
        .unwrap();

        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.is_production());
    }
}
