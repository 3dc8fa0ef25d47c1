//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::Currency;
use crate::handlers::EngineSettings;
use crate::jobs::JobSchedulerConfig;

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

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Currency for wallets and commands that name none
    pub default_currency: Currency,

    /// Deadline for one unit of work
    pub unit_of_work_timeout: Duration,

    /// Maximum wait for a single row lock
    pub lock_timeout: Duration,

    pub overdue_sweep_interval: Duration,

    pub reminder_interval: Duration,

    pub log_format: LogFormat,
}

/// Read an optional variable, falling back to `default`
fn env_or<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "text".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            _ => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        Ok(Self {
            database_url,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", "10")?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_or("PORT", "3000")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            default_currency: env_or("DEFAULT_CURRENCY", crate::domain::DEFAULT_CURRENCY)?,
            unit_of_work_timeout: Duration::from_millis(env_or("UNIT_OF_WORK_TIMEOUT_MS", "5000")?),
            lock_timeout: Duration::from_millis(env_or("LOCK_TIMEOUT_MS", "3000")?),
            overdue_sweep_interval: Duration::from_secs(env_or(
                "OVERDUE_SWEEP_INTERVAL_SECS",
                "3600",
            )?),
            reminder_interval: Duration::from_secs(env_or("REMINDER_INTERVAL_SECS", "86400")?),
            log_format,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            unit_of_work_timeout: self.unit_of_work_timeout,
            default_currency: self.default_currency.clone(),
        }
    }

    pub fn scheduler_config(&self) -> JobSchedulerConfig {
        JobSchedulerConfig {
            overdue_sweep_interval: self.overdue_sweep_interval,
            reminder_interval: self.reminder_interval,
        }
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

    #[test]
    fn test_env_or_default_and_invalid() {
        let port: u16 = env_or("LEDGER_TEST_UNSET_PORT", "3000").unwrap();
        assert_eq!(port, 3000);

        let bad: Result<u16, _> = env_or("LEDGER_TEST_UNSET_PORT", "not-a-port");
        assert!(matches!(bad, Err(ConfigError::InvalidValue("LEDGER_TEST_UNSET_PORT"))));
    }

    #[test]
    fn test_default_currency_parses() {
        let currency: Currency = env_or("LEDGER_TEST_UNSET_CURRENCY", "etb").unwrap();
        assert_eq!(currency.as_str(), "ETB");
    }
}
