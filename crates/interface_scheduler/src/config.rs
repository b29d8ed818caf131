//! Sweep configuration
//!
//! Read from `SWEEP_*` environment variables (a `.env` file is loaded first
//! by the binary); anything unset falls back to the defaults below.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use core_kernel::{Currency, Timezone};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("unknown timezone: {0}")]
    Timezone(String),

    #[error("unknown currency: {0}")]
    Currency(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Database URL
    pub database_url: String,
    /// Log level, overridden by `RUST_LOG`
    pub log_level: String,
    /// IANA name of the household's timezone
    pub timezone: String,
    /// ISO 4217 code of the household currency
    pub currency: String,
    /// Seconds between sweeps; 0 runs a single sweep and exits
    pub interval_secs: u64,
    pub max_connections: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/household".to_string(),
            log_level: "info".to_string(),
            timezone: "Europe/Warsaw".to_string(),
            currency: "PLN".to_string(),
            interval_secs: 0,
            max_connections: 2,
        }
    }
}

impl SweepConfig {
    /// Loads configuration from `SWEEP_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(config::Environment::with_prefix("SWEEP"))
    }

    /// Loads configuration from any `config` source, over the defaults
    pub fn from_source<S>(source: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn household_timezone(&self) -> Result<Timezone, ConfigError> {
        Timezone::parse(&self.timezone).map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    pub fn household_currency(&self) -> Result<Currency, ConfigError> {
        Currency::from_code(&self.currency).ok_or_else(|| ConfigError::Currency(self.currency.clone()))
    }

    /// None when the sweep should run once
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}
