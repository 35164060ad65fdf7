//! Configuration management utilities

use crate::LogFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading application settings
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Parse failure detail
        message: String,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (dev, prod, etc.)
    pub environment: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "analysis-engine".to_string(),
            environment: "development".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load settings from `APP_NAME`, `APP_ENV` and `LOG_FORMAT`
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(name) = lookup("APP_NAME") {
            config.app_name = name;
        }
        if let Some(env) = lookup("APP_ENV") {
            config.environment = env;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.log_format = format.parse().map_err(|message| ConfigError::InvalidValue {
                key: "LOG_FORMAT".to_string(),
                message,
            })?;
        }

        Ok(config)
    }

    /// Whether this is a production deployment
    pub fn is_production(&self) -> bool {
        matches!(self.environment.as_str(), "prod" | "production")
    }
}
