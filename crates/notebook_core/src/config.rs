//! Notebook model configuration.
//!
//! # Responsibility
//! - Carry document defaults used when a notebook has no kernel metadata.
//! - Parse overrides from JSON, falling back to defaults per field.
//!
//! # Invariants
//! - Only nbformat major version 4 is supported.
//! - `log_level` must be one of the levels accepted by `init_logging`.

use crate::logging::{default_log_level, normalize_level};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Supported nbformat major version.
pub const NBFORMAT_MAJOR: u32 = 4;
/// nbformat minor version written by this model.
pub const NBFORMAT_MINOR: u32 = 5;

/// Document-level defaults for notebook models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotebookConfig {
    /// Language reported when `language_info` is unset.
    pub default_language: String,
    /// Kernel name reported when `kernelspec` is unset.
    pub default_kernel_name: String,
    pub nbformat: u32,
    pub nbformat_minor: u32,
    pub log_level: String,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            default_language: "python".to_string(),
            default_kernel_name: "python3".to_string(),
            nbformat: NBFORMAT_MAJOR,
            nbformat_minor: NBFORMAT_MINOR,
            log_level: default_log_level().to_string(),
        }
    }
}

impl NotebookConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_language.trim().is_empty() {
            return Err(ConfigError::EmptyField("default_language"));
        }
        if self.default_kernel_name.trim().is_empty() {
            return Err(ConfigError::EmptyField("default_kernel_name"));
        }
        if self.nbformat != NBFORMAT_MAJOR {
            return Err(ConfigError::UnsupportedFormat(self.nbformat));
        }
        normalize_level(&self.log_level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))?;
        Ok(())
    }
}

/// Configuration parse/validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    EmptyField(&'static str),
    UnsupportedFormat(u32),
    InvalidLogLevel(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(details) => write!(f, "invalid notebook config: {details}"),
            Self::EmptyField(field) => write!(f, "config field `{field}` must not be empty"),
            Self::UnsupportedFormat(major) => {
                write!(f, "unsupported nbformat major version: {major}")
            }
            Self::InvalidLogLevel(level) => write!(f, "invalid log level in config: `{level}`"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, NotebookConfig, NBFORMAT_MAJOR};

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = NotebookConfig::from_json_str(r#"{"default_language": "julia"}"#)
            .expect("partial config parses");
        assert_eq!(config.default_language, "julia");
        assert_eq!(config.default_kernel_name, "python3");
        assert_eq!(config.nbformat, NBFORMAT_MAJOR);
    }

    #[test]
    fn rejects_unsupported_major_version() {
        let err = NotebookConfig::from_json_str(r#"{"nbformat": 3}"#).expect_err("v3 rejected");
        assert_eq!(err, ConfigError::UnsupportedFormat(3));
    }

    #[test]
    fn rejects_blank_language_and_bad_level() {
        let err = NotebookConfig::from_json_str(r#"{"default_language": "  "}"#)
            .expect_err("blank language");
        assert_eq!(err, ConfigError::EmptyField("default_language"));

        let err = NotebookConfig::from_json_str(r#"{"log_level": "loud"}"#)
            .expect_err("bad level");
        assert!(matches!(err, ConfigError::InvalidLogLevel(_)));
    }
}
