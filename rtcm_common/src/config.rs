//! Configuration loading traits and types.
//!
//! Every RTCM binary reads a single TOML file. The [`ConfigLoader`] blanket
//! trait handles reading and parsing; types that also implement [`Validate`]
//! get [`ConfigLoader::load_validated`], which rejects semantically invalid
//! files before anything is constructed from them.
//!
//! # Usage
//!
//! ```rust,no_run
//! use rtcm_common::config::{ConfigError, ConfigLoader, SharedConfig, Validate};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct MyAppConfig {
//!     shared: SharedConfig,
//! }
//!
//! impl Validate for MyAppConfig {
//!     fn validate(&self) -> Result<(), ConfigError> {
//!         self.shared.validate()
//!     }
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = MyAppConfig::load_validated(Path::new("rtcm.toml"))?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// File exists but could not be read.
    #[error("Failed to read configuration: {0}")]
    ReadError(String),

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Equivalent `tracing` level, for building subscriber filters.
    pub const fn as_tracing(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// Fields shared by every RTCM application config.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "rtcm-cell-01"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Reject an empty or whitespace-only service name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Semantic validation run after a config has been parsed.
pub trait Validate {
    /// Check cross-field constraints that serde cannot express.
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Loading configuration from TOML text or files.
///
/// # Contract
///
/// - `ConfigError::FileNotFound` if the file does not exist
/// - `ConfigError::ReadError` for any other I/O failure
/// - `ConfigError::ParseError` if TOML syntax or shape is invalid
/// - `ConfigError::ValidationError` from [`ConfigLoader::load_validated`]
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Parse configuration from a TOML string.
    fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::ReadError(format!("{}: {e}", path.display()))
            }
        })?;

        Self::from_toml_str(&content)
    }

    /// Load a file and run [`Validate::validate`] on the result.
    fn load_validated(path: &Path) -> Result<Self, ConfigError>
    where
        Self: Validate,
    {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

// Any serde-deserializable struct can be loaded.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
