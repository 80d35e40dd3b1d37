//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load and validate TOML
//! configuration files for pihat tools and applications.
//!
//! # Usage
//!
//! ```rust,no_run
//! use pihat_common::config::{ConfigError, ConfigLoader};
//! use pihat_common::hal::config::RobotConfig;
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = RobotConfig::load(Path::new("robot.toml"))?;
//!     println!("Robot: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use crate::hal::error::HalError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for HalError {
    fn from(err: ConfigError) -> Self {
        HalError::Config(err.to_string())
    }
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Register writes, computed pulses and duty cycles.
    Debug,
    /// Bus and driver lifecycle.
    #[default]
    Info,
    /// Overwritten registrations, fallbacks.
    Warn,
    /// Close failures and other serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

fn default_service_name() -> String {
    "pihat".to_string()
}

/// Common configuration fields shared by every pihat configuration file.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "picar-x"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Semantic validation run by [`ConfigLoader::load`] after parsing.
pub trait Validate {
    /// Check invariants that the type system cannot express.
    fn validate(&self) -> Result<(), ConfigError>;
}

impl Validate for SharedConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        SharedConfig::validate(self)
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
/// - Returns `ConfigError::ValidationError` if semantic validation fails
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned + Validate {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;
        debug!(path = %path.display(), "Loading configuration");
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string.
    fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl<T: serde::de::DeserializeOwned + Validate> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::config::RobotConfig;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::default().as_directive(), "info");
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"")
                .unwrap()
                .level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"warn\"")
                .unwrap()
                .level,
            LogLevel::Warn
        );
        assert!(toml::from_str::<TestWrapper>("level = \"loud\"").is_err());
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = RobotConfig::load(Path::new("/nonexistent/path/robot.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = RobotConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_loader_validation_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[[servos]]
name = "pan"
servo = {{ channel = "P0", min_pulse = 2500, max_pulse = 500 }}
"#
        )
        .unwrap();
        file.flush().unwrap();

        let result = RobotConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_config_loader_success() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "picar"

[[pwm_drivers]]
name = "Sunfounder"
address = 0x14

[motors.left]
type = "i2c_dc"
name = "left"
channel = "P12"
dir_pin = "D4"
driver = {{ name = "Sunfounder", address = 0x14 }}

[motors.right]
type = "i2c_dc"
name = "right"
calibration_direction = -1
channel = "P13"
dir_pin = "D5"
driver = {{ name = "Sunfounder", address = 0x14 }}

[[servos]]
name = "steering"
min_angle = -30.0
max_angle = 30.0
calibration_offset = -14.4
servo = {{ channel = "P2", driver = {{ name = "Sunfounder", address = 0x14 }} }}
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = RobotConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.shared.service_name, "picar");
        assert_eq!(config.pwm_drivers.len(), 1);
        let motors = config.motors.unwrap();
        assert_eq!(motors.right.name(), "right");
        assert_eq!(config.servos[0].calibration_offset, -14.4);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = RobotConfig::parse("").unwrap();
        assert_eq!(config.shared.service_name, "pihat");
        assert!(config.motors.is_none());
        assert!(config.servos.is_empty());
    }

    #[test]
    fn test_config_error_into_hal_error() {
        let err: HalError = ConfigError::FileNotFound.into();
        assert!(matches!(err, HalError::Config(_)));
    }
}
