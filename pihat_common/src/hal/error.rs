//! HAL error taxonomy.
//!
//! A single [`HalError`] covers validation failures, registry lookups,
//! bus/physical-layer failures and service lifecycle violations. Validation
//! errors are always raised before any hardware access.

use crate::hal::bus::BusIndex;
use thiserror::Error;

/// Result alias used throughout the HAL.
pub type HalResult<T> = Result<T, HalError>;

/// Error types for HAL operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HalError {
    /// No constructor registered under this driver type name.
    #[error("Unknown driver type: {0}")]
    UnknownDriverType(String),

    /// A constructor is already registered under this name and the registry rejects duplicates.
    #[error("Driver type already registered: {0}")]
    DriverAlreadyRegistered(String),

    /// Out-of-range duty cycle, malformed channel or pin, bad direction, etc.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested angle is outside the configured bounds.
    #[error("Angle {angle} out of range [{min}, {max}]")]
    AngleOutOfRange {
        /// Requested angle in degrees
        angle: f64,
        /// Lower bound in degrees
        min: f64,
        /// Upper bound in degrees
        max: f64,
    },

    /// The bus handle's physical channel was already closed and evicted.
    #[error("I2C bus {0} is closed")]
    BusClosed(BusIndex),

    /// Physical-layer communication failure.
    #[error("I2C bus {bus} error: {reason}")]
    I2cBus {
        /// Bus index
        bus: BusIndex,
        /// Underlying OS / device message
        reason: String,
    },

    /// Physical-layer timeout.
    #[error("I2C bus {bus} timed out talking to 0x{address:02X}")]
    I2cTimeout {
        /// Bus index
        bus: BusIndex,
        /// Target device address
        address: u8,
    },

    /// Operation invoked on a service after `close()`.
    #[error("Service '{0}' is closed")]
    ServiceClosed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more owned resources failed to close; every failure is listed.
    #[error("{} resource(s) failed to close: {}", .0.len(), describe_failures(.0))]
    CloseFailed(Vec<CloseFailure>),
}

/// One resource that failed to close.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{resource}: {error}")]
pub struct CloseFailure {
    /// Human-readable resource name (motor, servo, bus...)
    pub resource: String,
    /// Why it failed
    pub error: HalError,
}

fn describe_failures(failures: &[CloseFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl HalError {
    /// True for failures raised before touching hardware.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            HalError::InvalidArgument(_)
                | HalError::AngleOutOfRange { .. }
                | HalError::UnknownDriverType(_)
                | HalError::Config(_)
        )
    }
}

/// Fold the outcome of several independent close attempts into one result.
///
/// Every failure is kept; `Ok` only when all attempts succeeded.
pub fn collect_close_failures(failures: Vec<CloseFailure>) -> HalResult<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(HalError::CloseFailed(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hal_error_display() {
        let err = HalError::UnknownDriverType("Unregistered".to_string());
        assert!(err.to_string().contains("Unregistered"));

        let err = HalError::AngleOutOfRange {
            angle: 120.0,
            min: -90.0,
            max: 90.0,
        };
        assert_eq!(err.to_string(), "Angle 120 out of range [-90, 90]");

        let err = HalError::I2cTimeout { bus: 1, address: 0x40 };
        assert!(err.to_string().contains("0x40"));
    }

    #[test]
    fn test_close_failures_listed() {
        let result = collect_close_failures(vec![
            CloseFailure {
                resource: "left".to_string(),
                error: HalError::BusClosed(1),
            },
            CloseFailure {
                resource: "right".to_string(),
                error: HalError::I2cBus {
                    bus: 1,
                    reason: "nack".to_string(),
                },
            },
        ]);
        let err = result.unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("2 resource(s)"));
        assert!(text.contains("left"));
        assert!(text.contains("right"));
    }

    #[test]
    fn test_no_failures_is_ok() {
        assert!(collect_close_failures(Vec::new()).is_ok());
    }

    #[test]
    fn test_validation_classification() {
        assert!(HalError::InvalidArgument("x".into()).is_validation());
        assert!(!HalError::BusClosed(1).is_validation());
    }
}
