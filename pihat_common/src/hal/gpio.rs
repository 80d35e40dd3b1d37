//! GPIO collaborator contracts.
//!
//! The HAL does not wrap GPIO itself; it consumes pins through these traits.
//! Direction pins of I2C-driven motors, the three pins of a GPIO-direct motor
//! and GPIO-direct servos are all obtained from a [`PinProvider`].

use crate::hal::error::{HalError, HalResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// GPIO pin identifier: BCM number or board name (e.g. `"D4"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PinId {
    /// BCM pin number
    Number(u8),
    /// Board-specific pin name
    Name(String),
}

impl PinId {
    /// Reject empty pin names.
    pub fn validate(&self) -> HalResult<()> {
        match self {
            PinId::Name(name) if name.trim().is_empty() => Err(HalError::InvalidArgument(
                "pin name cannot be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinId::Number(n) => write!(f, "GPIO{n}"),
            PinId::Name(name) => f.write_str(name),
        }
    }
}

impl From<u8> for PinId {
    fn from(n: u8) -> Self {
        PinId::Number(n)
    }
}

impl From<&str> for PinId {
    fn from(name: &str) -> Self {
        PinId::Name(name.to_string())
    }
}

/// Digital output pin.
pub trait OutputPin: Send {
    /// Drive the pin high.
    fn set_high(&mut self) -> HalResult<()>;
    /// Drive the pin low.
    fn set_low(&mut self) -> HalResult<()>;
    /// Release the pin.
    fn close(&mut self) -> HalResult<()>;
}

/// PWM-capable output pin.
pub trait PwmPin: Send {
    /// Set the active fraction of the period, `[0.0, 1.0]`.
    fn set_duty(&mut self, fraction: f64) -> HalResult<()>;
    /// Set the PWM frequency in Hz.
    fn set_frequency(&mut self, freq_hz: u32) -> HalResult<()>;
    /// Release the pin.
    fn close(&mut self) -> HalResult<()>;
}

/// Source of GPIO pins (gpiozero/rppal/sysfs wrapper, or a mock).
pub trait PinProvider: Send + Sync {
    /// Claim `pin` as a digital output.
    fn output(&self, pin: &PinId) -> HalResult<Box<dyn OutputPin>>;
    /// Claim `pin` as a PWM output.
    fn pwm(&self, pin: &PinId) -> HalResult<Box<dyn PwmPin>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        pin: PinId,
    }

    #[test]
    fn pin_id_from_number_or_name() {
        let w: Wrapper = toml::from_str("pin = 23").unwrap();
        assert_eq!(w.pin, PinId::Number(23));
        let w: Wrapper = toml::from_str("pin = \"D5\"").unwrap();
        assert_eq!(w.pin, PinId::Name("D5".to_string()));
    }

    #[test]
    fn pin_id_display() {
        assert_eq!(PinId::Number(4).to_string(), "GPIO4");
        assert_eq!(PinId::from("D4").to_string(), "D4");
    }

    #[test]
    fn empty_name_rejected() {
        assert!(PinId::from(" ").validate().is_err());
        assert!(PinId::from(17u8).validate().is_ok());
    }
}
