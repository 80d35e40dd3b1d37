//! GPIO pin providers.
//!
//! Pin wrappers are external collaborators; the HAL only needs a
//! [`PinProvider`]. [`mock::MockPins`] records every level change,
//! [`UnavailablePins`] stands in when no backend has been wired up.

pub mod mock;

use pihat_common::hal::error::{HalError, HalResult};
use pihat_common::hal::gpio::{OutputPin, PinId, PinProvider, PwmPin};

/// Provider that refuses every pin.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailablePins;

impl UnavailablePins {
    fn refuse(pin: &PinId) -> HalError {
        HalError::Config(format!(
            "no GPIO backend available to claim {pin}; supply a PinProvider"
        ))
    }
}

impl PinProvider for UnavailablePins {
    fn output(&self, pin: &PinId) -> HalResult<Box<dyn OutputPin>> {
        Err(Self::refuse(pin))
    }

    fn pwm(&self, pin: &PinId) -> HalResult<Box<dyn PwmPin>> {
        Err(Self::refuse(pin))
    }
}
