//! DC motor abstraction.
//!
//! Two variants implement [`Motor`]:
//! - [`GpioDcMotor`] - forward/backward (and optional enable) pins driven directly
//! - [`I2cDcMotor`] - speed from a PWM driver channel, rotation sense from a direction pin
//!
//! Speeds are signed percentages: the sign selects the direction, the
//! magnitude is limited to the motor's `max_speed`. Each motor applies its
//! calibration direction so that positive speed always means forward.

mod factory;
mod gpio_dc;
mod i2c_dc;

pub use factory::{create_motor, create_motor_pair, create_motor_pair_with};
pub use gpio_dc::GpioDcMotor;
pub use i2c_dc::I2cDcMotor;

use pihat_common::hal::config::MotorDirection;
use pihat_common::hal::error::{HalError, HalResult};

/// Common motor contract.
pub trait Motor: Send {
    /// Motor name.
    fn name(&self) -> &str;

    /// Speed ceiling in percent.
    fn max_speed(&self) -> u32;

    /// Last applied speed, before direction calibration.
    fn speed(&self) -> f64;

    /// Drive at `speed` percent; negative reverses. Clamped to `±max_speed`.
    fn set_speed(&mut self, speed: f64) -> HalResult<()>;

    /// Stop the motor.
    fn stop(&mut self) -> HalResult<()>;

    /// Release pins and the driver reference. A second call is a no-op.
    fn close(&mut self) -> HalResult<()>;

    /// Direction calibration in effect.
    fn calibration_direction(&self) -> MotorDirection;

    /// Change the direction calibration; `persist` also makes it the value
    /// restored by [`Motor::reset_calibration_direction`].
    fn update_calibration_direction(
        &mut self,
        direction: MotorDirection,
        persist: bool,
    ) -> MotorDirection;

    /// Restore the persisted direction calibration.
    fn reset_calibration_direction(&mut self) -> MotorDirection;
}

/// Transient and persisted direction calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionCalibration {
    current: MotorDirection,
    persisted: MotorDirection,
}

impl DirectionCalibration {
    /// Start with `direction` as both transient and persisted value.
    pub fn new(direction: MotorDirection) -> Self {
        Self {
            current: direction,
            persisted: direction,
        }
    }

    /// Direction in effect.
    pub fn current(&self) -> MotorDirection {
        self.current
    }

    /// Direction restored by [`DirectionCalibration::reset`].
    pub fn persisted(&self) -> MotorDirection {
        self.persisted
    }

    /// Set the transient direction, and the persisted one when `persist`.
    pub fn update(&mut self, direction: MotorDirection, persist: bool) -> MotorDirection {
        self.current = direction;
        if persist {
            self.persisted = direction;
        }
        self.current
    }

    /// Restore the persisted direction.
    pub fn reset(&mut self) -> MotorDirection {
        self.current = self.persisted;
        self.current
    }

    /// Apply the calibration to an application-level speed.
    pub fn apply(&self, speed: f64) -> f64 {
        speed * self.current.sign()
    }
}

/// Clamp `speed` to `[-max_speed, max_speed]`.
///
/// # Errors
/// `InvalidArgument` for NaN.
pub fn constrain_speed(speed: f64, max_speed: u32) -> HalResult<f64> {
    if speed.is_nan() {
        return Err(HalError::InvalidArgument("speed must be a number".to_string()));
    }
    let max = f64::from(max_speed);
    Ok(speed.clamp(-max, max))
}
