//! PWM driver capability interface.
//!
//! This module defines:
//! - `PwmDriver` trait - Contract every PWM controller chip must satisfy
//! - `validate_duty_cycle` / `validate_channel` - Argument checks run before any bus access

use crate::hal::error::{HalError, HalResult};

/// Trait defining the interface for PWM controller drivers.
///
/// The registry in `pihat_hal` constructs values of this trait from a
/// [`PwmDriverConfig`](crate::hal::config::PwmDriverConfig); motors and servos
/// only ever talk to this trait, never to a concrete chip type.
///
/// # Lifecycle
///
/// 1. Constructed by the registry with an acquired bus handle
/// 2. `set_pwm_freq()` / `set_servo_pulse()` / `set_pwm_duty_cycle()` at will
/// 3. `close()` - Releases the bus reference; idempotent
///
/// # Argument validation
///
/// `set_pwm_duty_cycle` must reject duty outside `[0, 100]` with
/// [`HalError::InvalidArgument`] before issuing any bus transaction.
pub trait PwmDriver: Send {
    /// Registry name of this driver family (e.g. "PCA9685").
    fn driver_type(&self) -> &'static str;

    /// Set the PWM frequency in Hz.
    fn set_pwm_freq(&mut self, freq_hz: u32) -> HalResult<()>;

    /// Set a servo pulse width in microseconds on `channel`.
    fn set_servo_pulse(&mut self, channel: u8, pulse_us: u32) -> HalResult<()>;

    /// Set the duty cycle of `channel` as a percentage in `[0, 100]`.
    fn set_pwm_duty_cycle(&mut self, channel: u8, duty_percent: f64) -> HalResult<()>;

    /// Release the driver's bus reference. A second call is a no-op.
    fn close(&mut self) -> HalResult<()>;
}

/// Reject duty cycles outside `[0, 100]` (NaN included).
pub fn validate_duty_cycle(duty_percent: f64) -> HalResult<()> {
    if (0.0..=100.0).contains(&duty_percent) {
        Ok(())
    } else {
        Err(HalError::InvalidArgument(format!(
            "Duty cycle must be between 0 and 100, got {duty_percent}"
        )))
    }
}

/// Reject channels a chip with `channel_count` outputs does not have.
pub fn validate_channel(driver: &str, channel: u8, channel_count: u8) -> HalResult<()> {
    if channel_count == 0 {
        return Err(HalError::InvalidArgument(format!(
            "{driver}: driver has no channels"
        )));
    }
    if channel < channel_count {
        Ok(())
    } else {
        Err(HalError::InvalidArgument(format!(
            "{driver}: channel must be in range 0-{}, got {channel}",
            channel_count - 1
        )))
    }
}
