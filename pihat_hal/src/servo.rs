//! Angular servos.
//!
//! A servo accepts angles strictly inside `[min_angle, max_angle]` and maps
//! them linearly from `[real_min_angle, real_max_angle]` onto
//! `[min_pulse, max_pulse]`. Out-of-range angles are rejected with
//! `AngleOutOfRange` before anything is written.
//!
//! - [`PwmServo`] sends the pulse through a (possibly shared) PWM driver channel.
//! - [`GpioServo`] drives a PWM-capable GPIO pin at 50 Hz.

use crate::context::HalContext;
use crate::driver_registry::{SharedDriver, close_shared_driver};
use pihat_common::consts::{DEFAULT_FRAME_WIDTH_US, DEFAULT_PWM_FREQ_HZ};
use pihat_common::hal::config::{ServoConfig, ServoOutput};
use pihat_common::hal::error::{CloseFailure, HalError, HalResult};
use pihat_common::hal::gpio::PwmPin;
use tracing::{debug, info};

/// Common servo contract.
pub trait Servo: Send {
    /// Channel or pin label ("P2", "GPIO18").
    fn name(&self) -> &str;

    /// Accepted angle range.
    fn bounds(&self) -> (f64, f64);

    /// Move to `angle` degrees.
    fn set_angle(&mut self, angle: f64) -> HalResult<()>;

    /// Send a raw pulse width, bypassing the angle mapping.
    fn set_pulse_width(&mut self, pulse_us: u32) -> HalResult<()>;

    /// Release the driver reference or pin. A second call is a no-op.
    fn close(&mut self) -> HalResult<()>;
}

/// Angle bounds and the angle-to-pulse mapping of one servo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseMap {
    min_angle: f64,
    max_angle: f64,
    min_pulse: u32,
    max_pulse: u32,
    real_min_angle: f64,
    real_max_angle: f64,
}

impl PulseMap {
    /// Take the mapping from a servo config.
    pub fn from_config(config: &ServoConfig) -> Self {
        Self {
            min_angle: config.min_angle,
            max_angle: config.max_angle,
            min_pulse: config.min_pulse,
            max_pulse: config.max_pulse,
            real_min_angle: config.real_min_angle,
            real_max_angle: config.real_max_angle,
        }
    }

    /// Accepted angle range.
    pub fn bounds(&self) -> (f64, f64) {
        (self.min_angle, self.max_angle)
    }

    /// Reject NaN and anything outside the bounds.
    pub fn check_angle(&self, angle: f64) -> HalResult<()> {
        if angle.is_nan() {
            return Err(HalError::InvalidArgument("angle must be a number".to_string()));
        }
        if angle < self.min_angle || angle > self.max_angle {
            return Err(HalError::AngleOutOfRange {
                angle,
                min: self.min_angle,
                max: self.max_angle,
            });
        }
        Ok(())
    }

    /// Pulse width for an angle already accepted by [`PulseMap::check_angle`].
    pub fn pulse_for(&self, angle: f64) -> u32 {
        let ratio = (angle - self.real_min_angle) / (self.real_max_angle - self.real_min_angle);
        let span = f64::from(self.max_pulse - self.min_pulse);
        let pulse = (f64::from(self.min_pulse) + ratio * span).round();
        pulse.clamp(f64::from(self.min_pulse), f64::from(self.max_pulse)) as u32
    }

    /// Reject pulses outside `[min_pulse, max_pulse]`.
    pub fn check_pulse(&self, pulse_us: u32) -> HalResult<()> {
        if pulse_us < self.min_pulse || pulse_us > self.max_pulse {
            return Err(HalError::InvalidArgument(format!(
                "pulse {pulse_us} us outside [{}, {}]",
                self.min_pulse, self.max_pulse
            )));
        }
        Ok(())
    }
}

/// Pulse width `config` maps `angle` to, after the bounds check.
pub fn angle_to_pulse(config: &ServoConfig, angle: f64) -> HalResult<u32> {
    let map = PulseMap::from_config(config);
    map.check_angle(angle)?;
    Ok(map.pulse_for(angle))
}

// ─── Driver channel ─────────────────────────────────────────────────

/// Servo on a PWM driver channel.
pub struct PwmServo {
    name: String,
    channel: u8,
    map: PulseMap,
    driver: Option<SharedDriver>,
}

impl PwmServo {
    /// Attach to `driver` on the configured channel.
    pub fn new(config: &ServoConfig, driver: SharedDriver) -> HalResult<Self> {
        let channel = config.channel.resolve()?;
        Ok(Self {
            name: format!("P{channel}"),
            channel,
            map: PulseMap::from_config(config),
            driver: Some(driver),
        })
    }

    /// Driver channel.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    fn write_pulse(&mut self, pulse_us: u32) -> HalResult<()> {
        let driver = self
            .driver
            .as_ref()
            .ok_or_else(|| HalError::ServiceClosed(self.name.clone()))?;
        driver.lock().set_servo_pulse(self.channel, pulse_us)
    }
}

impl Servo for PwmServo {
    fn name(&self) -> &str {
        &self.name
    }

    fn bounds(&self) -> (f64, f64) {
        self.map.bounds()
    }

    fn set_angle(&mut self, angle: f64) -> HalResult<()> {
        self.map.check_angle(angle)?;
        let pulse = self.map.pulse_for(angle);
        debug!(servo = %self.name, angle, pulse, "Servo angle");
        self.write_pulse(pulse)
    }

    fn set_pulse_width(&mut self, pulse_us: u32) -> HalResult<()> {
        self.map.check_pulse(pulse_us)?;
        self.write_pulse(pulse_us)
    }

    fn close(&mut self) -> HalResult<()> {
        match self.driver.take() {
            Some(driver) => close_shared_driver(driver),
            None => Ok(()),
        }
    }
}

// ─── GPIO pin ───────────────────────────────────────────────────────

/// Servo driven straight from a PWM-capable GPIO pin.
pub struct GpioServo {
    name: String,
    map: PulseMap,
    pin: Box<dyn PwmPin>,
    closed: bool,
}

impl GpioServo {
    /// Take ownership of `pin` and start it at the servo frame rate.
    pub fn new(config: &ServoConfig, mut pin: Box<dyn PwmPin>) -> HalResult<Self> {
        pin.set_frequency(DEFAULT_PWM_FREQ_HZ)?;
        Ok(Self {
            name: config.gpio_pin().to_string(),
            map: PulseMap::from_config(config),
            pin,
            closed: false,
        })
    }

    fn write_pulse(&mut self, pulse_us: u32) -> HalResult<()> {
        if self.closed {
            return Err(HalError::ServiceClosed(self.name.clone()));
        }
        self.pin
            .set_duty(f64::from(pulse_us) / f64::from(DEFAULT_FRAME_WIDTH_US))
    }
}

impl Servo for GpioServo {
    fn name(&self) -> &str {
        &self.name
    }

    fn bounds(&self) -> (f64, f64) {
        self.map.bounds()
    }

    fn set_angle(&mut self, angle: f64) -> HalResult<()> {
        self.map.check_angle(angle)?;
        let pulse = self.map.pulse_for(angle);
        debug!(servo = %self.name, angle, pulse, "GPIO servo angle");
        self.write_pulse(pulse)
    }

    fn set_pulse_width(&mut self, pulse_us: u32) -> HalResult<()> {
        self.map.check_pulse(pulse_us)?;
        self.write_pulse(pulse_us)
    }

    fn close(&mut self) -> HalResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pin.close()
    }
}

/// Build a servo from its config.
///
/// Driver-output servos use `driver` when given; otherwise the servo's own
/// driver config is used and the new driver is set to 50 Hz.
pub fn create_servo(
    ctx: &HalContext,
    config: &ServoConfig,
    driver: Option<SharedDriver>,
) -> HalResult<Box<dyn Servo>> {
    config.validate()?;
    match config.output {
        ServoOutput::Driver => {
            let driver = match (driver, &config.driver) {
                (Some(driver), _) => driver,
                (None, Some(driver_config)) => {
                    let driver = ctx.create_driver(driver_config, None)?;
                    let freq = driver.lock().set_pwm_freq(DEFAULT_PWM_FREQ_HZ);
                    if let Err(err) = freq {
                        if let Err(close_err) = close_shared_driver(driver) {
                            return Err(HalError::CloseFailed(vec![
                                CloseFailure {
                                    resource: format!("{}.freq", driver_config.name),
                                    error: err,
                                },
                                CloseFailure {
                                    resource: format!("{}.close", driver_config.name),
                                    error: close_err,
                                },
                            ]));
                        }
                        return Err(err);
                    }
                    driver
                }
                (None, None) => {
                    return Err(HalError::Config(format!(
                        "servo {} has no driver configured",
                        config.channel
                    )));
                }
            };
            let servo = PwmServo::new(config, driver)?;
            info!(servo = %servo.name, "Servo ready");
            Ok(Box::new(servo))
        }
        ServoOutput::Gpio => {
            let pin = ctx.pins.pwm(&config.gpio_pin())?;
            let servo = GpioServo::new(config, pin)?;
            info!(servo = %servo.name, "GPIO servo ready");
            Ok(Box::new(servo))
        }
    }
}
