//! H-bridge motor: speed from a PWM driver channel, direction from a GPIO pin.

use crate::driver_registry::{SharedDriver, close_shared_driver};
use crate::motor::{DirectionCalibration, Motor, constrain_speed};
use pihat_common::hal::config::{I2cDcMotorConfig, MotorDirection};
use pihat_common::hal::error::{CloseFailure, HalError, HalResult, collect_close_failures};
use pihat_common::hal::gpio::{OutputPin, PinProvider};
use tracing::{debug, info};

/// I2C-driven DC motor.
///
/// `max_speed` maps to 100 % duty. The direction pin is low for forward and
/// high for reverse.
pub struct I2cDcMotor {
    name: String,
    max_speed: u32,
    calibration: DirectionCalibration,
    driver: Option<SharedDriver>,
    channel: u8,
    dir_pin: Box<dyn OutputPin>,
    speed: f64,
    closed: bool,
}

impl I2cDcMotor {
    /// Resolve the channel, claim the direction pin and set the driver
    /// frequency.
    pub fn new(
        config: &I2cDcMotorConfig,
        driver: SharedDriver,
        pins: &dyn PinProvider,
    ) -> HalResult<Self> {
        let channel = config.channel.resolve()?;
        let dir_pin = pins.output(&config.dir_pin)?;
        driver.lock().set_pwm_freq(config.driver.freq)?;

        debug!(
            motor = %config.name,
            channel,
            dir_pin = %config.dir_pin,
            freq = config.driver.freq,
            "I2C motor initialized"
        );
        Ok(Self {
            name: config.name.clone(),
            max_speed: config.max_speed,
            calibration: DirectionCalibration::new(config.calibration_direction),
            driver: Some(driver),
            channel,
            dir_pin,
            speed: 0.0,
            closed: false,
        })
    }

    /// Driver channel carrying the speed signal.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    fn driver(&self) -> HalResult<&SharedDriver> {
        match (&self.driver, self.closed) {
            (Some(driver), false) => Ok(driver),
            _ => Err(HalError::ServiceClosed(self.name.clone())),
        }
    }

    /// Duty percent for an already constrained speed.
    fn duty_for(&self, speed: f64) -> f64 {
        (speed.abs() / f64::from(self.max_speed) * 100.0).floor()
    }
}

impl Motor for I2cDcMotor {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_speed(&self) -> u32 {
        self.max_speed
    }

    fn speed(&self) -> f64 {
        self.speed
    }

    fn set_speed(&mut self, speed: f64) -> HalResult<()> {
        self.driver()?;
        let speed = constrain_speed(speed, self.max_speed)?;
        let signed = self.calibration.apply(speed);
        let duty = self.duty_for(signed);

        // Duty first: a failed write leaves the direction pin untouched.
        self.driver()?.lock().set_pwm_duty_cycle(self.channel, duty)?;
        if signed >= 0.0 {
            self.dir_pin.set_low()?;
        } else {
            self.dir_pin.set_high()?;
        }
        debug!(motor = %self.name, speed, duty, "I2C motor speed");
        self.speed = speed;
        Ok(())
    }

    fn stop(&mut self) -> HalResult<()> {
        self.driver()?.lock().set_pwm_duty_cycle(self.channel, 0.0)?;
        self.speed = 0.0;
        Ok(())
    }

    fn close(&mut self) -> HalResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut failures = Vec::new();
        if let Some(driver) = self.driver.take() {
            if let Err(error) = driver.lock().set_pwm_duty_cycle(self.channel, 0.0) {
                failures.push(CloseFailure {
                    resource: format!("{}.stop", self.name),
                    error,
                });
            }
            if let Err(error) = close_shared_driver(driver) {
                failures.push(CloseFailure {
                    resource: format!("{}.driver", self.name),
                    error,
                });
            }
        }
        if let Err(error) = self.dir_pin.close() {
            failures.push(CloseFailure {
                resource: format!("{}.dir_pin", self.name),
                error,
            });
        }

        self.speed = 0.0;
        info!(motor = %self.name, "Motor closed");
        collect_close_failures(failures)
    }

    fn calibration_direction(&self) -> MotorDirection {
        self.calibration.current()
    }

    fn update_calibration_direction(
        &mut self,
        direction: MotorDirection,
        persist: bool,
    ) -> MotorDirection {
        self.calibration.update(direction, persist)
    }

    fn reset_calibration_direction(&mut self) -> MotorDirection {
        self.calibration.reset()
    }
}
