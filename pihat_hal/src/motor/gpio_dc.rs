//! Motor driven entirely through GPIO (MC33886-style boards).

use crate::motor::{DirectionCalibration, Motor, constrain_speed};
use pihat_common::hal::config::{GpioDcMotorConfig, MotorDirection};
use pihat_common::hal::error::{CloseFailure, HalError, HalResult, collect_close_failures};
use pihat_common::hal::gpio::{OutputPin, PinProvider, PwmPin};
use tracing::{debug, info};

enum Drive {
    Pwm {
        forward: Box<dyn PwmPin>,
        backward: Box<dyn PwmPin>,
    },
    Digital {
        forward: Box<dyn OutputPin>,
        backward: Box<dyn OutputPin>,
    },
}

/// GPIO-direct DC motor.
///
/// With PWM, `speed / 100` is the duty fraction on the active pin; without
/// it, the active pin is switched fully on.
pub struct GpioDcMotor {
    name: String,
    max_speed: u32,
    calibration: DirectionCalibration,
    drive: Drive,
    enable: Option<Box<dyn OutputPin>>,
    speed: f64,
    closed: bool,
}

impl GpioDcMotor {
    /// Claim the configured pins and enable the driver board.
    pub fn new(config: &GpioDcMotorConfig, pins: &dyn PinProvider) -> HalResult<Self> {
        config.forward_pin.validate()?;
        config.backward_pin.validate()?;

        let drive = if config.pwm {
            Drive::Pwm {
                forward: pins.pwm(&config.forward_pin)?,
                backward: pins.pwm(&config.backward_pin)?,
            }
        } else {
            Drive::Digital {
                forward: pins.output(&config.forward_pin)?,
                backward: pins.output(&config.backward_pin)?,
            }
        };
        let enable = match &config.enable_pin {
            Some(pin) => {
                let mut enable = pins.output(pin)?;
                enable.set_high()?;
                Some(enable)
            }
            None => None,
        };

        debug!(
            motor = %config.name,
            forward = %config.forward_pin,
            backward = %config.backward_pin,
            pwm = config.pwm,
            "GPIO motor initialized"
        );
        Ok(Self {
            name: config.name.clone(),
            max_speed: config.max_speed,
            calibration: DirectionCalibration::new(config.calibration_direction),
            drive,
            enable,
            speed: 0.0,
            closed: false,
        })
    }

    fn ensure_open(&self) -> HalResult<()> {
        if self.closed {
            Err(HalError::ServiceClosed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    fn apply(&mut self, signed: f64) -> HalResult<()> {
        let fraction = (signed.abs() / 100.0).min(1.0);
        match &mut self.drive {
            Drive::Pwm { forward, backward } => {
                let (fwd, bwd) = if signed > 0.0 {
                    (fraction, 0.0)
                } else if signed < 0.0 {
                    (0.0, fraction)
                } else {
                    (0.0, 0.0)
                };
                forward.set_duty(fwd)?;
                backward.set_duty(bwd)
            }
            Drive::Digital { forward, backward } => {
                if signed > 0.0 {
                    backward.set_low()?;
                    forward.set_high()
                } else if signed < 0.0 {
                    forward.set_low()?;
                    backward.set_high()
                } else {
                    forward.set_low()?;
                    backward.set_low()
                }
            }
        }
    }
}

impl Motor for GpioDcMotor {
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
        self.ensure_open()?;
        let speed = constrain_speed(speed, self.max_speed)?;
        let signed = self.calibration.apply(speed);
        debug!(motor = %self.name, speed, signed, "GPIO motor speed");
        self.apply(signed)?;
        self.speed = speed;
        Ok(())
    }

    fn stop(&mut self) -> HalResult<()> {
        self.ensure_open()?;
        self.apply(0.0)?;
        self.speed = 0.0;
        Ok(())
    }

    fn close(&mut self) -> HalResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let name = self.name.clone();
        let mut failures = Vec::new();
        let mut record = |resource: &str, result: HalResult<()>| {
            if let Err(error) = result {
                failures.push(CloseFailure {
                    resource: format!("{name}.{resource}"),
                    error,
                });
            }
        };

        record("stop", self.apply(0.0));
        match &mut self.drive {
            Drive::Pwm { forward, backward } => {
                record("forward", forward.close());
                record("backward", backward.close());
            }
            Drive::Digital { forward, backward } => {
                record("forward", forward.close());
                record("backward", backward.close());
            }
        }
        if let Some(enable) = self.enable.as_mut() {
            record("enable", enable.set_low().and_then(|()| enable.close()));
        }

        self.speed = 0.0;
        info!(motor = %name, "Motor closed");
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
