//! Whole-robot assembly.
//!
//! `RobotHal` turns one [`RobotConfig`] into live services: PWM drivers
//! listed under `[[pwm_drivers]]` are created once and shared by every motor
//! and servo whose driver config matches, the drive motors become a
//! [`MotorService`] and each `[[servos]]` entry a named [`ServoService`].

use crate::context::HalContext;
use crate::driver_registry::{SharedDriver, close_shared_driver};
use crate::motor::{create_motor_pair, create_motor_pair_with};
use crate::service::{MotorService, ServoService, create_servo_service};
use pihat_common::config::{ConfigLoader, Validate};
use pihat_common::hal::config::{MotorConfig, PwmDriverConfig, RobotConfig, ServoOutput};
use pihat_common::hal::error::{CloseFailure, HalError, HalResult, collect_close_failures};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A configured robot: shared drivers, drive motors and named servos.
pub struct RobotHal {
    ctx: HalContext,
    drivers: Vec<(PwmDriverConfig, SharedDriver)>,
    motors: Option<MotorService>,
    servos: Vec<ServoService>,
}

impl RobotHal {
    /// Load and validate a robot configuration file.
    pub fn load_config(path: &Path) -> HalResult<RobotConfig> {
        info!("Loading robot configuration from {:?}", path);
        Ok(RobotConfig::load(path)?)
    }

    /// Load `path` and build the robot.
    pub fn from_file(ctx: HalContext, path: &Path) -> HalResult<Self> {
        let config = Self::load_config(path)?;
        Self::from_config(ctx, &config)
    }

    /// Build every driver, motor and servo in `config`.
    ///
    /// On failure everything created so far is closed again.
    pub fn from_config(ctx: HalContext, config: &RobotConfig) -> HalResult<Self> {
        config.validate()?;
        let mut hal = Self {
            ctx,
            drivers: Vec::new(),
            motors: None,
            servos: Vec::new(),
        };
        hal.build(config)?;
        info!(
            service = %config.shared.service_name,
            drivers = hal.drivers.len(),
            motors = hal.motors.is_some(),
            servos = hal.servos.len(),
            "Robot ready"
        );
        Ok(hal)
    }

    fn build(&mut self, config: &RobotConfig) -> HalResult<()> {
        for driver_config in &config.pwm_drivers {
            let driver = self.ctx.create_driver(driver_config, None)?;
            self.drivers.push((driver_config.clone(), Arc::clone(&driver)));
            driver.lock().set_pwm_freq(driver_config.freq)?;
        }

        if let Some(motors) = &config.motors {
            let left_driver = self.motor_driver(&motors.left);
            let right_driver = self.motor_driver(&motors.right);
            let (left, right) = if left_driver.is_none() && right_driver.is_none() {
                create_motor_pair(&self.ctx, &motors.left, &motors.right, None)?
            } else {
                create_motor_pair_with(
                    &self.ctx,
                    &motors.left,
                    &motors.right,
                    left_driver,
                    right_driver,
                )?
            };
            self.motors = Some(MotorService::new(left, right));
        }

        for servo_config in &config.servos {
            let driver = match servo_config.servo.output {
                ServoOutput::Driver => match &servo_config.servo.driver {
                    Some(driver_config) => self.shared_driver(driver_config),
                    None => self.drivers.first().map(|(_, driver)| Arc::clone(driver)),
                },
                ServoOutput::Gpio => None,
            };
            let service = create_servo_service(&self.ctx, servo_config, driver)?;
            self.servos.push(service);
        }
        Ok(())
    }

    fn shared_driver(&self, config: &PwmDriverConfig) -> Option<SharedDriver> {
        self.drivers
            .iter()
            .find(|(c, _)| c == config)
            .map(|(_, driver)| Arc::clone(driver))
    }

    fn motor_driver(&self, config: &MotorConfig) -> Option<SharedDriver> {
        match config {
            MotorConfig::I2cDc(cfg) => self.shared_driver(&cfg.driver),
            MotorConfig::GpioDc(_) => None,
        }
    }

    /// Context the robot was built with.
    pub fn context(&self) -> &HalContext {
        &self.ctx
    }

    /// Drive motors.
    ///
    /// # Errors
    /// `Config` when the robot has no motors, `ServiceClosed` after shutdown.
    pub fn motors(&mut self) -> HalResult<&mut MotorService> {
        match self.motors.as_mut() {
            Some(motors) if motors.is_closed() => {
                Err(HalError::ServiceClosed("motors".to_string()))
            }
            Some(motors) => Ok(motors),
            None => Err(HalError::Config("no motors configured".to_string())),
        }
    }

    /// Servo service by name.
    pub fn servo(&mut self, name: &str) -> HalResult<&mut ServoService> {
        self.servos
            .iter_mut()
            .find(|s| s.name() == name)
            .ok_or_else(|| HalError::InvalidArgument(format!("unknown servo '{name}'")))
    }

    /// Configured servo names, in file order.
    pub fn servo_names(&self) -> Vec<String> {
        self.servos.iter().map(|s| s.name().to_string()).collect()
    }

    /// Move every servo to its calibrated neutral position.
    ///
    /// Every servo is attempted; the first failure is returned.
    pub fn zero_servos(&mut self) -> HalResult<()> {
        let mut first_error = None;
        for servo in &mut self.servos {
            match servo.reset() {
                Ok(()) => info!(servo = servo.name(), "Servo zeroed"),
                Err(e) => {
                    warn!(servo = servo.name(), error = %e, "Failed to zero servo");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Close motors, servos and shared drivers, collecting every failure.
    /// A second call is a no-op.
    pub fn shutdown(&mut self) -> HalResult<()> {
        let mut failures = Vec::new();

        if let Some(mut motors) = self.motors.take() {
            if let Err(error) = motors.close() {
                failures.push(CloseFailure {
                    resource: "motors".to_string(),
                    error,
                });
            }
        }
        for mut servo in self.servos.drain(..) {
            if let Err(error) = servo.close() {
                failures.push(CloseFailure {
                    resource: servo.name().to_string(),
                    error,
                });
            }
        }
        for (config, driver) in self.drivers.drain(..) {
            if let Err(error) = close_shared_driver(driver) {
                failures.push(CloseFailure {
                    resource: format!("{}@{}", config.name, config.addr_str()),
                    error,
                });
            }
        }

        for failure in &failures {
            error!(resource = %failure.resource, error = %failure.error, "Close failed");
        }
        collect_close_failures(failures)
    }
}

impl Drop for RobotHal {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "Robot shutdown failed");
        }
    }
}
