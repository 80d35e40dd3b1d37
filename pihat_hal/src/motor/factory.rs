//! Motor construction from typed configuration.

use crate::context::HalContext;
use crate::driver_registry::SharedDriver;
use crate::motor::{GpioDcMotor, I2cDcMotor, Motor};
use pihat_common::hal::config::MotorConfig;
use pihat_common::hal::error::{CloseFailure, HalError, HalResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Build one motor.
///
/// I2C-driven motors use `driver` when given, otherwise a driver is created
/// from the motor's own driver config. `driver` is ignored for GPIO motors.
pub fn create_motor(
    ctx: &HalContext,
    config: &MotorConfig,
    driver: Option<SharedDriver>,
) -> HalResult<Box<dyn Motor>> {
    config.validate()?;
    debug!(motor = %config.name(), "Creating motor");
    match config {
        MotorConfig::GpioDc(cfg) => {
            if driver.is_some() {
                warn!(motor = %cfg.name, "Ignoring shared driver for GPIO motor");
            }
            Ok(Box::new(GpioDcMotor::new(cfg, ctx.pins.as_ref())?))
        }
        MotorConfig::I2cDc(cfg) => {
            let driver = match driver {
                Some(driver) => driver,
                None => ctx.create_driver(&cfg.driver, None)?,
            };
            Ok(Box::new(I2cDcMotor::new(cfg, driver, ctx.pins.as_ref())?))
        }
    }
}

/// Build the left and right motors.
///
/// When no driver is passed and both motors are I2C-driven with identical
/// driver configs, one driver is created and shared between them. If the
/// right motor fails, the left one is closed before the error is returned.
pub fn create_motor_pair(
    ctx: &HalContext,
    left: &MotorConfig,
    right: &MotorConfig,
    driver: Option<SharedDriver>,
) -> HalResult<(Box<dyn Motor>, Box<dyn Motor>)> {
    let driver = match (driver, left, right) {
        (Some(driver), _, _) => Some(driver),
        (None, MotorConfig::I2cDc(l), MotorConfig::I2cDc(r)) if l.driver == r.driver => {
            left.validate()?;
            right.validate()?;
            Some(ctx.create_driver(&l.driver, None)?)
        }
        (None, _, _) => None,
    };
    create_motor_pair_with(ctx, left, right, driver.as_ref().map(Arc::clone), driver)
}

/// Build the left and right motors, each with its own optional driver.
pub fn create_motor_pair_with(
    ctx: &HalContext,
    left: &MotorConfig,
    right: &MotorConfig,
    left_driver: Option<SharedDriver>,
    right_driver: Option<SharedDriver>,
) -> HalResult<(Box<dyn Motor>, Box<dyn Motor>)> {
    let mut left_motor = create_motor(ctx, left, left_driver)?;
    match create_motor(ctx, right, right_driver) {
        Ok(right_motor) => Ok((left_motor, right_motor)),
        Err(err) => {
            if let Err(close_err) = left_motor.close() {
                return Err(HalError::CloseFailed(vec![
                    CloseFailure {
                        resource: right.name().to_string(),
                        error: err,
                    },
                    CloseFailure {
                        resource: left.name().to_string(),
                        error: close_err,
                    },
                ]));
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pihat_common::hal::config::{
        ChannelId, GpioDcMotorConfig, I2cDcMotorConfig, MotorDirection, PwmDriverConfig,
    };
    use pihat_common::hal::gpio::PinId;

    fn i2c(name: &str, channel: &str, dir: &str) -> MotorConfig {
        MotorConfig::I2cDc(I2cDcMotorConfig {
            name: name.to_string(),
            max_speed: 100,
            calibration_direction: MotorDirection::Forward,
            driver: PwmDriverConfig::new("Sunfounder", 1, 0x14),
            channel: ChannelId::from(channel),
            dir_pin: PinId::from(dir),
        })
    }

    #[test]
    fn pair_shares_one_driver() {
        let (ctx, factory, _pins) = HalContext::mock();
        let (mut left, mut right) =
            create_motor_pair(&ctx, &i2c("left", "P12", "D4"), &i2c("right", "P13", "D5"), None)
                .unwrap();
        assert_eq!(factory.open_count(1), 1);
        assert_eq!(ctx.buses.user_count(1), 1);

        left.close().unwrap();
        assert!(ctx.buses.is_open(1));
        right.close().unwrap();
        assert!(!ctx.buses.is_open(1));
    }

    #[test]
    fn gpio_motor_from_config() {
        let (ctx, factory, _pins) = HalContext::mock();
        let config = MotorConfig::GpioDc(GpioDcMotorConfig {
            name: "left".to_string(),
            max_speed: 100,
            calibration_direction: MotorDirection::Forward,
            forward_pin: PinId::from(6u8),
            backward_pin: PinId::from(13u8),
            pwm: true,
            enable_pin: None,
        });
        let motor = create_motor(&ctx, &config, None).unwrap();
        assert_eq!(motor.name(), "left");
        assert_eq!(factory.total_opens(), 0);
    }

    #[test]
    fn failed_right_closes_left() {
        let (ctx, _factory, pins) = HalContext::mock();
        let mut right = i2c("right", "P13", "D5");
        if let MotorConfig::I2cDc(c) = &mut right {
            c.driver.name = "Unregistered".to_string();
        }
        let result = create_motor_pair(&ctx, &i2c("left", "P12", "D4"), &right, None);
        assert!(result.is_err());
        assert!(pins.is_closed("D4"));
        assert!(!ctx.buses.is_open(1));
    }

    #[test]
    fn unknown_driver_fails_before_pins() {
        let (ctx, factory, pins) = HalContext::mock();
        let mut config = i2c("left", "P12", "D4");
        if let MotorConfig::I2cDc(c) = &mut config {
            c.driver.name = "Unregistered".to_string();
        }
        let result = create_motor(&ctx, &config, None);
        assert!(matches!(result, Err(HalError::UnknownDriverType(_))));
        assert_eq!(factory.total_opens(), 0);
        assert_eq!(pins.level("D4"), None);
    }
}
