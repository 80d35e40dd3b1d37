//! # Service Tests
//!
//! Servo and motor services end to end over the in-memory bus, the
//! recording driver and recording pins.

use pihat_common::hal::config::{
    CalibrationKind, ChannelId, GpioDcMotorConfig, I2cDcMotorConfig, MotorConfig, MotorDirection,
    PwmDriverConfig, ServoConfig, ServoServiceConfig,
};
use pihat_common::hal::error::HalError;
use pihat_common::hal::gpio::PinId;
use pihat_hal::drivers::{MockDriver, MockDriverLog};
use pihat_hal::gpio::mock::{MockPins, PinLevel};
use pihat_hal::{HalContext, MotorService, create_motor_pair, create_servo_service};

fn context() -> (HalContext, MockDriverLog, MockPins) {
    let (ctx, _factory, pins) = HalContext::mock();
    let log = MockDriverLog::new();
    let mut registry = (*ctx.registry).clone();
    log.register(&mut registry, MockDriver::TYPE_NAME).unwrap();
    (ctx.with_registry(registry), log, pins)
}

fn servo_config(mode: CalibrationKind, offset: f64) -> ServoServiceConfig {
    let mut servo = ServoConfig::new("P0");
    servo.driver = Some(PwmDriverConfig::new("Mock", 1, 0x40));
    ServoServiceConfig {
        name: "cam_pan".to_string(),
        servo,
        min_angle: -90.0,
        max_angle: 90.0,
        calibration_mode: mode,
        calibration_offset: offset,
    }
}

// ─── ServoService ───────────────────────────────────────────────────

#[test]
fn test_sum_mode_reports_uncalibrated_angle() {
    let (ctx, log, _pins) = context();
    let mut servo = create_servo_service(&ctx, &servo_config(CalibrationKind::Sum, 4.5), None)
        .unwrap();

    servo.set_angle(-45.0).unwrap();
    assert_eq!(servo.current_angle(), -45.0);
    // -40.5° -> 500 + 49.5/180 * 2000
    assert_eq!(log.last_pulse(0), Some(1050));
}

#[test]
fn test_double_close_is_noop() {
    let (ctx, log, _pins) = context();
    let mut servo = create_servo_service(&ctx, &servo_config(CalibrationKind::Sum, 0.0), None)
        .unwrap();
    servo.close().unwrap();
    servo.close().unwrap();

    let closes = log
        .calls()
        .into_iter()
        .filter(|c| *c == pihat_hal::drivers::DriverCall::Close)
        .count();
    assert_eq!(closes, 1);
    assert!(matches!(servo.set_angle(10.0), Err(HalError::ServiceClosed(_))));
    assert!(matches!(servo.reset_calibration(), Err(HalError::ServiceClosed(_))));
}

#[test]
fn test_calibration_persistence_rules() {
    let (ctx, _log, _pins) = context();
    let mut servo = create_servo_service(&ctx, &servo_config(CalibrationKind::Negative, -2.0), None)
        .unwrap();

    servo.update_calibration(5.0, false).unwrap();
    assert_eq!(servo.reset_calibration().unwrap(), -2.0);

    servo.update_calibration(3.0, true).unwrap();
    servo.update_calibration(8.0, false).unwrap();
    assert_eq!(servo.calibration_offset(), 8.0);
    assert_eq!(servo.reset_calibration().unwrap(), 3.0);
}

#[test]
fn test_gpio_servo_service() {
    let (ctx, _log, pins) = context();
    let mut servo = ServoConfig::new(ChannelId::Index(18));
    servo.output = pihat_common::hal::config::ServoOutput::Gpio;
    let config = ServoServiceConfig {
        name: "gripper".to_string(),
        servo,
        min_angle: -45.0,
        max_angle: 45.0,
        calibration_mode: CalibrationKind::Sum,
        calibration_offset: 0.0,
    };

    let mut service = create_servo_service(&ctx, &config, None).unwrap();
    service.set_angle(45.0).unwrap();
    assert_eq!(pins.level(18u8), Some(PinLevel::Duty(2000.0 / 20000.0)));
    drop(service);
    assert!(pins.is_closed(18u8));
}

// ─── MotorService ───────────────────────────────────────────────────

fn i2c_motor(name: &str, channel: u8, dir: &str, max_speed: u32) -> MotorConfig {
    MotorConfig::I2cDc(I2cDcMotorConfig {
        name: name.to_string(),
        max_speed,
        calibration_direction: MotorDirection::Forward,
        driver: PwmDriverConfig::new("Mock", 1, 0x40),
        channel: ChannelId::Index(channel),
        dir_pin: PinId::from(dir),
    })
}

#[test]
fn test_move_clamps_to_max_speed() {
    let (ctx, log, _pins) = context();
    let (left, right) = create_motor_pair(
        &ctx,
        &i2c_motor("left", 12, "D4", 100),
        &i2c_motor("right", 13, "D5", 100),
        None,
    )
    .unwrap();
    let mut motors = MotorService::new(left, right);

    motors.drive(150.0, 1).unwrap();
    assert_eq!(motors.speed(), 100.0);
    assert_eq!(motors.left().unwrap().speed(), 100.0);
    assert_eq!(log.last_duty(12), Some(100.0));
    assert_eq!(log.constructed(), 1);
}

#[test]
fn test_reversed_motor_wiring() {
    let (ctx, _log, pins) = context();
    let mut right = i2c_motor("right", 13, "D5", 100);
    if let MotorConfig::I2cDc(cfg) = &mut right {
        cfg.calibration_direction = MotorDirection::Reverse;
    }
    let (left, right) =
        create_motor_pair(&ctx, &i2c_motor("left", 12, "D4", 100), &right, None).unwrap();
    let mut motors = MotorService::new(left, right);

    motors.drive(40.0, 1).unwrap();
    assert_eq!(pins.level("D4"), Some(PinLevel::Low));
    assert_eq!(pins.level("D5"), Some(PinLevel::High));
}

#[test]
fn test_gpio_motor_pair_and_close() {
    let (ctx, _log, pins) = context();
    let gpio = |name: &str, fwd: u8, bwd: u8| {
        MotorConfig::GpioDc(GpioDcMotorConfig {
            name: name.to_string(),
            max_speed: 100,
            calibration_direction: MotorDirection::Forward,
            forward_pin: PinId::from(fwd),
            backward_pin: PinId::from(bwd),
            pwm: true,
            enable_pin: None,
        })
    };
    let (left, right) =
        create_motor_pair(&ctx, &gpio("left", 5, 6), &gpio("right", 13, 19), None).unwrap();
    let mut motors = MotorService::new(left, right);

    motors.drive(25.0, -1).unwrap();
    assert_eq!(pins.level(6u8), Some(PinLevel::Duty(0.25)));
    assert_eq!(pins.level(19u8), Some(PinLevel::Duty(0.25)));

    motors.stop_all().unwrap();
    assert_eq!(pins.level(6u8), Some(PinLevel::Duty(0.0)));

    motors.close().unwrap();
    motors.close().unwrap();
    for pin in [5u8, 6, 13, 19] {
        assert!(pins.is_closed(pin));
    }
}

#[test]
fn test_close_attempts_both_motors() {
    let (ctx, _log, pins) = context();
    let (left, right) = create_motor_pair(
        &ctx,
        &i2c_motor("left", 12, "D4", 100),
        &i2c_motor("right", 13, "D5", 100),
        None,
    )
    .unwrap();
    let mut motors = MotorService::new(left, right);
    pins.set_close_failing("D4");

    let err = motors.close().unwrap_err();
    let HalError::CloseFailed(failures) = err else {
        panic!("expected CloseFailed, got {err:?}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].resource, "left");
    assert!(pins.is_closed("D5"));
    assert!(!ctx.buses.is_open(1));
}
