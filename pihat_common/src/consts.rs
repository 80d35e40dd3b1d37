//! Defaults and hardware limits shared by every pihat crate.

use crate::hal::bus::BusIndex;

/// I2C bus exposed on the Raspberry Pi header.
pub const DEFAULT_I2C_BUS: BusIndex = 1;

/// Factory address of a PCA9685 board.
pub const DEFAULT_PWM_ADDRESS: u8 = 0x40;

/// Largest valid 7-bit I2C address.
pub const MAX_I2C_ADDRESS: u8 = 0x7F;

/// First address tried by a bus scan.
pub const I2C_SCAN_FIRST: u8 = 0x03;

/// Last address tried by a bus scan.
pub const I2C_SCAN_LAST: u8 = 0x77;

/// Servo frame width in microseconds (50 Hz).
pub const DEFAULT_FRAME_WIDTH_US: u32 = 20_000;

/// Default PWM frequency in Hz.
pub const DEFAULT_PWM_FREQ_HZ: u32 = 50;

/// Default logical servo range in degrees.
pub const DEFAULT_MIN_ANGLE: f64 = -90.0;
/// Default logical servo range in degrees.
pub const DEFAULT_MAX_ANGLE: f64 = 90.0;

/// Default servo pulse range in microseconds.
pub const DEFAULT_MIN_PULSE_US: u32 = 500;
/// Default servo pulse range in microseconds.
pub const DEFAULT_MAX_PULSE_US: u32 = 2500;

/// Default motor speed ceiling (percent).
pub const DEFAULT_MAX_SPEED: u32 = 100;

/// Default robot configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pihat/robot.toml";
