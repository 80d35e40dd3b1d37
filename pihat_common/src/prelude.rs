//! Prelude module for common re-exports.
//!
//! ```rust
//! use pihat_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig, Validate};
pub use crate::hal::config::{
    CalibrationKind, ChannelId, GpioDcMotorConfig, I2cDcMotorConfig, MotorConfig,
    MotorDirection, MotorPairConfig, PwmDriverConfig, RobotConfig, ServoConfig, ServoOutput,
    ServoServiceConfig,
};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{
    DEFAULT_FRAME_WIDTH_US, DEFAULT_I2C_BUS, DEFAULT_MAX_SPEED, DEFAULT_PWM_ADDRESS,
    DEFAULT_PWM_FREQ_HZ,
};

// ─── HAL contracts ──────────────────────────────────────────────────
pub use crate::hal::bus::{BusFactory, BusIndex, I2cBus};
pub use crate::hal::driver::PwmDriver;
pub use crate::hal::error::{CloseFailure, HalError, HalResult};
pub use crate::hal::gpio::{OutputPin, PinId, PinProvider, PwmPin};
