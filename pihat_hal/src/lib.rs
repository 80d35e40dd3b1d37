//! # PiHat HAL Library
//!
//! Hardware abstraction for Raspberry Pi robot HATs: reference-counted I2C
//! buses, pluggable PWM drivers, DC motors, servos and the services built on
//! top of them.
//!
//! Contracts (bus primitive, PWM capability, GPIO pins, typed configs and the
//! error taxonomy) live in `pihat_common`; this crate implements them.
//!
//! # Module Structure
//!
//! - [`bus`] - Bus manager, Linux i2c-dev backend, in-memory mock bus
//! - [`driver_registry`] - Driver type name -> constructor
//! - [`drivers`] - PCA9685, Sunfounder MCU and recording mock drivers
//! - [`gpio`] - Pin providers
//! - [`motor`] - GPIO-direct and I2C-driven DC motors
//! - [`servo`] - Angle to pulse mapping, driver and GPIO servos
//! - [`calibration`] - Servo calibration transforms
//! - [`service`] - Motor and servo services
//! - [`core`] - `RobotHal`, a whole robot built from `robot.toml`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          RobotHal                                │
//! │   ┌──────────────┐                       ┌──────────────────┐    │
//! │   │ MotorService │                       │ ServoService × n │    │
//! │   └──────┬───────┘                       └────────┬─────────┘    │
//! │          ▼                                        ▼              │
//! │   ┌──────────────┐   ┌──────────────────┐  ┌─────────────┐       │
//! │   │ Motor × 2    │──►│ PwmDriver        │◄─│ Servo       │       │
//! │   └──────┬───────┘   │ (shared, Arc)    │  └──────┬──────┘       │
//! │          │           └────────┬─────────┘         │              │
//! │          ▼                    ▼                   ▼              │
//! │   ┌──────────────┐   ┌──────────────────┐  ┌─────────────┐       │
//! │   │ PinProvider  │   │ BusManager       │  │ PinProvider │       │
//! │   └──────────────┘   │ (refcounted I2C) │  └─────────────┘       │
//! │                      └──────────────────┘                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod bus;
pub mod calibration;
pub mod context;
pub mod core;
pub mod driver_registry;
pub mod drivers;
pub mod gpio;
pub mod motor;
pub mod servo;
pub mod service;

// Re-export key types for convenience
pub use crate::bus::{BusHandle, BusManager};
pub use crate::calibration::{CalibrationMode, calibrate};
pub use crate::context::HalContext;
pub use crate::core::RobotHal;
pub use crate::driver_registry::{
    DriverRegistry, DuplicatePolicy, SharedDriver, create_pwm_driver, get_driver_factory,
    register_driver,
};
pub use crate::motor::{Motor, create_motor, create_motor_pair};
pub use crate::servo::{Servo, create_servo};
pub use crate::service::{MotorService, ServoService, create_servo_service};
