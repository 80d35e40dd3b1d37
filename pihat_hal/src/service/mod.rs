//! Application-facing services.
//!
//! Services own their motors or servos and add the state an application
//! cares about: published speed/direction for the drive motors, bounds,
//! calibration offsets and the current angle for servos. Both are `Active`
//! until `close()`; afterwards every mutating call fails with
//! `ServiceClosed` and a repeated `close()` does nothing. Dropping a service
//! closes it.

mod motor;
mod servo;

pub use motor::MotorService;
pub use servo::{ServoService, create_servo_service};
