//! Differential drive over a left/right motor pair.

use crate::motor::Motor;
use pihat_common::hal::error::{CloseFailure, HalError, HalResult, collect_close_failures};
use tracing::{debug, error, info};

/// Drives two motors together.
///
/// Published `speed` and `direction` change only when both motors accepted
/// the command. A failure on the second motor leaves the first one running
/// at its new speed; re-query or `stop_all` after an error.
pub struct MotorService {
    motors: Option<(Box<dyn Motor>, Box<dyn Motor>)>,
    speed: f64,
    direction: i8,
}

impl MotorService {
    /// Take ownership of both motors.
    pub fn new(left: Box<dyn Motor>, right: Box<dyn Motor>) -> Self {
        info!(left = left.name(), right = right.name(), "Motor service ready");
        Self {
            motors: Some((left, right)),
            speed: 0.0,
            direction: 0,
        }
    }

    /// Last speed applied to both motors.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Last direction applied: -1, 0 or 1.
    pub fn direction(&self) -> i8 {
        self.direction
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.motors.is_none()
    }

    /// Left motor, while open.
    pub fn left(&self) -> Option<&dyn Motor> {
        self.motors.as_ref().map(|(left, _)| left.as_ref())
    }

    /// Right motor, while open.
    pub fn right(&self) -> Option<&dyn Motor> {
        self.motors.as_ref().map(|(_, right)| right.as_ref())
    }

    /// Drive both motors at `speed` percent in `direction`.
    ///
    /// `speed` is clamped to `[0, max_speed]` of each motor separately;
    /// `direction` 0 stops both. Each motor applies its own calibration
    /// direction.
    ///
    /// # Errors
    /// `InvalidArgument` for a direction outside {-1, 0, 1} or a NaN speed,
    /// before any motor is touched.
    pub fn drive(&mut self, speed: f64, direction: i8) -> HalResult<()> {
        if !matches!(direction, -1..=1) {
            return Err(HalError::InvalidArgument(format!(
                "direction must be -1, 0 or 1, got {direction}"
            )));
        }
        if speed.is_nan() {
            return Err(HalError::InvalidArgument("speed must be a number".to_string()));
        }
        let (left, right) = self.motors_mut()?;

        let sign = f64::from(direction);
        let left_speed = speed.clamp(0.0, f64::from(left.max_speed())) * sign;
        let right_speed = speed.clamp(0.0, f64::from(right.max_speed())) * sign;
        debug!(speed, direction, left_speed, right_speed, "Driving");

        left.set_speed(left_speed)?;
        right.set_speed(right_speed)?;

        self.speed = left_speed.abs().max(right_speed.abs());
        self.direction = direction;
        Ok(())
    }

    /// Stop both motors. Both are attempted even if the first fails.
    pub fn stop_all(&mut self) -> HalResult<()> {
        let (left, right) = self.motors_mut()?;
        let mut failures = Vec::new();
        for motor in [left, right] {
            if let Err(error) = motor.stop() {
                failures.push(CloseFailure {
                    resource: motor.name().to_string(),
                    error,
                });
            }
        }
        self.speed = 0.0;
        self.direction = 0;
        collect_close_failures(failures)
    }

    /// Close both motors, collecting every failure. A second call is a no-op.
    pub fn close(&mut self) -> HalResult<()> {
        let Some((mut left, mut right)) = self.motors.take() else {
            return Ok(());
        };
        let mut failures = Vec::new();
        for motor in [&mut left, &mut right] {
            if let Err(error) = motor.close() {
                error!(motor = motor.name(), error = %error, "Failed to close motor");
                failures.push(CloseFailure {
                    resource: motor.name().to_string(),
                    error,
                });
            }
        }
        self.speed = 0.0;
        self.direction = 0;
        info!("Motor service closed");
        collect_close_failures(failures)
    }

    fn motors_mut(&mut self) -> HalResult<(&mut Box<dyn Motor>, &mut Box<dyn Motor>)> {
        match self.motors.as_mut() {
            Some((left, right)) => Ok((left, right)),
            None => Err(HalError::ServiceClosed("motors".to_string())),
        }
    }
}

impl Drop for MotorService {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "Failed to close motor service");
        }
    }
}
