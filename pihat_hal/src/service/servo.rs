//! Calibrated, bounded servo control.

use crate::calibration::CalibrationMode;
use crate::context::HalContext;
use crate::driver_registry::SharedDriver;
use crate::servo::{Servo, create_servo};
use pihat_common::hal::config::ServoServiceConfig;
use pihat_common::hal::error::{HalError, HalResult};
use tracing::{debug, error, info};

/// A servo with user-facing bounds and a calibration offset.
///
/// `current_angle` is always the uncalibrated angle last applied
/// successfully. The offset has a transient value and a persisted one that
/// [`ServoService::reset_calibration`] restores.
pub struct ServoService {
    name: String,
    servo: Option<Box<dyn Servo>>,
    min_angle: f64,
    max_angle: f64,
    mode: CalibrationMode,
    offset: f64,
    persisted_offset: f64,
    current_angle: f64,
}

impl ServoService {
    /// Wrap `servo` and move it to the calibrated neutral angle.
    pub fn new(
        name: impl Into<String>,
        servo: Box<dyn Servo>,
        min_angle: f64,
        max_angle: f64,
        mode: CalibrationMode,
        offset: f64,
    ) -> HalResult<Self> {
        let name = name.into();
        if !(min_angle <= max_angle) {
            return Err(HalError::InvalidArgument(format!(
                "servo '{name}': min_angle ({min_angle}) must be <= max_angle ({max_angle})"
            )));
        }
        let mut service = Self {
            name,
            servo: Some(servo),
            min_angle,
            max_angle,
            mode,
            offset,
            persisted_offset: offset,
            current_angle: 0.0,
        };
        service.reset()?;
        info!(servo = %service.name, mode = ?service.mode, offset, "Servo service ready");
        Ok(service)
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uncalibrated angle last applied.
    pub fn current_angle(&self) -> f64 {
        self.current_angle
    }

    /// Offset in effect.
    pub fn calibration_offset(&self) -> f64 {
        self.offset
    }

    /// Offset restored by [`ServoService::reset_calibration`].
    pub fn persisted_calibration_offset(&self) -> f64 {
        self.persisted_offset
    }

    /// Calibration transform.
    pub fn calibration_mode(&self) -> &CalibrationMode {
        &self.mode
    }

    /// User-facing angle bounds.
    pub fn bounds(&self) -> (f64, f64) {
        (self.min_angle, self.max_angle)
    }

    /// Angle `reset` returns to: 0° when the bounds allow it, otherwise
    /// their midpoint.
    pub fn neutral_angle(&self) -> f64 {
        if self.min_angle <= 0.0 && 0.0 <= self.max_angle {
            0.0
        } else {
            (self.min_angle + self.max_angle) / 2.0
        }
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.servo.is_none()
    }

    /// Move to `angle` after calibration.
    ///
    /// # Errors
    /// `AngleOutOfRange` if `angle` is outside the service bounds or the
    /// calibrated angle is outside the servo's; the custom transform's own
    /// error; bus failures. `current_angle` is unchanged on error.
    pub fn set_angle(&mut self, angle: f64) -> HalResult<()> {
        self.apply(angle, self.offset)
    }

    /// Change the offset and re-center with it. `persist` also makes it the
    /// value restored by [`ServoService::reset_calibration`].
    ///
    /// The offset is only committed once the servo accepted it.
    pub fn update_calibration(&mut self, offset: f64, persist: bool) -> HalResult<f64> {
        if !offset.is_finite() {
            return Err(HalError::InvalidArgument(
                "calibration offset must be finite".to_string(),
            ));
        }
        debug!(
            servo = %self.name,
            from = self.offset,
            to = offset,
            persist,
            "Updating calibration offset"
        );
        self.apply(self.neutral_angle(), offset)?;
        self.offset = offset;
        if persist {
            self.persisted_offset = offset;
        }
        Ok(self.offset)
    }

    /// Restore the persisted offset and re-center.
    pub fn reset_calibration(&mut self) -> HalResult<f64> {
        debug!(
            servo = %self.name,
            from = self.offset,
            to = self.persisted_offset,
            "Resetting calibration offset"
        );
        self.apply(self.neutral_angle(), self.persisted_offset)?;
        self.offset = self.persisted_offset;
        Ok(self.offset)
    }

    /// Move to the neutral angle.
    pub fn reset(&mut self) -> HalResult<()> {
        self.set_angle(self.neutral_angle())
    }

    /// Release the servo. A second call is a no-op.
    pub fn close(&mut self) -> HalResult<()> {
        match self.servo.take() {
            Some(mut servo) => {
                servo.close()?;
                info!(servo = %self.name, "Servo service closed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn apply(&mut self, angle: f64, offset: f64) -> HalResult<()> {
        let servo = self
            .servo
            .as_mut()
            .ok_or_else(|| HalError::ServiceClosed(self.name.clone()))?;
        if angle.is_nan() {
            return Err(HalError::InvalidArgument("angle must be a number".to_string()));
        }
        if angle < self.min_angle || angle > self.max_angle {
            return Err(HalError::AngleOutOfRange {
                angle,
                min: self.min_angle,
                max: self.max_angle,
            });
        }
        let calibrated = self.mode.apply(angle, offset)?;
        debug!(
            servo = %self.name,
            from = self.current_angle,
            to = angle,
            calibrated,
            "Setting servo angle"
        );
        servo.set_angle(calibrated)?;
        self.current_angle = angle;
        Ok(())
    }
}

impl Drop for ServoService {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(servo = %self.name, error = %e, "Failed to close servo");
        }
    }
}

/// Build a servo service from config.
pub fn create_servo_service(
    ctx: &HalContext,
    config: &ServoServiceConfig,
    driver: Option<SharedDriver>,
) -> HalResult<ServoService> {
    config.validate()?;
    let servo = create_servo(ctx, &config.servo, driver)?;
    ServoService::new(
        config.name.clone(),
        servo,
        config.min_angle,
        config.max_angle,
        CalibrationMode::from(config.calibration_mode),
        config.calibration_offset,
    )
}
