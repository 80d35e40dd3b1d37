//! Servo calibration transforms.
//!
//! A calibration turns the angle an application asks for into the angle the
//! servo is actually driven to. The built-in transforms are pure:
//!
//! | Mode       | Result                  |
//! |------------|-------------------------|
//! | `Sum`      | `angle + offset`        |
//! | `Negative` | `-(angle + (-offset))`  |
//! | `Custom`   | whatever the closure returns |
//!
//! Custom closures may fail; their error is returned unchanged to the caller
//! of `set_angle`.

use pihat_common::hal::config::CalibrationKind;
use pihat_common::hal::error::HalResult;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied transform `(angle, offset) -> angle`.
pub type CalibrationFn = Arc<dyn Fn(f64, f64) -> HalResult<f64> + Send + Sync>;

/// How a calibration offset is applied.
#[derive(Clone, Default)]
pub enum CalibrationMode {
    /// Add the offset.
    #[default]
    Sum,
    /// Negate the angle, then add the offset.
    Negative,
    /// User transform.
    Custom(CalibrationFn),
}

impl CalibrationMode {
    /// Wrap a closure as a custom mode.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(f64, f64) -> HalResult<f64> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Apply the transform.
    pub fn apply(&self, angle: f64, offset: f64) -> HalResult<f64> {
        match self {
            Self::Sum => Ok(angle + offset),
            Self::Negative => Ok(-(angle + -offset)),
            Self::Custom(f) => f(angle, offset),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Negative => "negative",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for CalibrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<CalibrationKind> for CalibrationMode {
    fn from(kind: CalibrationKind) -> Self {
        match kind {
            CalibrationKind::Sum => Self::Sum,
            CalibrationKind::Negative => Self::Negative,
        }
    }
}

/// `mode.apply(angle, offset)` as a free function.
pub fn calibrate(mode: &CalibrationMode, angle: f64, offset: f64) -> HalResult<f64> {
    mode.apply(angle, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pihat_common::hal::error::HalError;

    #[test]
    fn sum_adds_offset() {
        assert_eq!(calibrate(&CalibrationMode::Sum, 15.0, -14.4).unwrap(), 15.0 - 14.4);
        assert_eq!(calibrate(&CalibrationMode::Sum, 0.0, 0.0).unwrap(), 0.0);
    }

    #[test]
    fn negative_mirrors_angle() {
        let mode = CalibrationMode::Negative;
        assert_eq!(mode.apply(20.0, 1.4).unwrap(), -(20.0 - 1.4));
        assert_eq!(mode.apply(-20.0, -3.0).unwrap(), 17.0);
        assert_eq!(mode.apply(25.0, 0.0).unwrap(), -25.0);
    }

    #[test]
    fn custom_errors_propagate() {
        let mode = CalibrationMode::custom(|angle, offset| {
            if angle > 45.0 {
                Err(HalError::InvalidArgument("too far".to_string()))
            } else {
                Ok(angle * 2.0 + offset)
            }
        });
        assert_eq!(mode.apply(10.0, 1.0).unwrap(), 21.0);
        assert!(matches!(mode.apply(50.0, 0.0), Err(HalError::InvalidArgument(_))));
        assert_eq!(format!("{mode:?}"), "custom");
    }

    #[test]
    fn from_config_kind() {
        assert_eq!(CalibrationMode::from(CalibrationKind::Negative).label(), "negative");
        assert_eq!(CalibrationMode::from(CalibrationKind::default()).label(), "sum");
    }
}
