//! Recording GPIO pins.

use parking_lot::Mutex;
use pihat_common::hal::error::{HalError, HalResult};
use pihat_common::hal::gpio::{OutputPin, PinId, PinProvider, PwmPin};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Last value driven onto a pin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PinLevel {
    /// Digital low
    Low,
    /// Digital high
    High,
    /// PWM duty fraction
    Duty(f64),
}

#[derive(Default)]
struct PinsState {
    levels: HashMap<PinId, PinLevel>,
    frequencies: HashMap<PinId, u32>,
    closed: HashSet<PinId>,
    failing: HashSet<PinId>,
    close_failing: HashSet<PinId>,
    history: Vec<(PinId, PinLevel)>,
}

/// In-memory [`PinProvider`]. Clones share state.
#[derive(Clone, Default)]
pub struct MockPins {
    state: Arc<Mutex<PinsState>>,
}

impl MockPins {
    /// Provider with no pins claimed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level driven onto `pin`.
    pub fn level(&self, pin: impl Into<PinId>) -> Option<PinLevel> {
        self.state.lock().levels.get(&pin.into()).copied()
    }

    /// Last PWM frequency set on `pin`.
    pub fn frequency(&self, pin: impl Into<PinId>) -> Option<u32> {
        self.state.lock().frequencies.get(&pin.into()).copied()
    }

    /// Whether `pin` has been released.
    pub fn is_closed(&self, pin: impl Into<PinId>) -> bool {
        self.state.lock().closed.contains(&pin.into())
    }

    /// Every level change so far, in order.
    pub fn history(&self) -> Vec<(PinId, PinLevel)> {
        self.state.lock().history.clone()
    }

    /// Make level changes on `pin` fail.
    pub fn set_failing(&self, pin: impl Into<PinId>) {
        self.state.lock().failing.insert(pin.into());
    }

    /// Make closing `pin` fail.
    pub fn set_close_failing(&self, pin: impl Into<PinId>) {
        self.state.lock().close_failing.insert(pin.into());
    }

    fn claim(&self, pin: &PinId, initial: PinLevel) -> HalResult<()> {
        pin.validate()?;
        let mut state = self.state.lock();
        state.closed.remove(pin);
        state.levels.insert(pin.clone(), initial);
        Ok(())
    }

    fn drive(&self, pin: &PinId, level: PinLevel) -> HalResult<()> {
        let mut state = self.state.lock();
        if state.closed.contains(pin) {
            return Err(HalError::InvalidArgument(format!("pin {pin} is closed")));
        }
        if state.failing.contains(pin) {
            return Err(HalError::InvalidArgument(format!("pin {pin} failed")));
        }
        state.levels.insert(pin.clone(), level);
        state.history.push((pin.clone(), level));
        Ok(())
    }

    fn release(&self, pin: &PinId) -> HalResult<()> {
        let mut state = self.state.lock();
        state.closed.insert(pin.clone());
        if state.close_failing.contains(pin) {
            return Err(HalError::InvalidArgument(format!("pin {pin} failed to close")));
        }
        Ok(())
    }
}

struct MockOutputPin {
    id: PinId,
    pins: MockPins,
}

impl OutputPin for MockOutputPin {
    fn set_high(&mut self) -> HalResult<()> {
        self.pins.drive(&self.id, PinLevel::High)
    }

    fn set_low(&mut self) -> HalResult<()> {
        self.pins.drive(&self.id, PinLevel::Low)
    }

    fn close(&mut self) -> HalResult<()> {
        self.pins.release(&self.id)
    }
}

struct MockPwmPin {
    id: PinId,
    pins: MockPins,
}

impl PwmPin for MockPwmPin {
    fn set_duty(&mut self, fraction: f64) -> HalResult<()> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(HalError::InvalidArgument(format!(
                "duty fraction must be in [0, 1], got {fraction}"
            )));
        }
        self.pins.drive(&self.id, PinLevel::Duty(fraction))
    }

    fn set_frequency(&mut self, freq_hz: u32) -> HalResult<()> {
        self.pins
            .state
            .lock()
            .frequencies
            .insert(self.id.clone(), freq_hz);
        Ok(())
    }

    fn close(&mut self) -> HalResult<()> {
        self.pins.release(&self.id)
    }
}

impl PinProvider for MockPins {
    fn output(&self, pin: &PinId) -> HalResult<Box<dyn OutputPin>> {
        self.claim(pin, PinLevel::Low)?;
        Ok(Box::new(MockOutputPin {
            id: pin.clone(),
            pins: self.clone(),
        }))
    }

    fn pwm(&self, pin: &PinId) -> HalResult<Box<dyn PwmPin>> {
        self.claim(pin, PinLevel::Duty(0.0))?;
        Ok(Box::new(MockPwmPin {
            id: pin.clone(),
            pins: self.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_levels() {
        let pins = MockPins::new();
        let mut out = pins.output(&PinId::from("D4")).unwrap();
        assert_eq!(pins.level("D4"), Some(PinLevel::Low));
        out.set_high().unwrap();
        assert_eq!(pins.level("D4"), Some(PinLevel::High));
        out.close().unwrap();
        assert!(pins.is_closed("D4"));
        assert!(out.set_low().is_err());
    }

    #[test]
    fn pwm_duty_range() {
        let pins = MockPins::new();
        let mut pwm = pins.pwm(&PinId::from(12u8)).unwrap();
        pwm.set_duty(0.25).unwrap();
        assert_eq!(pins.level(12u8), Some(PinLevel::Duty(0.25)));
        assert!(pwm.set_duty(1.5).is_err());
    }
}
