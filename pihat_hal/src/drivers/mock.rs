//! Recording PWM driver.
//!
//! Touches no registers; every call is appended to a shared [`MockDriverLog`]
//! so tests (and `pihat --mock`) can see exactly what reached the driver.

use crate::bus::BusHandle;
use crate::driver_registry::{DriverArgs, DriverRegistry};
use parking_lot::Mutex;
use pihat_common::hal::driver::{PwmDriver, validate_channel, validate_duty_cycle};
use pihat_common::hal::error::{HalError, HalResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// One call observed by a [`MockDriver`].
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    /// `set_pwm_freq`
    Freq(u32),
    /// `set_servo_pulse`
    ServoPulse {
        /// Channel
        channel: u8,
        /// Pulse width in microseconds
        pulse_us: u32,
    },
    /// `set_pwm_duty_cycle`
    DutyCycle {
        /// Channel
        channel: u8,
        /// Duty in percent
        duty: f64,
    },
    /// `close`
    Close,
}

#[derive(Default)]
struct LogState {
    calls: Mutex<Vec<DriverCall>>,
    constructed: AtomicUsize,
    failing: AtomicBool,
}

/// Shared record of every [`MockDriver`] built from one log.
#[derive(Clone, Default)]
pub struct MockDriverLog {
    state: Arc<LogState>,
}

impl MockDriverLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for drivers writing to this log.
    pub fn register(&self, registry: &mut DriverRegistry, type_name: &str) -> HalResult<()> {
        let log = self.clone();
        registry.register(type_name, move |args: DriverArgs| -> HalResult<Box<dyn PwmDriver>> {
            Ok(Box::new(MockDriver::new(log.clone(), args)))
        })
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.calls.lock().clone()
    }

    /// Frequencies passed to `set_pwm_freq`.
    pub fn freq_calls(&self) -> Vec<u32> {
        self.state
            .calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                DriverCall::Freq(hz) => Some(*hz),
                _ => None,
            })
            .collect()
    }

    /// Most recent pulse width sent to `channel`.
    pub fn last_pulse(&self, channel: u8) -> Option<u32> {
        self.state.calls.lock().iter().rev().find_map(|call| match call {
            DriverCall::ServoPulse { channel: c, pulse_us } if *c == channel => Some(*pulse_us),
            _ => None,
        })
    }

    /// Most recent duty cycle sent to `channel`.
    pub fn last_duty(&self, channel: u8) -> Option<f64> {
        self.state.calls.lock().iter().rev().find_map(|call| match call {
            DriverCall::DutyCycle { channel: c, duty } if *c == channel => Some(*duty),
            _ => None,
        })
    }

    /// Number of drivers constructed.
    pub fn constructed(&self) -> usize {
        self.state.constructed.load(Ordering::SeqCst)
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.state.calls.lock().clear();
    }

    /// Make every later output call fail with an I2C error.
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, bus: &BusHandle, call: DriverCall) -> HalResult<()> {
        if self.state.failing.load(Ordering::SeqCst) && call != DriverCall::Close {
            return Err(HalError::I2cBus {
                bus: bus.index(),
                reason: "injected failure".to_string(),
            });
        }
        debug!(?call, "Mock driver call");
        self.state.calls.lock().push(call);
        Ok(())
    }
}

/// Driver that records instead of writing registers.
pub struct MockDriver {
    log: MockDriverLog,
    bus: BusHandle,
}

impl MockDriver {
    /// Type name used by `pihat --mock` and the tests.
    pub const TYPE_NAME: &'static str = "Mock";
    /// Output channels.
    pub const CHANNELS: u8 = 16;

    /// Build a driver on `args.bus` writing to `log`.
    pub fn new(log: MockDriverLog, args: DriverArgs) -> Self {
        log.state.constructed.fetch_add(1, Ordering::SeqCst);
        debug!(bus = args.bus.index(), address = args.address, "Mock driver created");
        Self { log, bus: args.bus }
    }
}

impl PwmDriver for MockDriver {
    fn driver_type(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn set_pwm_freq(&mut self, freq_hz: u32) -> HalResult<()> {
        if freq_hz == 0 {
            return Err(HalError::InvalidArgument("frequency must be > 0".to_string()));
        }
        self.log.record(&self.bus, DriverCall::Freq(freq_hz))
    }

    fn set_servo_pulse(&mut self, channel: u8, pulse_us: u32) -> HalResult<()> {
        validate_channel(Self::TYPE_NAME, channel, Self::CHANNELS)?;
        self.log.record(&self.bus, DriverCall::ServoPulse { channel, pulse_us })
    }

    fn set_pwm_duty_cycle(&mut self, channel: u8, duty_percent: f64) -> HalResult<()> {
        validate_duty_cycle(duty_percent)?;
        validate_channel(Self::TYPE_NAME, channel, Self::CHANNELS)?;
        self.log.record(
            &self.bus,
            DriverCall::DutyCycle {
                channel,
                duty: duty_percent,
            },
        )
    }

    fn close(&mut self) -> HalResult<()> {
        self.log.record(&self.bus, DriverCall::Close)?;
        self.bus.release()
    }
}
