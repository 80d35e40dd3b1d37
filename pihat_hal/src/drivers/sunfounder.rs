//! Sunfounder Robot HAT PWM (on-board MCU, 20 channels, 7 timers).
//!
//! All writes are `[register, high, low]`. Channels 0-15 share timers in
//! groups of four; 16-17 use timer 4, 18 timer 5, 19 timer 6. The prescaler
//! and period registers are programmed for every timer on each frequency
//! change.

use crate::bus::BusHandle;
use crate::driver_registry::DriverArgs;
use pihat_common::hal::driver::{PwmDriver, validate_channel, validate_duty_cycle};
use pihat_common::hal::error::{HalError, HalResult};
use tracing::debug;

const REG_CHN: u8 = 0x20;
const REG_PSC: u8 = 0x40;
const REG_ARR: u8 = 0x44;
const REG_PSC2: u8 = 0x50;
const REG_ARR2: u8 = 0x54;

const CLOCK_HZ: f64 = 72_000_000.0;
const NUM_TIMERS: u8 = 7;
const PRESCALER_SQRT_OFFSET: i64 = 5;
const PRESCALER_SEARCH_WINDOW: i64 = 10;

/// Prescaler and auto-reload pair for one frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    /// Clock divider (the register holds `prescaler - 1`).
    pub prescaler: u16,
    /// Counts per period.
    pub period: u16,
}

impl TimerSettings {
    /// Pick the prescaler/period pair closest to `freq_hz`.
    ///
    /// Candidates start at `sqrt(clock / freq) - 5` (at least 1) and span a
    /// window of ten prescalers; the first pair with the smallest frequency
    /// error wins.
    pub fn for_frequency(freq_hz: u32) -> HalResult<Self> {
        if freq_hz == 0 {
            return Err(HalError::InvalidArgument(
                "PWM frequency must be greater than 0".to_string(),
            ));
        }
        let freq = f64::from(freq_hz);
        let start = ((CLOCK_HZ / freq).sqrt() as i64 - PRESCALER_SQRT_OFFSET).max(1);

        let mut best: Option<(f64, Self)> = None;
        for psc in start..start + PRESCALER_SEARCH_WINDOW {
            let arr = (CLOCK_HZ / freq / psc as f64) as i64;
            let (Ok(prescaler), Ok(period)) = (u16::try_from(psc), u16::try_from(arr)) else {
                continue;
            };
            if period == 0 {
                continue;
            }
            let achieved = CLOCK_HZ / psc as f64 / arr as f64;
            let error = (freq - achieved).abs();
            if best.is_none_or(|(best_error, _)| error < best_error) {
                best = Some((error, Self { prescaler, period }));
            }
        }

        best.map(|(_, settings)| settings).ok_or_else(|| {
            HalError::InvalidArgument(format!("Sunfounder PWM cannot generate {freq_hz} Hz"))
        })
    }
}

/// Timer that drives `channel`.
pub fn timer_for_channel(channel: u8) -> u8 {
    match channel {
        0..=15 => channel / 4,
        16 | 17 => 4,
        18 => 5,
        _ => 6,
    }
}

/// Sunfounder MCU PWM driver.
pub struct SunfounderPwm {
    bus: BusHandle,
    address: u8,
    frame_width: u32,
    settings: TimerSettings,
}

impl SunfounderPwm {
    /// Registry name.
    pub const TYPE_NAME: &'static str = "Sunfounder";
    /// Output channels.
    pub const CHANNELS: u8 = 20;

    /// Take ownership of the bus reference and program the configured frequency.
    pub fn new(args: DriverArgs) -> HalResult<Self> {
        let settings = TimerSettings::for_frequency(args.freq)?;
        let mut driver = Self {
            bus: args.bus,
            address: args.address,
            frame_width: args.frame_width,
            settings,
        };
        driver.program_timers()?;
        Ok(driver)
    }

    /// Timer settings currently programmed.
    pub fn settings(&self) -> TimerSettings {
        self.settings
    }

    fn program_timers(&mut self) -> HalResult<()> {
        let TimerSettings { prescaler, period } = self.settings;
        for timer in 0..NUM_TIMERS {
            let (reg_psc, reg_arr) = if timer < 4 {
                (REG_PSC + timer, REG_ARR + timer)
            } else {
                (REG_PSC2 + timer - 4, REG_ARR2 + timer - 4)
            };
            self.bus.write_word_be(self.address, reg_psc, prescaler - 1)?;
            self.bus.write_word_be(self.address, reg_arr, period)?;
        }
        Ok(())
    }

    fn write_channel(&self, channel: u8, value: u16) -> HalResult<()> {
        debug!(
            channel,
            timer = timer_for_channel(channel),
            value,
            period = self.settings.period,
            "Sunfounder channel set"
        );
        self.bus.write_word_be(self.address, REG_CHN + channel, value)
    }
}

impl PwmDriver for SunfounderPwm {
    fn driver_type(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn set_pwm_freq(&mut self, freq_hz: u32) -> HalResult<()> {
        let settings = TimerSettings::for_frequency(freq_hz)?;
        debug!(
            freq_hz,
            prescaler = settings.prescaler,
            period = settings.period,
            "Setting Sunfounder frequency"
        );
        self.settings = settings;
        self.program_timers()
    }

    fn set_servo_pulse(&mut self, channel: u8, pulse_us: u32) -> HalResult<()> {
        validate_channel(Self::TYPE_NAME, channel, Self::CHANNELS)?;
        if pulse_us > self.frame_width {
            return Err(HalError::InvalidArgument(format!(
                "pulse {pulse_us} us exceeds frame width {} us",
                self.frame_width
            )));
        }
        let counts =
            u64::from(pulse_us) * u64::from(self.settings.period) / u64::from(self.frame_width);
        self.write_channel(channel, counts as u16)
    }

    fn set_pwm_duty_cycle(&mut self, channel: u8, duty_percent: f64) -> HalResult<()> {
        validate_duty_cycle(duty_percent)?;
        validate_channel(Self::TYPE_NAME, channel, Self::CHANNELS)?;
        let value = (duty_percent / 100.0 * f64::from(self.settings.period)) as u16;
        self.write_channel(channel, value)
    }

    fn close(&mut self) -> HalResult<()> {
        self.bus.release()
    }
}
