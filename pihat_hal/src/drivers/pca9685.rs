//! PCA9685 16-channel, 12-bit PWM controller.
//!
//! Register map (all single-byte writes, auto-increment off):
//!
//! | Register       | Address          |
//! |----------------|------------------|
//! | MODE1          | 0x00             |
//! | LEDn_ON_L..H   | 0x06 + 4n, +1    |
//! | LEDn_OFF_L..H  | 0x08 + 4n, +1    |
//! | PRESCALE       | 0xFE             |

use crate::bus::BusHandle;
use crate::driver_registry::DriverArgs;
use bitflags::bitflags;
use pihat_common::hal::driver::{PwmDriver, validate_channel, validate_duty_cycle};
use pihat_common::hal::error::{HalError, HalResult};
use std::thread;
use std::time::Duration;
use tracing::debug;

const REG_MODE1: u8 = 0x00;
const REG_LED0_ON_L: u8 = 0x06;
const REG_PRESCALE: u8 = 0xFE;

/// Internal oscillator frequency.
const OSC_HZ: f64 = 25_000_000.0;
/// Counts per PWM period.
const RESOLUTION: u32 = 4096;
/// Bit 4 of LEDn_ON_H / LEDn_OFF_H: output fully on / fully off.
const FULL: u16 = 0x1000;
const PRESCALE_MIN: f64 = 3.0;
const PRESCALE_MAX: f64 = 255.0;
/// Oscillator settle time after leaving sleep.
const WAKE_DELAY: Duration = Duration::from_millis(5);

bitflags! {
    /// MODE1 register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode1: u8 {
        /// Respond to the LED All Call address.
        const ALLCALL = 0x01;
        /// Respond to subaddress 3.
        const SUB3 = 0x02;
        /// Respond to subaddress 2.
        const SUB2 = 0x04;
        /// Respond to subaddress 1.
        const SUB1 = 0x08;
        /// Low power mode, oscillator off.
        const SLEEP = 0x10;
        /// Register auto-increment.
        const AI = 0x20;
        /// Use the EXTCLK pin.
        const EXTCLK = 0x40;
        /// Restart PWM channels after sleep.
        const RESTART = 0x80;
    }
}

/// PCA9685 driver.
pub struct Pca9685 {
    bus: BusHandle,
    address: u8,
    frame_width: u32,
}

impl Pca9685 {
    /// Registry name.
    pub const TYPE_NAME: &'static str = "PCA9685";
    /// Output channels.
    pub const CHANNELS: u8 = 16;

    /// Take ownership of the bus reference and reset MODE1.
    pub fn new(args: DriverArgs) -> HalResult<Self> {
        let driver = Self {
            bus: args.bus,
            address: args.address,
            frame_width: args.frame_width,
        };
        debug!(address = args.address, "Initializing PCA9685");
        driver.write(REG_MODE1, Mode1::empty().bits())?;
        Ok(driver)
    }

    /// Prescale value for `freq_hz`: `round(25 MHz / 4096 / freq - 1)`.
    ///
    /// # Errors
    /// `InvalidArgument` if the result falls outside the chip's 3..=255 range.
    pub fn prescale_for(freq_hz: u32) -> HalResult<u8> {
        if freq_hz == 0 {
            return Err(HalError::InvalidArgument(
                "PWM frequency must be greater than 0".to_string(),
            ));
        }
        let prescale = (OSC_HZ / f64::from(RESOLUTION) / f64::from(freq_hz) - 1.0).round();
        if !(PRESCALE_MIN..=PRESCALE_MAX).contains(&prescale) {
            return Err(HalError::InvalidArgument(format!(
                "PCA9685 cannot generate {freq_hz} Hz (prescale {prescale})"
            )));
        }
        Ok(prescale as u8)
    }

    /// Program raw on/off counts for `channel`.
    pub fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> HalResult<()> {
        validate_channel(Self::TYPE_NAME, channel, Self::CHANNELS)?;
        let base = REG_LED0_ON_L + 4 * channel;
        let [on_h, on_l] = on.to_be_bytes();
        let [off_h, off_l] = off.to_be_bytes();
        self.write(base, on_l)?;
        self.write(base + 1, on_h)?;
        self.write(base + 2, off_l)?;
        self.write(base + 3, off_h)?;
        debug!(channel, on, off, "PCA9685 channel set");
        Ok(())
    }

    fn write(&self, reg: u8, value: u8) -> HalResult<()> {
        self.bus.write_byte_data(self.address, reg, value)
    }
}

impl PwmDriver for Pca9685 {
    fn driver_type(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn set_pwm_freq(&mut self, freq_hz: u32) -> HalResult<()> {
        let prescale = Self::prescale_for(freq_hz)?;
        debug!(freq_hz, prescale, "Setting PCA9685 frequency");

        let old = Mode1::from_bits_retain(self.bus.read_byte_data(self.address, REG_MODE1)?);
        let sleeping = (old - Mode1::RESTART) | Mode1::SLEEP;
        self.write(REG_MODE1, sleeping.bits())?;
        self.write(REG_PRESCALE, prescale)?;
        self.write(REG_MODE1, old.bits())?;
        thread::sleep(WAKE_DELAY);
        self.write(REG_MODE1, (old | Mode1::RESTART).bits())
    }

    fn set_servo_pulse(&mut self, channel: u8, pulse_us: u32) -> HalResult<()> {
        validate_channel(Self::TYPE_NAME, channel, Self::CHANNELS)?;
        if pulse_us > self.frame_width {
            return Err(HalError::InvalidArgument(format!(
                "pulse {pulse_us} us exceeds frame width {} us",
                self.frame_width
            )));
        }
        let counts = u64::from(pulse_us) * u64::from(RESOLUTION) / u64::from(self.frame_width);
        let off = counts.min(u64::from(RESOLUTION - 1)) as u16;
        self.set_pwm(channel, 0, off)
    }

    fn set_pwm_duty_cycle(&mut self, channel: u8, duty_percent: f64) -> HalResult<()> {
        validate_duty_cycle(duty_percent)?;
        validate_channel(Self::TYPE_NAME, channel, Self::CHANNELS)?;
        if duty_percent <= 0.0 {
            self.set_pwm(channel, 0, FULL)
        } else if duty_percent >= 100.0 {
            self.set_pwm(channel, FULL, 0)
        } else {
            let off = (duty_percent / 100.0 * f64::from(RESOLUTION)).round();
            let off = off.min(f64::from(RESOLUTION - 1)) as u16;
            self.set_pwm(channel, 0, off)
        }
    }

    fn close(&mut self) -> HalResult<()> {
        self.bus.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusManager;
    use crate::bus::mock::{MockBus, MockBusFactory};

    const ADDR: u8 = 0x40;

    fn driver() -> (Pca9685, MockBus, BusManager) {
        let factory = MockBusFactory::new();
        let manager = BusManager::new(factory.clone());
        let bus = manager.get_bus(1).unwrap();
        let driver = Pca9685::new(DriverArgs {
            address: ADDR,
            frame_width: 20_000,
            freq: 50,
            bus,
        })
        .unwrap();
        let mock = factory.bus(1);
        mock.clear_writes();
        (driver, mock, manager)
    }

    fn channel_regs(mock: &MockBus, channel: u8) -> (u16, u16) {
        let base = REG_LED0_ON_L + 4 * channel;
        let on = u16::from_le_bytes([mock.register(ADDR, base), mock.register(ADDR, base + 1)]);
        let off = u16::from_le_bytes([
            mock.register(ADDR, base + 2),
            mock.register(ADDR, base + 3),
        ]);
        (on, off)
    }

    #[test]
    fn prescale_50hz() {
        // 25e6 / 4096 / 50 - 1 = 121.07
        assert_eq!(Pca9685::prescale_for(50).unwrap(), 121);
        assert_eq!(Pca9685::prescale_for(1000).unwrap(), 5);
    }

    #[test]
    fn prescale_out_of_range() {
        assert!(Pca9685::prescale_for(0).is_err());
        assert!(Pca9685::prescale_for(10).is_err());
        assert!(Pca9685::prescale_for(5000).is_err());
    }

    #[test]
    fn set_pwm_freq_sequence() {
        let (mut driver, mock, _m) = driver();
        driver.set_pwm_freq(50).unwrap();

        let writes = mock.writes_to(ADDR);
        assert_eq!(
            writes,
            vec![
                vec![REG_MODE1],
                vec![REG_MODE1, Mode1::SLEEP.bits()],
                vec![REG_PRESCALE, 121],
                vec![REG_MODE1, 0x00],
                vec![REG_MODE1, Mode1::RESTART.bits()],
            ]
        );
        assert_eq!(mock.register(ADDR, REG_PRESCALE), 121);
    }

    #[test]
    fn servo_pulse_counts() {
        let (mut driver, mock, _m) = driver();
        driver.set_servo_pulse(0, 1500).unwrap();
        // 1500 * 4096 / 20000 = 307.2
        assert_eq!(channel_regs(&mock, 0), (0, 307));
    }

    #[test]
    fn duty_cycle_full_on_off() {
        let (mut driver, mock, _m) = driver();
        driver.set_pwm_duty_cycle(4, 0.0).unwrap();
        assert_eq!(channel_regs(&mock, 4), (0, FULL));
        driver.set_pwm_duty_cycle(4, 100.0).unwrap();
        assert_eq!(channel_regs(&mock, 4), (FULL, 0));
        driver.set_pwm_duty_cycle(4, 50.0).unwrap();
        assert_eq!(channel_regs(&mock, 4), (0, 2048));
    }

    #[test]
    fn invalid_arguments_touch_nothing() {
        let (mut driver, mock, _m) = driver();
        assert!(matches!(
            driver.set_pwm_duty_cycle(0, 101.0),
            Err(HalError::InvalidArgument(_))
        ));
        assert!(driver.set_servo_pulse(16, 1500).is_err());
        assert!(driver.set_servo_pulse(0, 30_000).is_err());
        assert!(driver.set_pwm_freq(1).is_err());
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn close_releases_bus() {
        let (mut driver, mock, manager) = driver();
        driver.close().unwrap();
        driver.close().unwrap();
        assert!(!manager.is_open(1));
        assert!(mock.is_closed());
        assert!(matches!(
            driver.set_servo_pulse(0, 1500),
            Err(HalError::BusClosed(1))
        ));
    }
}
