//! HAL configuration types.
//!
//! This module contains the typed configuration boundary of the HAL:
//! - `PwmDriverConfig` - Which driver family, on which bus and address
//! - `MotorConfig` - GPIO-direct or I2C-driven DC motor
//! - `ServoConfig` - Channel, angle bounds and pulse mapping of one servo
//! - `RobotConfig` - A whole robot (motor pair + named servos) loaded from TOML

use crate::config::{ConfigError, SharedConfig, Validate};
use crate::consts::{
    DEFAULT_FRAME_WIDTH_US, DEFAULT_I2C_BUS, DEFAULT_MAX_ANGLE, DEFAULT_MAX_PULSE_US,
    DEFAULT_MAX_SPEED, DEFAULT_MIN_ANGLE, DEFAULT_MIN_PULSE_US, DEFAULT_PWM_ADDRESS,
    DEFAULT_PWM_FREQ_HZ, MAX_I2C_ADDRESS,
};
use crate::hal::bus::BusIndex;
use crate::hal::error::{HalError, HalResult};
use crate::hal::gpio::PinId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

fn default_bus() -> BusIndex {
    DEFAULT_I2C_BUS
}

fn default_address() -> u8 {
    DEFAULT_PWM_ADDRESS
}

fn default_frame_width() -> u32 {
    DEFAULT_FRAME_WIDTH_US
}

fn default_freq() -> u32 {
    DEFAULT_PWM_FREQ_HZ
}

fn default_max_speed() -> u32 {
    DEFAULT_MAX_SPEED
}

fn default_min_angle() -> f64 {
    DEFAULT_MIN_ANGLE
}

fn default_max_angle() -> f64 {
    DEFAULT_MAX_ANGLE
}

fn default_min_pulse() -> u32 {
    DEFAULT_MIN_PULSE_US
}

fn default_max_pulse() -> u32 {
    DEFAULT_MAX_PULSE_US
}

fn default_true() -> bool {
    true
}

// ─── PWM driver ─────────────────────────────────────────────────────

/// Selects and parameterizes one PWM controller chip.
///
/// `name` is case-sensitive and must match a registered driver type at
/// construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PwmDriverConfig {
    /// Driver type name (e.g. "PCA9685", "Sunfounder").
    pub name: String,

    /// I2C bus index.
    #[serde(default = "default_bus")]
    pub bus: BusIndex,

    /// 7-bit I2C address.
    #[serde(default = "default_address")]
    pub address: u8,

    /// Servo frame width in microseconds.
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,

    /// PWM frequency in Hz.
    #[serde(default = "default_freq")]
    pub freq: u32,
}

impl PwmDriverConfig {
    /// Config with default frame width and frequency.
    pub fn new(name: impl Into<String>, bus: BusIndex, address: u8) -> Self {
        Self {
            name: name.into(),
            bus,
            address,
            frame_width: DEFAULT_FRAME_WIDTH_US,
            freq: DEFAULT_PWM_FREQ_HZ,
        }
    }

    /// Address formatted as `0xNN`.
    pub fn addr_str(&self) -> String {
        format!("0x{:02X}", self.address)
    }

    /// Validate field ranges. Registry resolution is checked by the factory.
    pub fn validate(&self) -> HalResult<()> {
        if self.name.is_empty() {
            return Err(HalError::Config("driver name cannot be empty".to_string()));
        }
        if self.address > MAX_I2C_ADDRESS {
            return Err(HalError::Config(format!(
                "driver '{}': address {} is not a 7-bit I2C address",
                self.name,
                self.addr_str()
            )));
        }
        if self.frame_width == 0 {
            return Err(HalError::Config(format!(
                "driver '{}': frame_width must be greater than 0",
                self.name
            )));
        }
        if self.freq == 0 {
            return Err(HalError::Config(format!(
                "driver '{}': freq must be greater than 0",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for PwmDriverConfig {
    fn default() -> Self {
        Self::new("PCA9685", DEFAULT_I2C_BUS, DEFAULT_PWM_ADDRESS)
    }
}

// ─── Channels ───────────────────────────────────────────────────────

/// PWM channel: a number or a `"P<n>"` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelId {
    /// Channel number
    Index(u8),
    /// Channel name, `P` followed by digits
    Name(String),
}

impl ChannelId {
    /// Resolve to a channel number.
    ///
    /// # Errors
    /// `InvalidArgument` if a name is not `P` followed by one or more digits.
    pub fn resolve(&self) -> HalResult<u8> {
        match self {
            ChannelId::Index(n) => Ok(*n),
            ChannelId::Name(name) => name
                .strip_prefix('P')
                .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|digits| digits.parse::<u8>().ok())
                .ok_or_else(|| {
                    HalError::InvalidArgument(format!(
                        "Invalid PWM channel name '{name}': must be 'P' followed by one or more digits"
                    ))
                }),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Index(n) => write!(f, "P{n}"),
            ChannelId::Name(name) => f.write_str(name),
        }
    }
}

impl From<u8> for ChannelId {
    fn from(n: u8) -> Self {
        ChannelId::Index(n)
    }
}

impl From<&str> for ChannelId {
    fn from(name: &str) -> Self {
        ChannelId::Name(name.to_string())
    }
}

// ─── Motors ─────────────────────────────────────────────────────────

/// Wiring polarity correction, `+1` or `-1` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum MotorDirection {
    /// Positive speed drives the motor forward as wired.
    #[default]
    Forward,
    /// Wiring is inverted; positive speed must be negated.
    Reverse,
}

impl MotorDirection {
    /// `1.0` or `-1.0`.
    pub fn sign(self) -> f64 {
        match self {
            MotorDirection::Forward => 1.0,
            MotorDirection::Reverse => -1.0,
        }
    }
}

impl TryFrom<i8> for MotorDirection {
    type Error = HalError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MotorDirection::Forward),
            -1 => Ok(MotorDirection::Reverse),
            other => Err(HalError::InvalidArgument(format!(
                "calibration_direction must be 1 or -1, got {other}"
            ))),
        }
    }
}

impl From<MotorDirection> for i8 {
    fn from(direction: MotorDirection) -> Self {
        match direction {
            MotorDirection::Forward => 1,
            MotorDirection::Reverse => -1,
        }
    }
}

/// DC motor driven entirely through GPIO (e.g. an MC33886 board).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpioDcMotorConfig {
    /// Human-readable motor name ("left", "right").
    pub name: String,

    /// Speed ceiling in percent.
    #[serde(default = "default_max_speed")]
    pub max_speed: u32,

    /// Wiring polarity correction.
    #[serde(default)]
    pub calibration_direction: MotorDirection,

    /// Pin wired to the driver chip's forward input.
    pub forward_pin: PinId,

    /// Pin wired to the driver chip's backward input.
    pub backward_pin: PinId,

    /// Drive forward/backward pins with PWM (speed control) instead of on/off.
    #[serde(default = "default_true")]
    pub pwm: bool,

    /// Enable pin, required by some boards.
    #[serde(default)]
    pub enable_pin: Option<PinId>,
}

/// DC motor whose speed comes from a PWM driver channel over I2C.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct I2cDcMotorConfig {
    /// Human-readable motor name ("left", "right").
    pub name: String,

    /// Speed ceiling in percent.
    #[serde(default = "default_max_speed")]
    pub max_speed: u32,

    /// Wiring polarity correction.
    #[serde(default)]
    pub calibration_direction: MotorDirection,

    /// PWM chip providing the speed signal.
    pub driver: PwmDriverConfig,

    /// Channel on the PWM chip.
    pub channel: ChannelId,

    /// Digital output selecting rotation sense.
    pub dir_pin: PinId,
}

/// Motor configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotorConfig {
    /// Direct GPIO motor
    GpioDc(GpioDcMotorConfig),
    /// I2C PWM driven motor
    I2cDc(I2cDcMotorConfig),
}

impl MotorConfig {
    /// Motor name.
    pub fn name(&self) -> &str {
        match self {
            MotorConfig::GpioDc(c) => &c.name,
            MotorConfig::I2cDc(c) => &c.name,
        }
    }

    /// Speed ceiling in percent.
    pub fn max_speed(&self) -> u32 {
        match self {
            MotorConfig::GpioDc(c) => c.max_speed,
            MotorConfig::I2cDc(c) => c.max_speed,
        }
    }

    /// Wiring polarity correction.
    pub fn calibration_direction(&self) -> MotorDirection {
        match self {
            MotorConfig::GpioDc(c) => c.calibration_direction,
            MotorConfig::I2cDc(c) => c.calibration_direction,
        }
    }

    /// Validate the motor configuration.
    ///
    /// # Validation Rules
    /// 1. `name` not empty
    /// 2. `max_speed` > 0
    /// 3. Pins non-empty; I2C channel resolvable; driver config valid
    pub fn validate(&self) -> HalResult<()> {
        if self.name().is_empty() {
            return Err(HalError::Config("motor name cannot be empty".to_string()));
        }
        if self.max_speed() == 0 {
            return Err(HalError::Config(format!(
                "motor '{}': max_speed must be greater than 0",
                self.name()
            )));
        }
        match self {
            MotorConfig::GpioDc(c) => {
                c.forward_pin.validate()?;
                c.backward_pin.validate()?;
                if let Some(pin) = &c.enable_pin {
                    pin.validate()?;
                }
            }
            MotorConfig::I2cDc(c) => {
                c.driver.validate()?;
                c.channel.resolve()?;
                c.dir_pin.validate()?;
            }
        }
        Ok(())
    }
}

/// Left and right drive motors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorPairConfig {
    /// Left motor
    pub left: MotorConfig,
    /// Right motor
    pub right: MotorConfig,
}

// ─── Servos ─────────────────────────────────────────────────────────

/// Where a servo's pulse comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServoOutput {
    /// A channel on a shared PWM driver
    #[default]
    Driver,
    /// A PWM-capable GPIO pin; `channel` names the pin
    Gpio,
}

/// One servo: channel, logical bounds and angle→pulse mapping.
///
/// The pulse is interpolated linearly over `[real_min_angle, real_max_angle]`
/// into `[min_pulse, max_pulse]`; requests are accepted only inside
/// `[min_angle, max_angle]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoConfig {
    /// Driver channel (`3` / `"P3"`) or, for GPIO output, the pin.
    pub channel: ChannelId,

    /// Pulse source.
    #[serde(default)]
    pub output: ServoOutput,

    /// Lowest accepted angle in degrees.
    #[serde(default = "default_min_angle")]
    pub min_angle: f64,

    /// Highest accepted angle in degrees.
    #[serde(default = "default_max_angle")]
    pub max_angle: f64,

    /// Pulse width at `real_min_angle`, microseconds.
    #[serde(default = "default_min_pulse")]
    pub min_pulse: u32,

    /// Pulse width at `real_max_angle`, microseconds.
    #[serde(default = "default_max_pulse")]
    pub max_pulse: u32,

    /// Physical angle reached at `min_pulse`.
    #[serde(default = "default_min_angle")]
    pub real_min_angle: f64,

    /// Physical angle reached at `max_pulse`.
    #[serde(default = "default_max_angle")]
    pub real_max_angle: f64,

    /// Driver to create when none is shared in (driver output only).
    #[serde(default)]
    pub driver: Option<PwmDriverConfig>,
}

impl ServoConfig {
    /// Config with default bounds and pulse range.
    pub fn new(channel: impl Into<ChannelId>) -> Self {
        Self {
            channel: channel.into(),
            output: ServoOutput::Driver,
            min_angle: DEFAULT_MIN_ANGLE,
            max_angle: DEFAULT_MAX_ANGLE,
            min_pulse: DEFAULT_MIN_PULSE_US,
            max_pulse: DEFAULT_MAX_PULSE_US,
            real_min_angle: DEFAULT_MIN_ANGLE,
            real_max_angle: DEFAULT_MAX_ANGLE,
            driver: None,
        }
    }

    /// Pin for GPIO output servos.
    pub fn gpio_pin(&self) -> PinId {
        match &self.channel {
            ChannelId::Index(n) => PinId::Number(*n),
            ChannelId::Name(name) => PinId::Name(name.clone()),
        }
    }

    /// Validate the servo configuration.
    ///
    /// # Validation Rules
    /// 1. `min_angle` <= `max_angle`
    /// 2. `min_pulse` < `max_pulse`
    /// 3. `real_min_angle` < `real_max_angle`
    /// 4. Driver output: channel resolvable, driver config (if any) valid
    pub fn validate(&self) -> HalResult<()> {
        if !(self.min_angle <= self.max_angle) {
            return Err(HalError::Config(format!(
                "servo {}: min_angle ({}) must be <= max_angle ({})",
                self.channel, self.min_angle, self.max_angle
            )));
        }
        if self.min_pulse >= self.max_pulse {
            return Err(HalError::Config(format!(
                "servo {}: min_pulse ({}) must be < max_pulse ({})",
                self.channel, self.min_pulse, self.max_pulse
            )));
        }
        if !(self.real_min_angle < self.real_max_angle) {
            return Err(HalError::Config(format!(
                "servo {}: real_min_angle ({}) must be < real_max_angle ({})",
                self.channel, self.real_min_angle, self.real_max_angle
            )));
        }
        match self.output {
            ServoOutput::Driver => {
                self.channel.resolve()?;
                if let Some(driver) = &self.driver {
                    driver.validate()?;
                }
            }
            ServoOutput::Gpio => self.gpio_pin().validate()?,
        }
        Ok(())
    }
}

/// Named calibration transforms available from configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationKind {
    /// `angle + offset`
    #[default]
    Sum,
    /// `-(angle - offset)`
    Negative,
}

/// A servo service: the servo plus user-facing bounds and calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoServiceConfig {
    /// Service name ("steering", "cam_pan").
    pub name: String,

    /// Underlying servo.
    pub servo: ServoConfig,

    /// User-facing lower bound, checked before calibration.
    #[serde(default = "default_min_angle")]
    pub min_angle: f64,

    /// User-facing upper bound, checked before calibration.
    #[serde(default = "default_max_angle")]
    pub max_angle: f64,

    /// Calibration transform.
    #[serde(default)]
    pub calibration_mode: CalibrationKind,

    /// Persisted calibration offset in degrees.
    #[serde(default)]
    pub calibration_offset: f64,
}

impl ServoServiceConfig {
    /// Validate the service and its servo.
    pub fn validate(&self) -> HalResult<()> {
        if self.name.is_empty() {
            return Err(HalError::Config("servo name cannot be empty".to_string()));
        }
        if !(self.min_angle <= self.max_angle) {
            return Err(HalError::Config(format!(
                "servo '{}': min_angle ({}) must be <= max_angle ({})",
                self.name, self.min_angle, self.max_angle
            )));
        }
        if !self.calibration_offset.is_finite() {
            return Err(HalError::Config(format!(
                "servo '{}': calibration_offset must be finite",
                self.name
            )));
        }
        self.servo.validate()
    }
}

// ─── Robot ──────────────────────────────────────────────────────────

/// Whole-robot configuration loaded from `robot.toml`.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "picar"
///
/// [[pwm_drivers]]
/// name = "Sunfounder"
/// address = 0x14
///
/// [motors.left]
/// type = "i2c_dc"
/// name = "left"
/// channel = "P12"
/// dir_pin = "D4"
/// driver = { name = "Sunfounder", address = 0x14 }
///
/// [motors.right]
/// type = "i2c_dc"
/// name = "right"
/// calibration_direction = -1
/// channel = "P13"
/// dir_pin = "D5"
/// driver = { name = "Sunfounder", address = 0x14 }
///
/// [[servos]]
/// name = "steering"
/// min_angle = -30.0
/// max_angle = 30.0
/// calibration_offset = -14.4
/// servo = { channel = "P2", driver = { name = "Sunfounder", address = 0x14 } }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Logging and naming.
    #[serde(default)]
    pub shared: SharedConfig,

    /// PWM chips created up front and shared by every motor/servo whose
    /// driver config matches.
    #[serde(default)]
    pub pwm_drivers: Vec<PwmDriverConfig>,

    /// Drive motors, if the robot has any.
    #[serde(default)]
    pub motors: Option<MotorPairConfig>,

    /// Named servos.
    #[serde(default)]
    pub servos: Vec<ServoServiceConfig>,
}

impl Validate for RobotConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let to_config_err = |e: HalError| ConfigError::ValidationError(e.to_string());

        for driver in &self.pwm_drivers {
            driver.validate().map_err(to_config_err)?;
        }

        if let Some(motors) = &self.motors {
            motors.left.validate().map_err(to_config_err)?;
            motors.right.validate().map_err(to_config_err)?;
            if motors.left.name() == motors.right.name() {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate motor name: {}",
                    motors.left.name()
                )));
            }
        }

        let mut names = HashSet::new();
        for servo in &self.servos {
            servo.validate().map_err(to_config_err)?;
            if !names.insert(&servo.name) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate servo name: {}",
                    servo.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i2c_motor(name: &str) -> MotorConfig {
        MotorConfig::I2cDc(I2cDcMotorConfig {
            name: name.to_string(),
            max_speed: 100,
            calibration_direction: MotorDirection::Forward,
            driver: PwmDriverConfig::new("Sunfounder", 1, 0x14),
            channel: ChannelId::from("P12"),
            dir_pin: PinId::from("D4"),
        })
    }

    #[test]
    fn test_pwm_driver_config_default() {
        let config = PwmDriverConfig::default();
        assert_eq!(config.bus, DEFAULT_I2C_BUS);
        assert_eq!(config.address, 0x40);
        assert_eq!(config.frame_width, 20_000);
        assert_eq!(config.freq, 50);
        assert_eq!(config.addr_str(), "0x40");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pwm_driver_config_rejects_wide_address() {
        let config = PwmDriverConfig::new("PCA9685", 1, 0x80);
        assert!(matches!(config.validate(), Err(HalError::Config(_))));
    }

    #[test]
    fn test_pwm_driver_config_toml_defaults() {
        let config: PwmDriverConfig = toml::from_str("name = \"Mock\"\naddress = 0x41").unwrap();
        assert_eq!(config.name, "Mock");
        assert_eq!(config.address, 0x41);
        assert_eq!(config.bus, 1);
        assert_eq!(config.freq, 50);
    }

    #[test]
    fn test_channel_resolve() {
        assert_eq!(ChannelId::from(3u8).resolve().unwrap(), 3);
        assert_eq!(ChannelId::from("P0").resolve().unwrap(), 0);
        assert_eq!(ChannelId::from("P19").resolve().unwrap(), 19);
        for bad in ["P", "0", "p1", "P1a", "P-1", "D4", "P999"] {
            assert!(
                matches!(ChannelId::from(bad).resolve(), Err(HalError::InvalidArgument(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_motor_direction_serde() {
        #[derive(Debug, Deserialize, Serialize)]
        struct Wrapper {
            dir: MotorDirection,
        }
        let w: Wrapper = toml::from_str("dir = -1").unwrap();
        assert_eq!(w.dir, MotorDirection::Reverse);
        assert!(toml::from_str::<Wrapper>("dir = 0").is_err());
        assert!(toml::to_string(&w).unwrap().contains("-1"));
    }

    #[test]
    fn test_motor_config_tagged() {
        let config: MotorConfig = toml::from_str(
            r#"
type = "gpio_dc"
name = "left"
forward_pin = 6
backward_pin = 13
enable_pin = 12
"#,
        )
        .unwrap();
        let MotorConfig::GpioDc(gpio) = &config else {
            panic!("expected gpio motor");
        };
        assert!(gpio.pwm);
        assert_eq!(gpio.enable_pin, Some(PinId::Number(12)));
        assert_eq!(config.max_speed(), 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_motor_config_validate_max_speed() {
        let mut config = i2c_motor("left");
        if let MotorConfig::I2cDc(c) = &mut config {
            c.max_speed = 0;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_motor_config_validate_bad_channel() {
        let mut config = i2c_motor("left");
        if let MotorConfig::I2cDc(c) = &mut config {
            c.channel = ChannelId::from("X1");
        }
        assert!(matches!(config.validate(), Err(HalError::InvalidArgument(_))));
    }

    #[test]
    fn test_servo_config_validate() {
        assert!(ServoConfig::new(0u8).validate().is_ok());

        let mut config = ServoConfig::new("P1");
        config.min_pulse = 2500;
        config.max_pulse = 500;
        assert!(config.validate().is_err());

        let mut config = ServoConfig::new("P1");
        config.min_angle = 10.0;
        config.max_angle = -10.0;
        assert!(config.validate().is_err());

        let mut config = ServoConfig::new("P1");
        config.real_max_angle = config.real_min_angle;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_servo_config_gpio_pin() {
        let mut config = ServoConfig::new(18u8);
        config.output = ServoOutput::Gpio;
        assert_eq!(config.gpio_pin(), PinId::Number(18));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_robot_config_duplicate_servo_names() {
        let servo = ServoServiceConfig {
            name: "pan".to_string(),
            servo: ServoConfig::new("P0"),
            min_angle: -90.0,
            max_angle: 90.0,
            calibration_mode: CalibrationKind::Sum,
            calibration_offset: 0.0,
        };
        let config = RobotConfig {
            servos: vec![servo.clone(), servo],
            ..RobotConfig::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
        assert!(result.unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn test_robot_config_duplicate_motor_names() {
        let config = RobotConfig {
            motors: Some(MotorPairConfig {
                left: i2c_motor("drive"),
                right: i2c_motor("drive"),
            }),
            ..RobotConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
