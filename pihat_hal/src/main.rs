//! # PiHat CLI
//!
//! Operator tool for Robot HAT hardware: bus scans, servo checks, short
//! motor runs and servo zeroing.
//!
//! # Usage
//!
//! ```bash
//! # List responding I2C addresses on bus 1
//! pihat scan --bus 1
//!
//! # Put the servo on P2 of a PCA9685 at 0x40 to 15 degrees
//! pihat servo --channel P2 set 15
//!
//! # Sweep a servo on a Sunfounder HAT until Ctrl-C
//! pihat servo --driver Sunfounder --address 0x14 --channel P0 sweep
//!
//! # Drive forward at 40 % for two seconds using robot.toml
//! pihat --config robot.toml motors --speed 40 --direction 1 --duration-ms 2000
//!
//! # Recenter every servo, against the in-memory bus
//! pihat --config robot.toml --mock zero
//! ```

use clap::{Parser, Subcommand};
use pihat_common::config::LogLevel;
use pihat_common::consts::{DEFAULT_CONFIG_PATH, DEFAULT_I2C_BUS};
use pihat_common::hal::bus::BusIndex;
use pihat_common::hal::config::{ChannelId, PwmDriverConfig, RobotConfig, ServoConfig};
use pihat_hal::bus::BusManager;
use pihat_hal::bus::mock::MockBusFactory;
use pihat_hal::drivers::{MockDriver, MockDriverLog, Pca9685};
use pihat_hal::gpio::mock::MockPins;
use pihat_hal::servo::create_servo;
use pihat_hal::{DriverRegistry, HalContext, RobotHal};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Addresses the in-memory bus answers on (PCA9685, Sunfounder MCU).
const MOCK_DEVICES: [u8; 2] = [0x14, 0x40];

const POLL: Duration = Duration::from_millis(20);

/// PiHat - Robot HAT hardware tool
#[derive(Parser, Debug)]
#[command(name = "pihat")]
#[command(version)]
#[command(about = "Robot HAT hardware tool: I2C scan, servos, motors")]
#[command(long_about = None)]
struct Args {
    /// Robot configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use the in-memory bus, recording pins and drivers instead of hardware
    #[arg(short, long)]
    mock: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List addresses that acknowledge on a bus
    Scan {
        /// I2C bus index
        #[arg(short, long, default_value_t = DEFAULT_I2C_BUS)]
        bus: BusIndex,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drive a single servo
    Servo {
        /// PWM driver type
        #[arg(short, long, default_value = Pca9685::TYPE_NAME)]
        driver: String,

        /// Driver address (decimal or 0x-prefixed hex)
        #[arg(short, long, default_value = "0x40", value_parser = parse_address)]
        address: u8,

        /// I2C bus index
        #[arg(short, long, default_value_t = DEFAULT_I2C_BUS)]
        bus: BusIndex,

        /// Channel: number or "P<n>"
        #[arg(long, default_value = "P0")]
        channel: String,

        #[command(subcommand)]
        action: ServoAction,
    },

    /// Run the drive motors from the robot configuration
    Motors {
        /// Speed in percent
        #[arg(short, long, default_value_t = 30.0)]
        speed: f64,

        /// -1, 0 or 1
        #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
        direction: i8,

        /// How long to drive before stopping
        #[arg(long, default_value_t = 1000)]
        duration_ms: u64,
    },

    /// Move every configured servo to its calibrated neutral position
    Zero,

    /// List registered driver types
    Drivers {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the robot configuration and print it with defaults filled in
    Check {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ServoAction {
    /// Go to one angle
    Set {
        /// Angle in degrees
        #[arg(allow_negative_numbers = true)]
        angle: f64,
    },
    /// Sweep between the bounds until Ctrl-C
    Sweep {
        /// Degrees per step
        #[arg(long, default_value_t = 10.0)]
        step: f64,

        /// Pause between steps
        #[arg(long, default_value_t = 100)]
        delay_ms: u64,
    },
}

impl Command {
    fn needs_config(&self) -> bool {
        matches!(self, Command::Motors { .. } | Command::Zero | Command::Check { .. })
    }
}

fn main() {
    if let Err(e) = run() {
        error!("pihat failed: {}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Config is read before tracing so its log level can be the default.
    let config = if args.command.needs_config() {
        Some(RobotHal::load_config(&args.config))
    } else {
        None
    };
    let level = match &config {
        Some(Ok(config)) => config.shared.log_level,
        _ => LogLevel::default(),
    };
    setup_tracing(&args, level);
    let config = config.transpose()?;

    info!("pihat v{} starting...", env!("CARGO_PKG_VERSION"));

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    let ctx = build_context(args.mock)?;

    match args.command {
        Command::Scan { bus, json } => scan(&ctx, bus, json),
        Command::Servo {
            driver,
            address,
            bus,
            channel,
            action,
        } => {
            let mut servo_config = ServoConfig::new(channel_id(&channel));
            servo_config.driver = Some(PwmDriverConfig::new(driver, bus, address));
            servo(&ctx, &servo_config, action, &running)
        }
        Command::Motors {
            speed,
            direction,
            duration_ms,
        } => {
            let config = config.ok_or("configuration not loaded")?;
            motors(ctx, &config, speed, direction, duration_ms, &running)
        }
        Command::Zero => {
            let config = config.ok_or("configuration not loaded")?;
            let mut hal = RobotHal::from_config(ctx, &config)?;
            hal.zero_servos()?;
            hal.shutdown()?;
            info!("Servos zeroed");
            Ok(())
        }
        Command::Drivers { json } => {
            let names = ctx.registry.list_drivers();
            if json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                for name in names {
                    println!("{name}");
                }
            }
            Ok(())
        }
        Command::Check { json } => {
            let config = config.ok_or("configuration not loaded")?;
            check(&config, json)
        }
    }
}

fn build_context(mock: bool) -> Result<HalContext, Box<dyn std::error::Error>> {
    if !mock {
        return Ok(HalContext::system());
    }
    info!("Mock mode: in-memory I2C bus, recording pins");
    let mut registry = DriverRegistry::with_builtin_drivers();
    MockDriverLog::new().register(&mut registry, MockDriver::TYPE_NAME)?;
    Ok(HalContext::new(
        registry,
        BusManager::new(MockBusFactory::with_devices(&MOCK_DEVICES)),
        MockPins::new(),
    ))
}

fn channel_id(raw: &str) -> ChannelId {
    match raw.parse::<u8>() {
        Ok(n) => n.into(),
        Err(_) => raw.into(),
    }
}

fn parse_address(raw: &str) -> Result<u8, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => raw.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid address '{raw}': {e}"))
}

fn scan(ctx: &HalContext, bus: BusIndex, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let handle = ctx.buses.get_bus(bus)?;
    let found = handle.scan()?;
    handle.release()?;
    info!(bus, devices = found.len(), "Scan complete");

    if json {
        let addrs: Vec<String> = found.iter().map(|a| format!("0x{a:02X}")).collect();
        println!("{}", serde_json::to_string_pretty(&addrs)?);
    } else if found.is_empty() {
        println!("No devices found on bus {bus}");
    } else {
        for addr in found {
            println!("0x{addr:02X}");
        }
    }
    Ok(())
}

fn servo(
    ctx: &HalContext,
    config: &ServoConfig,
    action: ServoAction,
    running: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut servo = create_servo(ctx, config, None)?;
    let result = match action {
        ServoAction::Set { angle } => servo.set_angle(angle),
        ServoAction::Sweep { step, delay_ms } => {
            if !(step > 0.0) {
                servo.close()?;
                return Err("step must be > 0".into());
            }
            let (min, max) = servo.bounds();
            let delay = Duration::from_millis(delay_ms);
            let mut angle = min;
            let mut rising = true;
            let mut outcome = Ok(());
            while running.load(Ordering::SeqCst) {
                if let Err(e) = servo.set_angle(angle) {
                    outcome = Err(e);
                    break;
                }
                debug!(angle, "Sweep step");
                let next = if rising { angle + step } else { angle - step };
                if next >= max {
                    angle = max;
                    rising = false;
                } else if next <= min {
                    angle = min;
                    rising = true;
                } else {
                    angle = next;
                }
                thread::sleep(delay);
            }
            outcome.and_then(|()| servo.set_angle((min + max) / 2.0))
        }
    };
    let closed = servo.close();
    result?;
    closed?;
    Ok(())
}

fn motors(
    ctx: HalContext,
    config: &RobotConfig,
    speed: f64,
    direction: i8,
    duration_ms: u64,
    running: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut hal = RobotHal::from_config(ctx, config)?;
    let motors = hal.motors()?;
    motors.drive(speed, direction)?;
    info!(
        speed = motors.speed(),
        direction = motors.direction(),
        duration_ms,
        "Driving"
    );

    let deadline = Instant::now() + Duration::from_millis(duration_ms);
    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(POLL);
    }
    if !running.load(Ordering::SeqCst) {
        warn!("Interrupted, stopping motors");
    }

    hal.motors()?.stop_all()?;
    hal.shutdown()?;
    Ok(())
}

fn check(config: &RobotConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
