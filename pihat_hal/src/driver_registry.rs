//! Driver registry for PWM drivers.
//!
//! Provides a `DriverRegistry` struct mapping a driver type name to a
//! constructor. Factories take the registry by reference (constructor
//! injection); a process-wide default instance backs the free functions at
//! the bottom of this module.

use crate::bus::{BusHandle, BusManager};
use parking_lot::{Mutex, RwLock};
use pihat_common::hal::config::PwmDriverConfig;
use pihat_common::hal::driver::PwmDriver;
use pihat_common::hal::error::{HalError, HalResult};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// Everything a driver constructor receives.
pub struct DriverArgs {
    /// 7-bit device address.
    pub address: u8,
    /// Servo frame width in microseconds.
    pub frame_width: u32,
    /// Configured PWM frequency in Hz.
    pub freq: u32,
    /// The driver's own reference to the shared bus.
    pub bus: BusHandle,
}

/// Constructor stored in the registry.
pub type DriverFactory =
    Arc<dyn Fn(DriverArgs) -> HalResult<Box<dyn PwmDriver>> + Send + Sync>;

/// A driver shared by several motors or servos.
pub type SharedDriver = Arc<Mutex<Box<dyn PwmDriver>>>;

/// Wrap a driver for sharing.
pub fn share_driver(driver: Box<dyn PwmDriver>) -> SharedDriver {
    Arc::new(Mutex::new(driver))
}

/// Drop one reference to a shared driver, closing it if it was the last.
pub fn close_shared_driver(driver: SharedDriver) -> HalResult<()> {
    match Arc::try_unwrap(driver) {
        Ok(driver) => driver.into_inner().close(),
        Err(_) => Ok(()),
    }
}

/// What `register` does when the name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Fail with `DriverAlreadyRegistered`.
    #[default]
    Reject,
    /// Replace the existing constructor and log a warning.
    Overwrite,
}

/// Registry of available PWM drivers.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
    policy: DuplicatePolicy,
}

impl DriverRegistry {
    /// Create an empty registry that rejects duplicates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with the given duplicate policy.
    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            factories: HashMap::new(),
            policy,
        }
    }

    /// Create a registry holding the built-in drivers.
    ///
    /// Infallible: the registry starts empty and the built-in names are
    /// distinct, so no duplicate check is needed.
    pub fn with_builtin_drivers() -> Self {
        let factories: HashMap<_, _> = crate::drivers::builtin_drivers()
            .into_iter()
            .map(|(name, factory)| (name.to_string(), factory))
            .collect();
        debug!(count = factories.len(), "Registered built-in drivers");
        Self {
            factories,
            policy: DuplicatePolicy::default(),
        }
    }

    /// Duplicate policy in effect.
    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Register a driver constructor under `name`.
    ///
    /// # Errors
    /// `DriverAlreadyRegistered` if `name` is taken and the policy is
    /// [`DuplicatePolicy::Reject`].
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> HalResult<()>
    where
        F: Fn(DriverArgs) -> HalResult<Box<dyn PwmDriver>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            match self.policy {
                DuplicatePolicy::Reject => return Err(HalError::DriverAlreadyRegistered(name)),
                DuplicatePolicy::Overwrite => {
                    warn!(driver = %name, "Overwriting registered driver");
                }
            }
        }
        debug!(driver = %name, "Registered driver");
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Get a driver factory by name.
    pub fn get_factory(&self, name: &str) -> Option<DriverFactory> {
        self.factories.get(name).cloned()
    }

    /// Whether `name` is registered (case-sensitive).
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// All registered driver names, sorted.
    pub fn list_drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct the driver `config.name` on an already acquired bus handle.
    ///
    /// The handle moves into the driver; on failure it is dropped, which
    /// releases the reference.
    ///
    /// # Errors
    /// `UnknownDriverType` if `config.name` is not registered; otherwise
    /// whatever validation or the constructor reports.
    pub fn create(&self, config: &PwmDriverConfig, bus: BusHandle) -> HalResult<Box<dyn PwmDriver>> {
        let factory = self
            .get_factory(&config.name)
            .ok_or_else(|| HalError::UnknownDriverType(config.name.clone()))?;
        config.validate()?;

        let driver = factory(DriverArgs {
            address: config.address,
            frame_width: config.frame_width,
            freq: config.freq,
            bus,
        })?;
        info!(
            driver = %config.name,
            bus = config.bus,
            address = %config.addr_str(),
            "PWM driver created"
        );
        Ok(driver)
    }
}

/// Resolve `config` to a driver instance.
///
/// Looks the name up before touching any bus: an unknown name fails with
/// `UnknownDriverType` and opens nothing. When `bus` is given the driver gets
/// its own reference to that channel, otherwise bus `config.bus` is acquired
/// from `buses`.
pub fn create_pwm_driver(
    registry: &DriverRegistry,
    buses: &BusManager,
    config: &PwmDriverConfig,
    bus: Option<&BusHandle>,
) -> HalResult<Box<dyn PwmDriver>> {
    if !registry.contains(&config.name) {
        return Err(HalError::UnknownDriverType(config.name.clone()));
    }
    config.validate()?;

    let handle = match bus {
        Some(shared) => {
            if shared.index() != config.bus {
                warn!(
                    driver = %config.name,
                    configured = config.bus,
                    shared = shared.index(),
                    "Using shared bus handle instead of configured bus"
                );
            }
            shared.share()?
        }
        None => buses.get_bus(config.bus)?,
    };
    registry.create(config, handle)
}

// ─── Process-wide default registry ──────────────────────────────────
//
// Holds the built-in drivers from first use. Third-party crates add their
// chips with `register_driver()` before the first `create_driver()` that
// names them.

static GLOBAL_REGISTRY: LazyLock<RwLock<DriverRegistry>> =
    LazyLock::new(|| RwLock::new(DriverRegistry::with_builtin_drivers()));

/// Register a driver constructor in the process-wide registry.
pub fn register_driver<F>(name: impl Into<String>, factory: F) -> HalResult<()>
where
    F: Fn(DriverArgs) -> HalResult<Box<dyn PwmDriver>> + Send + Sync + 'static,
{
    GLOBAL_REGISTRY.write().register(name, factory)
}

/// Get a driver factory by name from the process-wide registry.
pub fn get_driver_factory(name: &str) -> Option<DriverFactory> {
    GLOBAL_REGISTRY.read().get_factory(name)
}

/// Driver names in the process-wide registry, sorted.
pub fn registered_drivers() -> Vec<String> {
    GLOBAL_REGISTRY.read().list_drivers()
}

/// Snapshot of the process-wide registry for injection into factories.
pub fn global_registry() -> DriverRegistry {
    GLOBAL_REGISTRY.read().clone()
}

/// Create a driver through the process-wide registry and bus manager.
pub fn create_driver(
    config: &PwmDriverConfig,
    bus: Option<&BusHandle>,
) -> HalResult<Box<dyn PwmDriver>> {
    let registry = global_registry();
    create_pwm_driver(&registry, &BusManager::global(), config, bus)
}
