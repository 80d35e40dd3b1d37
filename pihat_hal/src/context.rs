//! Collaborators shared by every factory.

use crate::bus::mock::MockBusFactory;
use crate::bus::{BusHandle, BusManager};
use crate::driver_registry::{self, DriverRegistry, SharedDriver, share_driver};
use crate::gpio::UnavailablePins;
use crate::gpio::mock::MockPins;
use pihat_common::hal::config::PwmDriverConfig;
use pihat_common::hal::error::HalResult;
use pihat_common::hal::gpio::PinProvider;
use std::sync::Arc;

/// Registry, bus manager and pin provider passed to the motor, servo and
/// robot factories.
#[derive(Clone)]
pub struct HalContext {
    /// Driver constructors.
    pub registry: Arc<DriverRegistry>,
    /// I2C buses.
    pub buses: BusManager,
    /// GPIO pins.
    pub pins: Arc<dyn PinProvider>,
}

impl HalContext {
    /// Build a context from explicit collaborators.
    pub fn new(
        registry: DriverRegistry,
        buses: BusManager,
        pins: impl PinProvider + 'static,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            buses,
            pins: Arc::new(pins),
        }
    }

    /// Process-wide registry and `/dev/i2c-*` buses; GPIO is unavailable
    /// until a provider is supplied with [`HalContext::with_pins`].
    pub fn system() -> Self {
        Self::new(
            driver_registry::global_registry(),
            BusManager::global(),
            UnavailablePins,
        )
    }

    /// Built-in drivers over an in-memory bus and recording pins.
    pub fn mock() -> (Self, MockBusFactory, MockPins) {
        let factory = MockBusFactory::new();
        let pins = MockPins::new();
        let ctx = Self::new(
            DriverRegistry::with_builtin_drivers(),
            BusManager::new(factory.clone()),
            pins.clone(),
        );
        (ctx, factory, pins)
    }

    /// Replace the driver registry.
    pub fn with_registry(mut self, registry: DriverRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Replace the pin provider.
    pub fn with_pins(mut self, pins: impl PinProvider + 'static) -> Self {
        self.pins = Arc::new(pins);
        self
    }

    /// Create a driver from this context's registry and buses, ready to share.
    pub fn create_driver(
        &self,
        config: &PwmDriverConfig,
        bus: Option<&BusHandle>,
    ) -> HalResult<SharedDriver> {
        driver_registry::create_pwm_driver(&self.registry, &self.buses, config, bus)
            .map(share_driver)
    }
}
