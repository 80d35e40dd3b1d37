//! # Driver Registry Tests
//!
//! Registration, lookup and construction through the registry, including
//! the guarantee that unknown driver types never reach the hardware.

use pihat_common::hal::config::PwmDriverConfig;
use pihat_common::hal::driver::PwmDriver;
use pihat_common::hal::error::{HalError, HalResult};
use pihat_hal::bus::BusManager;
use pihat_hal::bus::mock::MockBusFactory;
use pihat_hal::driver_registry::{DriverArgs, DriverRegistry, DuplicatePolicy, create_pwm_driver};
use pihat_hal::drivers::{DriverCall, MockDriver, MockDriverLog};

fn registry_with_mock() -> (DriverRegistry, MockDriverLog) {
    let log = MockDriverLog::new();
    let mut registry = DriverRegistry::new();
    log.register(&mut registry, MockDriver::TYPE_NAME).unwrap();
    (registry, log)
}

// ─── Creation ───────────────────────────────────────────────────────

#[test]
fn test_mock_driver_sees_frequency_once() {
    let (registry, log) = registry_with_mock();
    let buses = BusManager::new(MockBusFactory::new());

    let config = PwmDriverConfig::new("Mock", 1, 0x40);
    let mut driver = create_pwm_driver(&registry, &buses, &config, None).unwrap();
    driver.set_pwm_freq(50).unwrap();

    assert_eq!(log.freq_calls(), vec![50]);
    assert_eq!(log.calls(), vec![DriverCall::Freq(50)]);
}

#[test]
fn test_unregistered_type_touches_nothing() {
    let (registry, log) = registry_with_mock();
    let factory = MockBusFactory::new();
    let buses = BusManager::new(factory.clone());

    let config = PwmDriverConfig::new("Unregistered", 1, 0x40);
    let result = create_pwm_driver(&registry, &buses, &config, None);

    assert!(matches!(result, Err(HalError::UnknownDriverType(name)) if name == "Unregistered"));
    assert_eq!(log.constructed(), 0);
    assert_eq!(factory.total_opens(), 0);
}

#[test]
fn test_invalid_config_opens_no_bus() {
    let (registry, log) = registry_with_mock();
    let factory = MockBusFactory::new();
    let buses = BusManager::new(factory.clone());

    let config = PwmDriverConfig::new("Mock", 1, 0x80);
    assert!(create_pwm_driver(&registry, &buses, &config, None).is_err());
    assert_eq!(log.constructed(), 0);
    assert_eq!(factory.total_opens(), 0);
}

#[test]
fn test_drivers_share_passed_bus() {
    let (registry, log) = registry_with_mock();
    let factory = MockBusFactory::new();
    let buses = BusManager::new(factory.clone());

    let bus = buses.get_bus(1).unwrap();
    let a = create_pwm_driver(&registry, &buses, &PwmDriverConfig::new("Mock", 1, 0x40), Some(&bus))
        .unwrap();
    let b = create_pwm_driver(&registry, &buses, &PwmDriverConfig::new("Mock", 1, 0x41), Some(&bus))
        .unwrap();

    assert_eq!(log.constructed(), 2);
    assert_eq!(factory.open_count(1), 1);
    assert_eq!(buses.user_count(1), 3);
    drop((a, b));
    assert_eq!(buses.user_count(1), 1);
}

#[test]
fn test_builtin_drivers_over_mock_bus() {
    let registry = DriverRegistry::with_builtin_drivers();
    let factory = MockBusFactory::new();
    let buses = BusManager::new(factory.clone());

    let mut pca =
        create_pwm_driver(&registry, &buses, &PwmDriverConfig::new("PCA9685", 1, 0x40), None)
            .unwrap();
    let mut mcu =
        create_pwm_driver(&registry, &buses, &PwmDriverConfig::new("Sunfounder", 1, 0x14), None)
            .unwrap();
    assert_eq!(pca.driver_type(), "PCA9685");
    assert_eq!(mcu.driver_type(), "Sunfounder");
    assert_eq!(factory.open_count(1), 1);

    pca.set_pwm_duty_cycle(0, 50.0).unwrap();
    mcu.set_pwm_duty_cycle(0, 50.0).unwrap();
    assert!(matches!(
        pca.set_pwm_duty_cycle(0, -1.0),
        Err(HalError::InvalidArgument(_))
    ));

    pca.close().unwrap();
    mcu.close().unwrap();
    assert!(!buses.is_open(1));
}

// ─── Registration ───────────────────────────────────────────────────

fn boxed_mock(log: &MockDriverLog) -> impl Fn(DriverArgs) -> HalResult<Box<dyn PwmDriver>> + use<> {
    let log = log.clone();
    move |args: DriverArgs| -> HalResult<Box<dyn PwmDriver>> {
        Ok(Box::new(MockDriver::new(log.clone(), args)))
    }
}

#[test]
fn test_duplicate_rejected_by_default() {
    let (mut registry, log) = registry_with_mock();
    assert_eq!(registry.policy(), DuplicatePolicy::Reject);
    let result = registry.register("Mock", boxed_mock(&log));
    assert!(matches!(result, Err(HalError::DriverAlreadyRegistered(_))));
}

#[test]
fn test_duplicate_overwrite_policy_replaces() {
    let first = MockDriverLog::new();
    let second = MockDriverLog::new();
    let mut registry = DriverRegistry::with_policy(DuplicatePolicy::Overwrite);
    registry.register("Mock", boxed_mock(&first)).unwrap();
    registry.register("Mock", boxed_mock(&second)).unwrap();
    assert_eq!(registry.list_drivers(), vec!["Mock"]);

    let buses = BusManager::new(MockBusFactory::new());
    create_pwm_driver(&registry, &buses, &PwmDriverConfig::new("Mock", 1, 0x40), None).unwrap();
    assert_eq!(first.constructed(), 0);
    assert_eq!(second.constructed(), 1);
}
