//! # Bus Manager Tests
//!
//! Reference counting, eviction and reopen behaviour of the shared I2C bus
//! manager, exercised through the in-memory bus.

use pihat_common::hal::error::HalError;
use pihat_hal::bus::BusManager;
use pihat_hal::bus::mock::MockBusFactory;
use std::sync::{Arc, Mutex};
use std::thread;

fn manager() -> (BusManager, MockBusFactory) {
    let factory = MockBusFactory::with_devices(&[0x14, 0x40]);
    (BusManager::new(factory.clone()), factory)
}

// ─── Sharing ────────────────────────────────────────────────────────

#[test]
fn test_two_gets_share_one_channel() {
    let (buses, factory) = manager();
    let a = buses.get_bus(1).unwrap();
    let b = buses.get_bus(1).unwrap();

    assert_eq!(a.channel_id(), b.channel_id());
    assert_eq!(buses.user_count(1), 2);
    assert_eq!(factory.open_count(1), 1);
}

#[test]
fn test_close_with_two_users_keeps_channel_open() {
    let (buses, factory) = manager();
    let a = buses.get_bus(1).unwrap();
    let b = buses.get_bus(1).unwrap();

    buses.close_bus(a).unwrap();
    assert!(buses.is_open(1));
    assert!(!factory.bus(1).is_closed());
    assert!(b.write(0x40, &[0x00, 0x00]).is_ok());
}

#[test]
fn test_second_user_survives_first_close_and_scope_exit() {
    let (buses, factory) = manager();
    let b = buses.get_bus(1).unwrap();
    {
        let a = buses.get_bus(1).unwrap();
        let shared = a.share().unwrap();
        buses.close_bus(a).unwrap();
        drop(shared);
    }

    assert_eq!(buses.user_count(1), 1);
    assert!(buses.is_open(1));
    assert!(b.write(0x40, &[0x00]).is_ok());
    assert_eq!(factory.open_count(1), 1);

    drop(b);
    assert!(!buses.is_open(1));
    assert!(factory.bus(1).is_closed());
}

#[test]
fn test_close_to_zero_then_reopen_is_new_channel() {
    let (buses, factory) = manager();
    let a = buses.get_bus(1).unwrap();
    let first = a.channel_id();
    a.release().unwrap();

    assert!(!buses.is_open(1));
    assert!(factory.bus(1).is_closed());
    assert!(matches!(a.write(0x40, &[0x00]), Err(HalError::BusClosed(1))));

    let b = buses.get_bus(1).unwrap();
    assert_ne!(b.channel_id(), first);
    assert_eq!(factory.open_count(1), 2);
}

#[test]
fn test_buses_are_independent() {
    let (buses, _factory) = manager();
    let one = buses.get_bus(1).unwrap();
    let _three = buses.get_bus(3).unwrap();
    assert_eq!(buses.open_buses(), vec![1, 3]);

    one.release().unwrap();
    assert_eq!(buses.open_buses(), vec![3]);
}

// ─── Observers ──────────────────────────────────────────────────────

#[test]
fn test_close_observer_runs_once_on_physical_close() {
    let (buses, _factory) = manager();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let a = buses.get_bus(1).unwrap();
    let b = a.share().unwrap();
    let sink = Arc::clone(&seen);
    a.on_close(move |index| sink.lock().unwrap().push(index));

    a.release().unwrap();
    assert!(seen.lock().unwrap().is_empty());
    b.release().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1]);
}

#[test]
fn test_stale_handle_does_not_touch_new_channel() {
    let (buses, _factory) = manager();
    let old = buses.get_bus(1).unwrap();
    old.release().unwrap();

    let fresh = buses.get_bus(1).unwrap();
    old.release().unwrap();
    drop(old);
    assert_eq!(buses.user_count(1), 1);
    assert!(fresh.scan().is_ok());
}

// ─── Scan and concurrency ───────────────────────────────────────────

#[test]
fn test_scan_lists_mock_devices() {
    let (buses, _factory) = manager();
    let bus = buses.get_bus(1).unwrap();
    assert_eq!(bus.scan().unwrap(), vec![0x14, 0x40]);
}

#[test]
fn test_concurrent_get_bus_opens_once() {
    let (buses, factory) = manager();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let buses = buses.clone();
            thread::spawn(move || buses.get_bus(1).unwrap())
        })
        .collect();
    let held: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(factory.open_count(1), 1);
    assert_eq!(buses.user_count(1), 8);
    drop(held);
    assert!(!buses.is_open(1));
}
