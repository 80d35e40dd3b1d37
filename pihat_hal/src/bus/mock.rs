//! In-memory I2C bus.
//!
//! Devices behave like SMBus register files: the first byte of a write selects
//! a register, following bytes are stored at consecutive registers, and a read
//! returns bytes from the selected register onward. Every write is recorded so
//! tests (and the CLI `--mock` mode) can inspect what a driver sent.

use parking_lot::Mutex;
use pihat_common::consts::{I2C_SCAN_FIRST, I2C_SCAN_LAST};
use pihat_common::hal::bus::{BusFactory, BusIndex, I2cBus};
use pihat_common::hal::error::{HalError, HalResult};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Default)]
struct BusState {
    writes: Vec<(u8, Vec<u8>)>,
    registers: HashMap<(u8, u8), u8>,
    pointers: HashMap<u8, u8>,
    devices: BTreeSet<u8>,
    write_error: Option<HalError>,
    close_error: Option<HalError>,
    closed: bool,
}

/// Test-side view of one opened mock channel.
#[derive(Clone)]
pub struct MockBus {
    index: BusIndex,
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    fn new(index: BusIndex, devices: BTreeSet<u8>) -> Self {
        Self {
            index,
            state: Arc::new(Mutex::new(BusState {
                devices,
                ..BusState::default()
            })),
        }
    }

    /// Every write so far as `(address, bytes)`.
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().writes.clone()
    }

    /// Writes addressed to `address`.
    pub fn writes_to(&self, address: u8) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    /// Forget recorded writes.
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Current value of a device register.
    pub fn register(&self, address: u8, reg: u8) -> u8 {
        self.state
            .lock()
            .registers
            .get(&(address, reg))
            .copied()
            .unwrap_or(0)
    }

    /// Preload a device register.
    pub fn set_register(&self, address: u8, reg: u8, value: u8) {
        self.state.lock().registers.insert((address, reg), value);
    }

    /// Make every following write fail with `error` (`None` to clear).
    pub fn set_write_error(&self, error: Option<HalError>) {
        self.state.lock().write_error = error;
    }

    /// Make the physical close fail with `error`.
    pub fn set_close_error(&self, error: Option<HalError>) {
        self.state.lock().close_error = error;
    }

    /// Whether the manager physically closed this channel.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn absent(&self, state: &BusState, address: u8) -> bool {
        !state.devices.is_empty() && !state.devices.contains(&address)
    }
}

/// The [`I2cBus`] side of a [`MockBus`].
pub struct MockI2cBus {
    bus: MockBus,
}

impl I2cBus for MockI2cBus {
    fn write(&mut self, address: u8, bytes: &[u8]) -> HalResult<()> {
        let mut state = self.bus.state.lock();
        if let Some(err) = &state.write_error {
            return Err(err.clone());
        }
        if self.bus.absent(&state, address) {
            return Err(HalError::I2cBus {
                bus: self.bus.index,
                reason: format!("0x{address:02X}: no acknowledge"),
            });
        }
        state.writes.push((address, bytes.to_vec()));
        if let Some((&reg, values)) = bytes.split_first() {
            state.pointers.insert(address, reg);
            for (offset, &value) in values.iter().enumerate() {
                let target = reg.wrapping_add(offset as u8);
                state.registers.insert((address, target), value);
            }
        }
        Ok(())
    }

    fn read(&mut self, address: u8, len: usize) -> HalResult<Vec<u8>> {
        let state = self.bus.state.lock();
        if self.bus.absent(&state, address) {
            return Err(HalError::I2cBus {
                bus: self.bus.index,
                reason: format!("0x{address:02X}: no acknowledge"),
            });
        }
        let start = state.pointers.get(&address).copied().unwrap_or(0);
        Ok((0..len)
            .map(|offset| {
                let reg = start.wrapping_add(offset as u8);
                state.registers.get(&(address, reg)).copied().unwrap_or(0)
            })
            .collect())
    }

    fn scan(&mut self) -> HalResult<Vec<u8>> {
        let state = self.bus.state.lock();
        Ok(state
            .devices
            .iter()
            .copied()
            .filter(|a| (I2C_SCAN_FIRST..=I2C_SCAN_LAST).contains(a))
            .collect())
    }

    fn close(&mut self) -> HalResult<()> {
        let mut state = self.bus.state.lock();
        state.closed = true;
        match state.close_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct FactoryState {
    devices: BTreeSet<u8>,
    opens: HashMap<BusIndex, usize>,
    buses: HashMap<BusIndex, MockBus>,
    unavailable: BTreeSet<BusIndex>,
}

/// Opens [`MockI2cBus`] channels and keeps a [`MockBus`] view of the latest
/// one per index.
#[derive(Clone, Default)]
pub struct MockBusFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MockBusFactory {
    /// Factory whose buses accept writes to any address.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose buses only acknowledge `devices`.
    pub fn with_devices(devices: &[u8]) -> Self {
        let factory = Self::default();
        factory.state.lock().devices = devices.iter().copied().collect();
        factory
    }

    /// Make `open(index)` fail.
    pub fn set_unavailable(&self, index: BusIndex) {
        self.state.lock().unavailable.insert(index);
    }

    /// How many times `index` has been physically opened.
    pub fn open_count(&self, index: BusIndex) -> usize {
        self.state.lock().opens.get(&index).copied().unwrap_or(0)
    }

    /// Total physical opens across all indices.
    pub fn total_opens(&self) -> usize {
        self.state.lock().opens.values().sum()
    }

    /// View of the most recently opened channel for `index`.
    ///
    /// Returns a detached, empty view if `index` was never opened.
    pub fn bus(&self, index: BusIndex) -> MockBus {
        let state = self.state.lock();
        state
            .buses
            .get(&index)
            .cloned()
            .unwrap_or_else(|| MockBus::new(index, state.devices.clone()))
    }
}

impl BusFactory for MockBusFactory {
    fn open(&self, index: BusIndex) -> HalResult<Box<dyn I2cBus>> {
        let mut state = self.state.lock();
        if state.unavailable.contains(&index) {
            return Err(HalError::I2cBus {
                bus: index,
                reason: format!("/dev/i2c-{index}: no such device"),
            });
        }
        *state.opens.entry(index).or_insert(0) += 1;
        let bus = MockBus::new(index, state.devices.clone());
        state.buses.insert(index, bus.clone());
        Ok(Box::new(MockI2cBus { bus }))
    }
}
