//! Bus primitive contract.
//!
//! [`I2cBus`] is the byte-level channel the HAL consumes from the platform
//! (Linux i2c-dev, a mock, or a third-party backend). [`BusFactory`] opens one
//! for a bus index; the bus manager in `pihat_hal` decides when.

use crate::hal::error::HalResult;

/// Integer identifying a physical bus (`/dev/i2c-<index>` on Linux).
pub type BusIndex = u8;

/// One open physical I2C channel.
///
/// Implementations surface physical-layer failures as
/// [`HalError::I2cBus`](crate::hal::error::HalError::I2cBus) /
/// [`HalError::I2cTimeout`](crate::hal::error::HalError::I2cTimeout) and never
/// retry internally.
pub trait I2cBus: Send {
    /// Write `bytes` to the device at `address` in one transaction.
    fn write(&mut self, address: u8, bytes: &[u8]) -> HalResult<()>;

    /// Read `len` bytes from the device at `address`.
    fn read(&mut self, address: u8, len: usize) -> HalResult<Vec<u8>>;

    /// Addresses that acknowledge on this bus, ascending.
    fn scan(&mut self) -> HalResult<Vec<u8>>;

    /// Release the OS resource. Called exactly once by the bus manager.
    fn close(&mut self) -> HalResult<()>;
}

/// Opens physical channels for the bus manager.
pub trait BusFactory: Send + Sync {
    /// Open the channel for `index`.
    fn open(&self, index: BusIndex) -> HalResult<Box<dyn I2cBus>>;
}
