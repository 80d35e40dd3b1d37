//! Linux i2c-dev backend (`/dev/i2c-<index>`) over `linux-embedded-hal`.

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use linux_embedded_hal::i2cdev::linux::LinuxI2CError;
use linux_embedded_hal::{I2CError, I2cdev};
use pihat_common::consts::{I2C_SCAN_FIRST, I2C_SCAN_LAST};
use pihat_common::hal::bus::{BusFactory, BusIndex, I2cBus};
use pihat_common::hal::error::{HalError, HalResult};
use tracing::debug;

/// Device node path for a bus index.
pub fn device_path(index: BusIndex) -> String {
    format!("/dev/i2c-{index}")
}

fn errno(err: &LinuxI2CError) -> Option<i32> {
    match err {
        LinuxI2CError::Errno(code) => Some(*code),
        LinuxI2CError::Io(e) => e.raw_os_error(),
    }
}

/// Physical-layer failure on `index` talking to `address`.
fn transfer_error(index: BusIndex, address: u8, err: &I2CError) -> HalError {
    if errno(err.inner()) == Some(libc::ETIMEDOUT) {
        return HalError::I2cTimeout { bus: index, address };
    }
    HalError::I2cBus {
        bus: index,
        reason: format!("0x{address:02X}: {err}"),
    }
}

/// No-device outcomes of a scan write.
fn is_absent(err: &I2CError) -> bool {
    matches!(err.kind(), ErrorKind::NoAcknowledge(_))
        || matches!(
            errno(err.inner()),
            Some(libc::EREMOTEIO) | Some(libc::ENXIO) | Some(libc::EIO)
        )
}

/// One open i2c-dev node. The device selects the slave address per
/// transfer.
pub struct LinuxI2cBus {
    index: BusIndex,
    device: Option<I2cdev>,
}

impl LinuxI2cBus {
    /// Open `/dev/i2c-<index>`.
    pub fn open(index: BusIndex) -> HalResult<Self> {
        let path = device_path(index);
        let device = I2cdev::new(&path).map_err(|e| HalError::I2cBus {
            bus: index,
            reason: format!("cannot open {path}: {e}"),
        })?;
        debug!(bus = index, %path, "Opened i2c-dev node");
        Ok(Self {
            index,
            device: Some(device),
        })
    }

    fn device(&mut self) -> HalResult<&mut I2cdev> {
        self.device.as_mut().ok_or(HalError::BusClosed(self.index))
    }
}

impl I2cBus for LinuxI2cBus {
    fn write(&mut self, address: u8, bytes: &[u8]) -> HalResult<()> {
        let index = self.index;
        self.device()?
            .write(address, bytes)
            .map_err(|e| transfer_error(index, address, &e))
    }

    fn read(&mut self, address: u8, len: usize) -> HalResult<Vec<u8>> {
        let index = self.index;
        let mut buf = vec![0u8; len];
        self.device()?
            .read(address, &mut buf)
            .map_err(|e| transfer_error(index, address, &e))?;
        Ok(buf)
    }

    fn scan(&mut self) -> HalResult<Vec<u8>> {
        let index = self.index;
        let device = self.device()?;
        let mut found = Vec::new();
        for address in I2C_SCAN_FIRST..=I2C_SCAN_LAST {
            match device.write(address, &[0]) {
                Ok(()) => found.push(address),
                Err(e) if is_absent(&e) => {}
                Err(e) => return Err(transfer_error(index, address, &e)),
            }
        }
        debug!(bus = index, ?found, "Scan complete");
        Ok(found)
    }

    fn close(&mut self) -> HalResult<()> {
        // Dropping the device closes the descriptor.
        self.device = None;
        Ok(())
    }
}

/// Opens [`LinuxI2cBus`] channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxBusFactory;

impl BusFactory for LinuxBusFactory {
    fn open(&self, index: BusIndex) -> HalResult<Box<dyn I2cBus>> {
        Ok(Box::new(LinuxI2cBus::open(index)?))
    }
}
