//! Shared I2C bus management.
//!
//! [`BusManager`] maps a bus index to one open physical channel and hands out
//! reference-counted [`BusHandle`]s. Every driver on the same bus index shares
//! the same channel; the channel is closed when the last handle is released.
//!
//! # Lifecycle
//!
//! ```text
//!   get_bus(1) ──► open channel (gen 1), refs = 1
//!   get_bus(1) ──► same channel,        refs = 2
//!   release    ──►                       refs = 1
//!   release    ──► close channel, notify observers, evict
//!   get_bus(1) ──► open channel (gen 2), refs = 1
//! ```
//!
//! Opening and closing happen while the index map is locked, so at most one
//! physical channel is open per index at any time.

pub mod linux;
pub mod mock;

use crate::bus::linux::LinuxBusFactory;
use parking_lot::Mutex;
use pihat_common::hal::bus::{BusFactory, BusIndex, I2cBus};
use pihat_common::hal::error::{HalError, HalResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Weak};
use tracing::{debug, info, warn};

/// Callback run once when a bus channel is physically closed.
pub type CloseObserver = Box<dyn FnOnce(BusIndex) + Send>;

struct SharedBus {
    index: BusIndex,
    generation: u64,
    channel: Mutex<Option<Box<dyn I2cBus>>>,
    observers: Mutex<Vec<CloseObserver>>,
}

struct Entry {
    shared: Arc<SharedBus>,
    refs: usize,
}

struct ManagerInner {
    factory: Box<dyn BusFactory>,
    entries: Mutex<HashMap<BusIndex, Entry>>,
    generations: AtomicU64,
}

/// Process-wide registry of open I2C buses.
///
/// Cheap to clone; clones share the same index map. Tests build private
/// managers over a [`mock::MockBusFactory`].
#[derive(Clone)]
pub struct BusManager {
    inner: Arc<ManagerInner>,
}

static GLOBAL_MANAGER: LazyLock<BusManager> =
    LazyLock::new(|| BusManager::new(LinuxBusFactory));

impl BusManager {
    /// Create a manager that opens channels through `factory`.
    pub fn new(factory: impl BusFactory + 'static) -> Self {
        Self::with_factory(Box::new(factory))
    }

    /// Create a manager from a boxed factory.
    pub fn with_factory(factory: Box<dyn BusFactory>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                factory,
                entries: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// The process-wide manager backed by `/dev/i2c-*`.
    pub fn global() -> BusManager {
        GLOBAL_MANAGER.clone()
    }

    /// Acquire a handle to bus `index`, opening the channel on first use.
    ///
    /// # Errors
    /// Whatever the factory reports when the channel cannot be opened.
    pub fn get_bus(&self, index: BusIndex) -> HalResult<BusHandle> {
        let mut entries = self.inner.entries.lock();

        if let Some(entry) = entries.get_mut(&index) {
            entry.refs += 1;
            debug!(bus = index, refs = entry.refs, "Reusing I2C bus");
            return Ok(BusHandle::new(Arc::clone(&entry.shared), &self.inner));
        }

        let channel = self.inner.factory.open(index)?;
        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::new(SharedBus {
            index,
            generation,
            channel: Mutex::new(Some(channel)),
            observers: Mutex::new(Vec::new()),
        });
        entries.insert(
            index,
            Entry {
                shared: Arc::clone(&shared),
                refs: 1,
            },
        );
        info!(bus = index, generation, "I2C bus opened");
        Ok(BusHandle::new(shared, &self.inner))
    }

    /// Give back a consumer's reference; closes the channel at zero.
    ///
    /// Takes the handle so each reference has exactly one release path:
    /// closing through the manager and dropping the handle cannot both
    /// decrement.
    ///
    /// # Errors
    /// `InvalidArgument` if `handle` came from another manager (it is still
    /// released there when dropped); `BusClosed` if its channel was already
    /// evicted; the channel's close error if the final close fails (the
    /// entry is evicted regardless).
    pub fn close_bus(&self, handle: BusHandle) -> HalResult<()> {
        let ours = handle
            .manager
            .upgrade()
            .is_some_and(|manager| Arc::ptr_eq(&manager, &self.inner));
        if !ours {
            return Err(HalError::InvalidArgument(format!(
                "bus {} handle belongs to another manager",
                handle.index()
            )));
        }
        handle.release()
    }

    /// Number of outstanding references to bus `index` (0 when not open).
    pub fn user_count(&self, index: BusIndex) -> usize {
        self.inner
            .entries
            .lock()
            .get(&index)
            .map_or(0, |entry| entry.refs)
    }

    /// Whether a channel is currently open for `index`.
    pub fn is_open(&self, index: BusIndex) -> bool {
        self.inner.entries.lock().contains_key(&index)
    }

    /// Indices with an open channel, ascending.
    pub fn open_buses(&self) -> Vec<BusIndex> {
        let mut indices: Vec<BusIndex> = self.inner.entries.lock().keys().copied().collect();
        indices.sort_unstable();
        indices
    }
}

impl fmt::Debug for BusManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusManager")
            .field("open_buses", &self.open_buses())
            .finish()
    }
}

impl ManagerInner {
    /// Decrement; `generation` pins the release to one specific channel.
    fn release(&self, index: BusIndex, generation: u64) -> HalResult<()> {
        let (shared, result) = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(&index) else {
                return Err(HalError::BusClosed(index));
            };
            if generation != entry.shared.generation {
                return Err(HalError::BusClosed(index));
            }

            entry.refs -= 1;
            if entry.refs > 0 {
                debug!(bus = index, refs = entry.refs, "Released I2C bus reference");
                return Ok(());
            }

            let Some(entry) = entries.remove(&index) else {
                return Err(HalError::BusClosed(index));
            };
            let result = match entry.shared.channel.lock().take() {
                Some(mut channel) => channel.close(),
                None => Ok(()),
            };
            (entry.shared, result)
        };

        match &result {
            Ok(()) => info!(bus = index, "I2C bus closed"),
            Err(e) => warn!(bus = index, "I2C bus close failed: {}", e),
        }

        let observers = std::mem::take(&mut *shared.observers.lock());
        for observer in observers {
            observer(index);
        }
        result
    }
}

/// A counted reference to one open bus channel.
///
/// All byte-level operations go through the channel's lock, so a single
/// call is never interleaved with another handle's call. Multi-step sequences
/// are not atomic across calls.
///
/// Dropping the handle releases its reference.
pub struct BusHandle {
    shared: Arc<SharedBus>,
    manager: Weak<ManagerInner>,
    released: AtomicBool,
}

impl BusHandle {
    fn new(shared: Arc<SharedBus>, manager: &Arc<ManagerInner>) -> Self {
        Self {
            shared,
            manager: Arc::downgrade(manager),
            released: AtomicBool::new(false),
        }
    }

    /// Bus index this handle refers to.
    pub fn index(&self) -> BusIndex {
        self.shared.index
    }

    /// Identity of the underlying physical channel.
    ///
    /// Two handles with equal ids share one channel; a reopened bus gets a
    /// new id.
    pub fn channel_id(&self) -> u64 {
        self.shared.generation
    }

    /// True once this handle is released or its channel was closed.
    pub fn is_closed(&self) -> bool {
        self.released.load(Ordering::SeqCst) || self.shared.channel.lock().is_none()
    }

    /// Acquire another reference to the same channel.
    ///
    /// # Errors
    /// `BusClosed` if the channel has been closed and evicted.
    pub fn share(&self) -> HalResult<BusHandle> {
        let index = self.index();
        if self.released.load(Ordering::SeqCst) {
            return Err(HalError::BusClosed(index));
        }
        let manager = self.manager.upgrade().ok_or(HalError::BusClosed(index))?;
        let mut entries = manager.entries.lock();
        match entries.get_mut(&index) {
            Some(entry) if Arc::ptr_eq(&entry.shared, &self.shared) => {
                entry.refs += 1;
                debug!(bus = index, refs = entry.refs, "Shared I2C bus handle");
                Ok(BusHandle::new(Arc::clone(&self.shared), &manager))
            }
            _ => Err(HalError::BusClosed(index)),
        }
    }

    /// Register a callback for when the channel physically closes.
    ///
    /// Runs immediately if the channel is already closed.
    pub fn on_close(&self, observer: impl FnOnce(BusIndex) + Send + 'static) {
        let closed = self.shared.channel.lock().is_none();
        if closed {
            observer(self.index());
        } else {
            self.shared.observers.lock().push(Box::new(observer));
        }
    }

    /// Release this handle's reference. A second call is a no-op.
    pub fn release(&self) -> HalResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.manager.upgrade() {
            Some(manager) => manager.release(self.index(), self.shared.generation),
            None => Ok(()),
        }
    }

    fn with_channel<T>(
        &self,
        op: impl FnOnce(&mut dyn I2cBus) -> HalResult<T>,
    ) -> HalResult<T> {
        if self.released.load(Ordering::SeqCst) {
            return Err(HalError::BusClosed(self.index()));
        }
        let mut guard = self.shared.channel.lock();
        match guard.as_mut() {
            Some(channel) => op(channel.as_mut()),
            None => Err(HalError::BusClosed(self.index())),
        }
    }

    /// Write `bytes` to `address`.
    pub fn write(&self, address: u8, bytes: &[u8]) -> HalResult<()> {
        debug!(bus = self.index(), address, ?bytes, "i2c write");
        self.with_channel(|ch| ch.write(address, bytes))
    }

    /// Read `len` bytes from `address`.
    pub fn read(&self, address: u8, len: usize) -> HalResult<Vec<u8>> {
        self.with_channel(|ch| ch.read(address, len))
    }

    /// Addresses that acknowledge on this bus.
    pub fn scan(&self) -> HalResult<Vec<u8>> {
        self.with_channel(|ch| ch.scan())
    }

    /// Write one byte to register `reg`.
    pub fn write_byte_data(&self, address: u8, reg: u8, value: u8) -> HalResult<()> {
        self.write(address, &[reg, value])
    }

    /// Read one byte from register `reg` (register select + read, one lock).
    pub fn read_byte_data(&self, address: u8, reg: u8) -> HalResult<u8> {
        let index = self.index();
        self.with_channel(|ch| {
            ch.write(address, &[reg])?;
            let bytes = ch.read(address, 1)?;
            bytes.first().copied().ok_or_else(|| HalError::I2cBus {
                bus: index,
                reason: format!("0x{address:02X}: empty read of register 0x{reg:02X}"),
            })
        })
    }

    /// Write a 16-bit value to register `reg`, high byte first.
    pub fn write_word_be(&self, address: u8, reg: u8, value: u16) -> HalResult<()> {
        let [hi, lo] = value.to_be_bytes();
        self.write(address, &[reg, hi, lo])
    }
}

impl Drop for BusHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(bus = self.index(), "Releasing I2C bus on drop failed: {}", e);
        }
    }
}

impl fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusHandle")
            .field("index", &self.index())
            .field("channel_id", &self.channel_id())
            .field("released", &self.released.load(Ordering::SeqCst))
            .finish()
    }
}
