//! Mock implementations for testing
//!
//! Host-side stand-ins for the peripheral window and DMA memory. Both mocks
//! are cheap handles over shared state: clone one, hand the clone to the code
//! under test and inspect the original afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::dma_memory::{check_word, BusAddr, DmaMemory};
use crate::error::HardwareError;
use crate::gpio::{self, GpioFunction};
use crate::registers::RegisterBus;

#[derive(Debug, Default)]
struct RegisterState {
    values: HashMap<u32, u32>,
    pinned: HashMap<u32, u32>,
    writes: Vec<(u32, u32)>,
}

/// Recording register bus.
///
/// Reads return the last value written (or [`set`][Self::set]), ORed with
/// any [`pin`][Self::pin]ned bits. Every write is logged in order.
#[derive(Debug, Clone, Default)]
pub struct MockRegisterBus {
    state: Arc<Mutex<RegisterState>>,
}

impl MockRegisterBus {
    /// Empty bus; every register reads 0.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegisterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Preload a register without logging a write. Simulates the hardware
    /// changing a value (e.g. DMA advancing `CONBLK_AD`).
    pub fn set(&self, offset: u32, value: u32) {
        self.state().values.insert(offset, value);
    }

    /// Force `bits` to read as set at `offset` regardless of writes.
    pub fn pin(&self, offset: u32, bits: u32) {
        self.state().pinned.insert(offset, bits);
    }

    /// Current value of a register.
    pub fn value(&self, offset: u32) -> u32 {
        self.read_register(offset)
    }

    /// Every write so far, in order.
    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.state().writes.clone()
    }

    /// Values written to one register, in order.
    pub fn writes_to(&self, offset: u32) -> Vec<u32> {
        self.state()
            .writes
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Number of writes so far.
    pub fn write_count(&self) -> usize {
        self.state().writes.len()
    }

    /// Number of writes that returned the antenna pin (GPIO4) to input.
    ///
    /// Each hardware safing pass performs exactly one.
    pub fn idle_reset_count(&self) -> usize {
        let shift = gpio::fsel_shift(gpio::GPCLK0_PIN);
        self.writes_to(gpio::fsel_offset(gpio::GPCLK0_PIN))
            .into_iter()
            .filter(|v| (v >> shift) & 0b111 == GpioFunction::Input.bits())
            .count()
    }
}

impl RegisterBus for MockRegisterBus {
    fn read_register(&self, offset: u32) -> u32 {
        let state = self.state();
        let value = state.values.get(&offset).copied().unwrap_or(0);
        value | state.pinned.get(&offset).copied().unwrap_or(0)
    }

    fn write_register(&mut self, offset: u32, value: u32) {
        let mut state = self.state();
        state.values.insert(offset, value);
        state.writes.push((offset, value));
    }
}

#[derive(Debug)]
struct MemoryState {
    words: Vec<u32>,
    writes: Vec<(usize, u32)>,
}

/// Heap-backed DMA memory with a fake bus address.
#[derive(Debug, Clone)]
pub struct MockDmaMemory {
    bus_base: BusAddr,
    size: usize,
    state: Arc<Mutex<MemoryState>>,
}

impl MockDmaMemory {
    /// Zeroed allocation of `size` bytes (rounded down to whole words).
    pub fn new(bus_base: BusAddr, size: usize) -> Self {
        Self {
            bus_base,
            size: size - size % 4,
            state: Arc::new(Mutex::new(MemoryState {
                words: vec![0; size / 4],
                writes: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Word at byte `offset`, 0 when out of range.
    pub fn word(&self, offset: usize) -> u32 {
        self.state().words.get(offset / 4).copied().unwrap_or(0)
    }

    /// Every write so far as `(offset, value)`, in order.
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.state().writes.clone()
    }

    /// Values written at one offset, in order.
    pub fn writes_at(&self, offset: usize) -> Vec<u32> {
        self.state()
            .writes
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Byte offset corresponding to a bus address inside the allocation.
    pub fn offset_of(&self, addr: BusAddr) -> Option<usize> {
        let delta = addr.get().checked_sub(self.bus_base.get())?;
        let delta = usize::try_from(delta).ok()?;
        (delta < self.size).then_some(delta)
    }
}

impl DmaMemory for MockDmaMemory {
    fn bus_base(&self) -> BusAddr {
        self.bus_base
    }

    fn size(&self) -> usize {
        self.size
    }

    fn write_word(&mut self, offset: usize, value: u32) -> Result<(), HardwareError> {
        check_word(offset, self.size)?;
        let mut state = self.state();
        if let Some(slot) = state.words.get_mut(offset / 4) {
            *slot = value;
        }
        state.writes.push((offset, value));
        Ok(())
    }

    fn read_word(&self, offset: usize) -> Result<u32, HardwareError> {
        check_word(offset, self.size)?;
        Ok(self.word(offset))
    }
}
