//! Descriptor ring.
//!
//! The ring is a fixed set of slots, each describing one divisor write.
//! In-process it is a plain `Vec` of [`Descriptor`]s linked by index; bus
//! addresses appear only in [`RingLayout::hand_off`], which lays the slots
//! out in DMA memory as a closed loop of control blocks.
//!
//! ```text
//!  slot 0                   slot 1                         slot C-1
//! ┌──────────┐  ┌──────┐   ┌──────────┐  ┌──────┐         ┌──────────┐  ┌──────┐
//! │ CB: data │─▶│ CB:  │──▶│ CB: data │─▶│ CB:  │── ··· ─▶│ CB: data │─▶│ CB:  │─┐
//! │ → GP0DIV │  │ PWM  │   │ → GP0DIV │  │ PWM  │         │ → GP0DIV │  │ PWM  │ │
//! └──────────┘  │ FIFO │   └──────────┘  │ FIFO │         └──────────┘  │ FIFO │ │
//!      ▲        └──────┘                 └──────┘                       └──────┘ │
//!      └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first block of a slot copies the slot's data word into `GP0DIV`; the
//! second writes the same word into the PWM FIFO and stalls on DREQ, which
//! fixes the slot's duration to one sample period.
//!
//! # Cursors
//!
//! Both cursors count slots monotonically (`u64`, no wrap in practice).
//! `write` is the next slot software fills; `read` is the slot the DMA
//! engine is executing. `write - read` never exceeds the capacity, and the
//! slot at `read` is never rewritten while it may be executing.
//!
//! Slots behind `read` have been played. The controller
//! [`release`](DescriptorRing::release)s them back to the neutral divisor
//! as soon as it sees them consumed, so a hardware cursor that overtakes
//! `write` before the next observation plays center, not last lap's audio.

use platform::{
    clock::CM_GP0DIV, dma::DREQ_PWM, peripheral_bus_addr, pwm, BusAddr, ControlBlock, DmaMemory,
    HardwareError,
};

use crate::error::ConfigError;
use crate::modulator::Divisor;

/// Control blocks per slot.
pub const BLOCKS_PER_SLOT: usize = 2;

/// Bytes of control blocks per slot.
pub const SLOT_STRIDE: usize = BLOCKS_PER_SLOT * ControlBlock::SIZE;

/// One register write of the hardware loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    /// Register offset the slot writes (`GP0DIV`).
    pub target_register: u32,
    /// Divisor the slot carries.
    pub value: Divisor,
    /// Index of the following slot.
    pub next_index: usize,
}

/// In-process model of the hardware loop.
#[derive(Debug, Clone)]
pub struct DescriptorRing {
    descriptors: Vec<Descriptor>,
    write: u64,
    read: u64,
}

/// Allocate a ring of `capacity` slots, every slot holding `initial`.
///
/// # Errors
///
/// [`ConfigError::InvalidSetting`] for a zero capacity.
pub fn allocate_ring(capacity: usize, initial: Divisor) -> Result<DescriptorRing, ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::InvalidSetting {
            name: "ring_capacity",
            reason: "must be at least one slot".into(),
        });
    }
    let descriptors = (0..capacity)
        .map(|index| Descriptor {
            target_register: CM_GP0DIV,
            value: initial,
            next_index: (index + 1) % capacity,
        })
        .collect();
    Ok(DescriptorRing {
        descriptors,
        write: 0,
        read: 0,
    })
}

impl DescriptorRing {
    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.descriptors.len()
    }

    fn capacity_u64(&self) -> u64 {
        self.descriptors.len() as u64
    }

    /// Slots written but not yet consumed (including the executing one).
    pub fn pending(&self) -> u64 {
        self.write.saturating_sub(self.read)
    }

    /// Slots that may be written now.
    pub fn free(&self) -> usize {
        let free = self.capacity_u64().saturating_sub(self.pending());
        usize::try_from(free).unwrap_or(usize::MAX)
    }

    /// `true` when no slot may be written.
    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    /// Absolute write cursor.
    pub fn write_cursor(&self) -> u64 {
        self.write
    }

    /// Absolute read cursor, as last observed.
    pub fn read_cursor(&self) -> u64 {
        self.read
    }

    /// Slot index of an absolute cursor.
    #[allow(clippy::cast_possible_truncation)] // Safety: result < capacity, which is a usize
    pub fn slot_of(&self, cursor: u64) -> usize {
        (cursor % self.capacity_u64()) as usize
    }

    /// Slot the next [`write_next`][Self::write_next] fills.
    pub fn write_slot(&self) -> usize {
        self.slot_of(self.write)
    }

    /// Store `divisor` in the next slot.
    ///
    /// Returns `false`, writing nothing, when that slot has not been
    /// consumed yet.
    pub fn write_next(&mut self, divisor: Divisor) -> bool {
        if self.is_full() {
            return false;
        }
        let slot = self.write_slot();
        if let Some(descriptor) = self.descriptors.get_mut(slot) {
            descriptor.value = divisor;
        }
        self.write += 1;
        true
    }

    /// Fold in the slot the hardware is now executing.
    ///
    /// Returns the number of slots consumed since the last observation. The
    /// hardware can only move forward, so the advance is taken modulo the
    /// capacity; a full lap between two observations is indistinguishable
    /// from no movement.
    pub fn observe(&mut self, hardware_slot: usize) -> u64 {
        let capacity = self.capacity_u64();
        let current = self.read % capacity;
        let target = hardware_slot as u64 % capacity;
        let advance = (target + capacity - current) % capacity;
        self.read += advance;
        advance
    }

    /// Reset the slot of `cursor` to `value` once the hardware is past it.
    ///
    /// Returns the slot, or `None` (changing nothing) when `cursor` is the
    /// executing slot, still pending, or more than a lap behind.
    pub fn release(&mut self, cursor: u64, value: Divisor) -> Option<usize> {
        let capacity = self.capacity_u64();
        if cursor >= self.read || cursor.saturating_add(capacity) < self.read.max(self.write) {
            return None;
        }
        let slot = self.slot_of(cursor);
        self.descriptors.get_mut(slot)?.value = value;
        Some(slot)
    }

    /// `true` when the hardware has reached slots software never refilled.
    pub fn is_underrun(&self) -> bool {
        self.read >= self.write
    }

    /// Restart writing at the hardware's position after an underrun.
    pub fn resync(&mut self) {
        self.write = self.read;
    }

    /// Descriptor in `slot`.
    pub fn descriptor(&self, slot: usize) -> Option<&Descriptor> {
        self.descriptors.get(slot)
    }

    /// All descriptors in slot order.
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }
}

/// Placement of a ring in DMA memory.
///
/// Control blocks come first (`SLOT_STRIDE` bytes per slot, so every block
/// stays 32-byte aligned), followed by one data word per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingLayout {
    capacity: usize,
}

impl RingLayout {
    /// Layout for `capacity` slots.
    pub const fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Number of slots.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Byte offset of control block `block` (0 or 1) of `slot`.
    pub const fn control_block_offset(&self, slot: usize, block: usize) -> usize {
        slot * SLOT_STRIDE + block * ControlBlock::SIZE
    }

    /// Byte offset of the data word of `slot`.
    pub const fn data_offset(&self, slot: usize) -> usize {
        self.capacity * SLOT_STRIDE + slot * 4
    }

    /// DMA memory needed.
    pub const fn total_size(&self) -> usize {
        self.capacity * (SLOT_STRIDE + 4)
    }

    /// Slot owning the control block at bus address `addr`, given the bus
    /// address of byte 0.
    pub fn slot_of_control_block(&self, bus_base: BusAddr, addr: u32) -> Option<usize> {
        let delta = usize::try_from(addr.checked_sub(bus_base.get())?).ok()?;
        let slot = delta / SLOT_STRIDE;
        (slot < self.capacity).then_some(slot)
    }

    /// Write every control block and data word of `ring` into `memory`,
    /// close the loop, and return the bus address of the first block.
    ///
    /// # Errors
    ///
    /// [`HardwareError::DmaOutOfBounds`] when `memory` is smaller than
    /// [`total_size`][Self::total_size].
    pub fn hand_off<M: DmaMemory + ?Sized>(
        &self,
        ring: &DescriptorRing,
        memory: &mut M,
    ) -> Result<BusAddr, HardwareError> {
        if memory.size() < self.total_size() || ring.capacity() != self.capacity {
            return Err(HardwareError::DmaOutOfBounds {
                offset: self.total_size(),
                size: memory.size(),
            });
        }
        let fifo = pwm::fifo_bus_addr();
        for (slot, descriptor) in ring.descriptors().iter().enumerate() {
            let data = memory.bus_addr(self.data_offset(slot))?;
            let pacing = memory.bus_addr(self.control_block_offset(slot, 1))?;
            let next = memory.bus_addr(self.control_block_offset(descriptor.next_index, 0))?;

            let divisor_write =
                ControlBlock::register_write(data, peripheral_bus_addr(descriptor.target_register))
                    .with_next(pacing);
            let pace = ControlBlock::paced_write(data, fifo, DREQ_PWM).with_next(next);

            memory.write_word(self.data_offset(slot), descriptor.value.register_word())?;
            memory.write_control_block(self.control_block_offset(slot, 0), &divisor_write)?;
            memory.write_control_block(self.control_block_offset(slot, 1), &pace)?;
        }
        let first = memory.bus_addr(self.control_block_offset(0, 0))?;
        tracing::debug!(
            slots = self.capacity,
            bytes = self.total_size(),
            first = first.get(),
            "descriptor ring handed off"
        );
        Ok(first)
    }
}
