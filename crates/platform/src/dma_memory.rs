//! DMA-visible memory.
//!
//! The DMA engine addresses memory by *bus* address; the ARM sees the same
//! bytes at a physical address (bus address with the cache-alias bits
//! `0xC000_0000` cleared) which this process maps through `/dev/mem`.
//! [`DmaMemory`] hides the pair: callers write by byte offset and ask for
//! the bus address of an offset when linking control blocks.

use crate::dma::ControlBlock;
use crate::error::HardwareError;
use crate::mailbox::Mailbox;
use crate::mmap::MappedRegisters;
use crate::registers::RegisterBus;
use crate::revision::{SocRevision, PERIPHERAL_BUS_BASE};

/// Page size used to round mailbox allocations.
pub const PAGE_SIZE: usize = 4096;

/// Bits of a bus address that select the cache alias.
pub const BUS_ALIAS_MASK: u32 = 0xC000_0000;

/// An address on the VideoCore bus, as written into control blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BusAddr(u32);

impl BusAddr {
    /// Wrap a raw bus address.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw address.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Address `bytes` further on.
    #[must_use]
    pub const fn offset(self, bytes: u32) -> Self {
        Self(self.0.wrapping_add(bytes))
    }

    /// ARM physical address of the same memory.
    pub const fn physical(self) -> u64 {
        (self.0 & !BUS_ALIAS_MASK) as u64
    }
}

/// Bus address of a peripheral register given its offset in the window.
pub const fn peripheral_bus_addr(offset: u32) -> BusAddr {
    BusAddr(PERIPHERAL_BUS_BASE + offset)
}

/// Word-addressed memory shared with the DMA engine.
pub trait DmaMemory {
    /// Bus address of byte 0.
    fn bus_base(&self) -> BusAddr;

    /// Allocation size in bytes.
    fn size(&self) -> usize;

    /// Write the 32-bit word at byte `offset` (4-aligned).
    ///
    /// # Errors
    ///
    /// [`HardwareError::DmaOutOfBounds`] for a misaligned or out-of-range
    /// offset.
    fn write_word(&mut self, offset: usize, value: u32) -> Result<(), HardwareError>;

    /// Read the 32-bit word at byte `offset` (4-aligned).
    ///
    /// # Errors
    ///
    /// As [`write_word`][Self::write_word].
    fn read_word(&self, offset: usize) -> Result<u32, HardwareError>;

    /// Bus address of byte `offset`.
    ///
    /// # Errors
    ///
    /// [`HardwareError::DmaOutOfBounds`] when `offset` is past the end.
    fn bus_addr(&self, offset: usize) -> Result<BusAddr, HardwareError> {
        let size = self.size();
        if offset > size {
            return Err(HardwareError::DmaOutOfBounds { offset, size });
        }
        u32::try_from(offset)
            .map(|delta| self.bus_base().offset(delta))
            .map_err(|_| HardwareError::DmaOutOfBounds { offset, size })
    }

    /// Store a control block at byte `offset` (32-aligned).
    ///
    /// # Errors
    ///
    /// [`HardwareError::DmaOutOfBounds`] when the block does not fit or is
    /// misaligned.
    fn write_control_block(&mut self, offset: usize, block: &ControlBlock) -> Result<(), HardwareError> {
        if offset % ControlBlock::SIZE != 0 {
            return Err(HardwareError::DmaOutOfBounds {
                offset,
                size: self.size(),
            });
        }
        for (word, value) in block.to_words().into_iter().enumerate() {
            self.write_word(offset + word * 4, value)?;
        }
        Ok(())
    }
}

/// Check a word offset against an allocation of `size` bytes.
pub(crate) fn check_word(offset: usize, size: usize) -> Result<(), HardwareError> {
    match offset.checked_add(4) {
        Some(end) if offset % 4 == 0 && end <= size => Ok(()),
        _ => Err(HardwareError::DmaOutOfBounds { offset, size }),
    }
}

/// Uncached GPU memory allocated through the mailbox and mapped into this
/// process. Unmapped, unlocked and released on drop.
pub struct MailboxMemory {
    mailbox: Mailbox,
    handle: u32,
    bus_base: BusAddr,
    map: MappedRegisters,
}

impl MailboxMemory {
    /// Allocate at least `size` bytes (rounded up to a page).
    ///
    /// # Errors
    ///
    /// [`HardwareError::Open`] without access to `/dev/vcio` or `/dev/mem`,
    /// [`HardwareError::Mailbox`] when the firmware refuses the request,
    /// [`HardwareError::Map`] when the range cannot be mapped.
    pub fn allocate(soc: SocRevision, size: usize) -> Result<Self, HardwareError> {
        let size = size.div_ceil(PAGE_SIZE).max(1) * PAGE_SIZE;
        let request = u32::try_from(size).map_err(|_| HardwareError::DmaOutOfBounds {
            offset: 0,
            size,
        })?;
        let mailbox = Mailbox::open()?;
        let handle = mailbox.mem_alloc(request, PAGE_SIZE as u32, soc.mailbox_mem_flags())?;

        let bus = match mailbox.mem_lock(handle) {
            Ok(bus) => BusAddr::new(bus),
            Err(err) => {
                release_quietly(&mailbox, handle, false);
                return Err(err);
            }
        };
        let map = match MappedRegisters::map_registers(bus.physical(), size) {
            Ok(map) => map,
            Err(err) => {
                release_quietly(&mailbox, handle, true);
                return Err(err);
            }
        };

        tracing::debug!(handle, bus = bus.get(), size, "DMA memory allocated");
        Ok(Self {
            mailbox,
            handle,
            bus_base: bus,
            map,
        })
    }
}

impl DmaMemory for MailboxMemory {
    fn bus_base(&self) -> BusAddr {
        self.bus_base
    }

    fn size(&self) -> usize {
        self.map.size()
    }

    fn write_word(&mut self, offset: usize, value: u32) -> Result<(), HardwareError> {
        check_word(offset, self.size())?;
        let register = u32::try_from(offset).map_err(|_| HardwareError::DmaOutOfBounds {
            offset,
            size: self.size(),
        })?;
        self.map.write_register(register, value);
        Ok(())
    }

    fn read_word(&self, offset: usize) -> Result<u32, HardwareError> {
        check_word(offset, self.size())?;
        let register = u32::try_from(offset).map_err(|_| HardwareError::DmaOutOfBounds {
            offset,
            size: self.size(),
        })?;
        Ok(self.map.read_register(register))
    }
}

impl Drop for MailboxMemory {
    fn drop(&mut self) {
        self.map.unmap_registers();
        release_quietly(&self.mailbox, self.handle, true);
        tracing::debug!(handle = self.handle, "DMA memory released");
    }
}

fn release_quietly(mailbox: &Mailbox, handle: u32, locked: bool) {
    if locked {
        if let Err(err) = mailbox.mem_unlock(handle) {
            tracing::warn!(handle, error = %err, "mailbox unlock failed");
        }
    }
    if let Err(err) = mailbox.mem_release(handle) {
        tracing::warn!(handle, error = %err, "mailbox release failed");
    }
}
