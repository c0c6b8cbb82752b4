//! DMA channel registers and control block layout.
//!
//! A channel executes a linked list of 32-byte control blocks held in
//! bus-addressable memory. Each block describes one transfer; `NEXTCONBK`
//! points at the next one. A list whose last block points back at the
//! first runs forever without CPU involvement, which is how the carrier
//! ring is driven.
//!
//! # Register Map (per channel, offsets from the channel base)
//!
//! | Register    | Offset | Use |
//! |-------------|--------|-----|
//! | `CS`        | `0x00` | control and status (ACTIVE, RESET, priorities) |
//! | `CONBLK_AD` | `0x04` | bus address of the block being executed |
//! | `DEBUG`     | `0x20` | error flags, write 1 to clear |
//!
//! Channels 0-14 sit at `0x7000 + n * 0x100`; channel 15 is isolated at
//! `0xE05000`. The global `ENABLE` register is at `0x7FF0`.
//!
//! # Control Block
//!
//! ```text
//! word 0  TI          transfer information (DREQ, PERMAP, burst flags)
//! word 1  SOURCE_AD   bus address of the source
//! word 2  DEST_AD     bus address of the destination
//! word 3  TXFR_LEN    bytes to move
//! word 4  STRIDE      2D stride (unused, zero)
//! word 5  NEXTCONBK   bus address of the next block, 0 to stop
//! word 6-7            reserved, zero
//! ```

use crate::dma_memory::BusAddr;
use crate::error::HardwareError;
use crate::registers::RegisterBus;

/// Base of channel 0.
pub const DMA_BASE: u32 = 0x0000_7000;
/// Distance between consecutive channels 0-14.
pub const DMA_CHANNEL_STRIDE: u32 = 0x100;
/// Channel 15 lives apart from the others.
pub const DMA15_BASE: u32 = 0x00E0_5000;
/// Global channel enable register.
pub const DMA_ENABLE: u32 = 0x0000_7FF0;

/// Highest channel number.
pub const MAX_CHANNEL: u8 = 15;

/// `CS` register offset within a channel.
pub const CS: u32 = 0x00;
/// `CONBLK_AD` register offset within a channel.
pub const CONBLK_AD: u32 = 0x04;
/// `DEBUG` register offset within a channel.
pub const DEBUG: u32 = 0x20;

/// `DEBUG` error flags (read error, FIFO error, read-last-not-set).
pub const DEBUG_CLEAR_ERRORS: u32 = 0b111;

/// `CS` register bits.
pub mod cs {
    /// Channel running.
    pub const ACTIVE: u32 = 1;
    /// Transfer complete flag (write 1 to clear).
    pub const END: u32 = 1 << 1;
    /// Interrupt flag (write 1 to clear).
    pub const INT: u32 = 1 << 2;
    /// The channel hit an error; details in `DEBUG`.
    pub const ERROR: u32 = 1 << 8;
    /// Wait for outstanding AXI writes before signalling completion.
    pub const WAIT_FOR_OUTSTANDING_WRITES: u32 = 1 << 28;
    /// Abort the current control block.
    pub const ABORT: u32 = 1 << 30;
    /// Reset the channel.
    pub const RESET: u32 = 1 << 31;

    /// AXI priority (0-15) in bits 16-19.
    pub const fn priority(level: u32) -> u32 {
        (level & 0xF) << 16
    }

    /// AXI panic priority (0-15) in bits 20-23.
    pub const fn panic_priority(level: u32) -> u32 {
        (level & 0xF) << 20
    }
}

/// Transfer information (`TI`) bits.
pub mod ti {
    /// Wait for a write response before the next transfer.
    pub const WAIT_RESP: u32 = 1 << 3;
    /// Gate writes on the peripheral's DREQ.
    pub const DEST_DREQ: u32 = 1 << 6;
    /// Disable wide bursts (required for single-word peripheral writes).
    pub const NO_WIDE_BURSTS: u32 = 1 << 26;

    /// Peripheral DREQ line used for pacing, bits 16-20.
    pub const fn permap(dreq: u32) -> u32 {
        (dreq & 0x1F) << 16
    }
}

/// DREQ line of the PWM FIFO.
pub const DREQ_PWM: u32 = 5;

/// One hardware control block, laid out exactly as the DMA engine reads it.
#[repr(C, align(32))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlBlock {
    /// `TI` word.
    pub transfer_info: u32,
    /// Source bus address.
    pub source: u32,
    /// Destination bus address.
    pub destination: u32,
    /// Transfer length in bytes.
    pub length: u32,
    /// 2D stride, unused.
    pub stride: u32,
    /// Bus address of the next block.
    pub next: u32,
    reserved: [u32; 2],
}

impl ControlBlock {
    /// Size of a control block in bytes.
    pub const SIZE: usize = 32;

    /// Unpaced 4-byte copy from `source` into a peripheral register.
    pub const fn register_write(source: BusAddr, destination: BusAddr) -> Self {
        Self {
            transfer_info: ti::NO_WIDE_BURSTS | ti::WAIT_RESP,
            source: source.get(),
            destination: destination.get(),
            length: 4,
            stride: 0,
            next: 0,
            reserved: [0; 2],
        }
    }

    /// 4-byte write into a peripheral FIFO, stalled until `dreq` asserts.
    pub const fn paced_write(source: BusAddr, destination: BusAddr, dreq: u32) -> Self {
        Self {
            transfer_info: ti::NO_WIDE_BURSTS | ti::WAIT_RESP | ti::DEST_DREQ | ti::permap(dreq),
            source: source.get(),
            destination: destination.get(),
            length: 4,
            stride: 0,
            next: 0,
            reserved: [0; 2],
        }
    }

    /// Same block with `NEXTCONBK` set.
    #[must_use]
    pub const fn with_next(mut self, next: BusAddr) -> Self {
        self.next = next.get();
        self
    }

    /// The eight words in hardware order.
    pub const fn to_words(&self) -> [u32; 8] {
        [
            self.transfer_info,
            self.source,
            self.destination,
            self.length,
            self.stride,
            self.next,
            self.reserved[0],
            self.reserved[1],
        ]
    }
}

/// One DMA channel's register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaChannel {
    index: u8,
    base: u32,
}

impl DmaChannel {
    /// Channel `index` (0-15).
    ///
    /// # Errors
    ///
    /// [`HardwareError::InvalidDmaChannel`] for anything above 15.
    pub fn new(index: u8) -> Result<Self, HardwareError> {
        let base = match index {
            0..=14 => DMA_BASE + DMA_CHANNEL_STRIDE * u32::from(index),
            MAX_CHANNEL => DMA15_BASE,
            _ => return Err(HardwareError::InvalidDmaChannel(index)),
        };
        Ok(Self { index, base })
    }

    /// Channel number.
    pub const fn index(self) -> u8 {
        self.index
    }

    /// `CS` register offset.
    pub const fn cs_offset(self) -> u32 {
        self.base + CS
    }

    /// `CONBLK_AD` register offset.
    pub const fn conblk_offset(self) -> u32 {
        self.base + CONBLK_AD
    }

    /// `DEBUG` register offset.
    pub const fn debug_offset(self) -> u32 {
        self.base + DEBUG
    }

    /// Reset the channel and start executing the list at `first`.
    pub fn start<B: RegisterBus + ?Sized>(self, bus: &mut B, first: BusAddr) {
        bus.write_register(self.cs_offset(), cs::RESET);
        bus.write_register(self.cs_offset(), cs::END | cs::INT);
        bus.write_register(self.debug_offset(), DEBUG_CLEAR_ERRORS);
        if self.index < MAX_CHANNEL {
            let bit = 1u32 << self.index;
            bus.modify_register(DMA_ENABLE, bit, bit);
        }
        bus.write_register(self.conblk_offset(), first.get());
        bus.write_register(
            self.cs_offset(),
            cs::WAIT_FOR_OUTSTANDING_WRITES
                | cs::panic_priority(15)
                | cs::priority(15)
                | cs::ACTIVE,
        );
        tracing::debug!(channel = self.index, first = first.get(), "DMA channel started");
    }

    /// Abort whatever the channel is doing and return it to reset state.
    pub fn reset<B: RegisterBus + ?Sized>(self, bus: &mut B) {
        bus.write_register(self.cs_offset(), cs::RESET);
    }

    /// Bus address of the control block currently executing.
    ///
    /// Exactly one register read, so the value is never torn.
    pub fn current_control_block<B: RegisterBus + ?Sized>(self, bus: &B) -> u32 {
        bus.read_register(self.conblk_offset())
    }

    /// `true` while the channel is running.
    pub fn is_active<B: RegisterBus + ?Sized>(self, bus: &B) -> bool {
        self.status(bus) & cs::ACTIVE != 0
    }

    /// Raw `CS` word.
    pub fn status<B: RegisterBus + ?Sized>(self, bus: &B) -> u32 {
        bus.read_register(self.cs_offset())
    }

    /// `true` when `status` describes a channel that stopped walking its
    /// list: `ACTIVE` clear or `ERROR` set.
    pub const fn is_halted(status: u32) -> bool {
        status & cs::ACTIVE == 0 || status & cs::ERROR != 0
    }
}
