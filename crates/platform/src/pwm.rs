//! PWM controller used as a sample clock.
//!
//! Nothing is ever output on a PWM pin. The FIFO drains one word per
//! `RNG1` PWM clock ticks and raises DREQ 5 whenever it has room; a DMA
//! control block gated on that DREQ therefore completes once per sample
//! period. The pacing block of every ring slot writes a dummy word here.
//!
//! ```text
//! sample_rate = reference / (divisor * RANGE)
//! ```
//!
//! # Register Map (offsets from the peripheral base)
//!
//! | Register | Offset     |
//! |----------|------------|
//! | `CTL`    | `0x20C000` |
//! | `STA`    | `0x20C004` |
//! | `DMAC`   | `0x20C008` |
//! | `RNG1`   | `0x20C010` |
//! | `DAT1`   | `0x20C014` |
//! | `FIF1`   | `0x20C018` |

use crate::clock::{ClockGenerator, ClockSource};
use crate::dma_memory::{peripheral_bus_addr, BusAddr};
use crate::error::HardwareError;
use crate::registers::RegisterBus;

/// PWM block base.
pub const PWM_BASE: u32 = 0x0020_C000;
/// Control register.
pub const PWM_CTL: u32 = PWM_BASE;
/// Status register.
pub const PWM_STA: u32 = PWM_BASE + 0x04;
/// DMA configuration register.
pub const PWM_DMAC: u32 = PWM_BASE + 0x08;
/// Channel 1 range.
pub const PWM_RNG1: u32 = PWM_BASE + 0x10;
/// Channel 1 data.
pub const PWM_DAT1: u32 = PWM_BASE + 0x14;
/// FIFO input.
pub const PWM_FIF1: u32 = PWM_BASE + 0x18;

/// PWM clock ticks per serialized word, hence per sample.
pub const RANGE: u32 = 32;

/// `CTL` bits.
pub mod ctl {
    /// Enable channel 1.
    pub const PWEN1: u32 = 1;
    /// Serializer mode.
    pub const MODE1: u32 = 1 << 1;
    /// Take data from the FIFO.
    pub const USEF1: u32 = 1 << 5;
    /// Clear the FIFO.
    pub const CLRF1: u32 = 1 << 6;
}

/// `DMAC` bits.
pub mod dmac {
    /// Enable DREQ generation.
    pub const ENAB: u32 = 1 << 31;

    /// Panic threshold (bits 8-15).
    pub const fn panic(level: u32) -> u32 {
        (level & 0xFF) << 8
    }

    /// DREQ threshold (bits 0-7).
    pub const fn dreq(level: u32) -> u32 {
        level & 0xFF
    }
}

/// Clock divisor and range that pace DMA at a sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPlan {
    reference_hz: u32,
    sample_rate_hz: u32,
    divisor_raw: u32,
}

impl PacingPlan {
    /// Plan pacing at `sample_rate_hz` from a clock generator fed by
    /// `reference_hz`.
    ///
    /// The divisor is rounded to the nearest 1/4096.
    ///
    /// # Errors
    ///
    /// [`HardwareError::PacingOutOfRange`] when the divisor integer part
    /// falls outside 2..=4095.
    pub fn new(reference_hz: u32, sample_rate_hz: u32) -> Result<Self, HardwareError> {
        let out_of_range = HardwareError::PacingOutOfRange {
            sample_rate_hz,
            reference_hz,
        };
        let denominator = u64::from(sample_rate_hz) * u64::from(RANGE);
        if denominator == 0 {
            return Err(out_of_range);
        }
        let numerator = u64::from(reference_hz) << 12;
        let raw = (numerator + denominator / 2) / denominator;
        match u32::try_from(raw) {
            Ok(divisor_raw) if (2..=4095).contains(&(divisor_raw >> 12)) => Ok(Self {
                reference_hz,
                sample_rate_hz,
                divisor_raw,
            }),
            _ => Err(out_of_range),
        }
    }

    /// Raw 12.12 divisor for the PWM clock generator.
    pub const fn divisor_raw(&self) -> u32 {
        self.divisor_raw
    }

    /// Requested sample rate.
    pub const fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Sample rate the quantized divisor actually produces.
    #[allow(clippy::cast_precision_loss)] // Safety: both values < 2^32, f64 mantissa is 52 bits
    pub fn actual_sample_rate_hz(&self) -> f64 {
        f64::from(self.reference_hz) * 4096.0 / (f64::from(self.divisor_raw) * f64::from(RANGE))
    }

    /// Start the PWM clock and enable DREQ generation.
    pub fn configure<B: RegisterBus + ?Sized>(&self, bus: &mut B, source: ClockSource) {
        bus.write_register(PWM_CTL, 0);
        ClockGenerator::PWM.start(bus, source, 1, self.divisor_raw);
        bus.write_register(PWM_RNG1, RANGE);
        bus.write_register(PWM_DMAC, dmac::ENAB | dmac::panic(7) | dmac::dreq(7));
        bus.write_register(PWM_CTL, ctl::CLRF1);
        bus.write_register(PWM_CTL, ctl::USEF1 | ctl::MODE1 | ctl::PWEN1);
        tracing::debug!(
            sample_rate_hz = self.sample_rate_hz,
            divisor_raw = self.divisor_raw,
            "PWM pacing configured"
        );
    }
}

/// Disable the PWM channel, its DMA requests and its clock.
pub fn stop<B: RegisterBus + ?Sized>(bus: &mut B, source: ClockSource) {
    bus.write_register(PWM_CTL, 0);
    bus.write_register(PWM_DMAC, 0);
    ClockGenerator::PWM.stop(bus, source);
}

/// Bus address of the FIFO, the destination of every pacing block.
pub const fn fifo_bus_addr() -> BusAddr {
    peripheral_bus_addr(PWM_FIF1)
}
