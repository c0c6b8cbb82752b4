//! Peripheral sequencing for a transmission session.
//!
//! [`RadioHardware`] owns the register bus and the DMA memory for as long as
//! a controller lives. It knows the order in which the carrier clock, the
//! antenna pin, the PWM pacer and the DMA channel must be brought up and
//! torn down; it does not know about samples or sessions.
//!
//! # Idle state
//!
//! After [`safe_idle`][RadioHardware::safe_idle] the registers hold:
//!
//! | Register       | Value |
//! |----------------|-------|
//! | DMA `CS`       | `RESET` |
//! | PWM `CTL`      | 0 |
//! | PWM `DMAC`     | 0 |
//! | `PWMCTL`       | password, source, ENAB clear |
//! | `GP0CTL`       | password, source, ENAB clear |
//! | GPIO4 function | input |

use platform::{
    gpio, pwm, BusAddr, ClockGenerator, ClockSource, DmaChannel, DmaMemory, GpioFunction,
    HardwareError, PacingPlan, RegisterBus,
};

use crate::modulator::Divisor;
use crate::ring::{DescriptorRing, RingLayout};

/// MASH stages for the carrier clock. One stage keeps spurs lowest while
/// still honouring the fractional divisor.
pub const CARRIER_MASH_STAGES: u32 = 1;

/// Source of both the carrier and the pacing clock. Divisors are computed
/// against its frequency.
pub const CLOCK_SOURCE: ClockSource = ClockSource::PllD;

/// Register bus, DMA memory and channel of one transmitter.
pub struct RadioHardware<B: RegisterBus, M: DmaMemory> {
    bus: B,
    memory: M,
    channel: DmaChannel,
    armed: bool,
}

impl<B: RegisterBus, M: DmaMemory> RadioHardware<B, M> {
    /// Take ownership of the bus and memory. Nothing is written yet.
    pub fn new(bus: B, memory: M, channel: DmaChannel) -> Self {
        Self {
            bus,
            memory,
            channel,
            armed: false,
        }
    }

    /// Write the whole ring into DMA memory; returns the first block.
    ///
    /// # Errors
    ///
    /// [`HardwareError::DmaOutOfBounds`] when the memory is too small.
    pub fn load_ring(&mut self, ring: &DescriptorRing, layout: &RingLayout) -> Result<BusAddr, HardwareError> {
        layout.hand_off(ring, &mut self.memory)
    }

    /// Refresh the data word of one slot.
    ///
    /// # Errors
    ///
    /// [`HardwareError::DmaOutOfBounds`] for a slot outside the layout.
    pub fn store(&mut self, layout: &RingLayout, slot: usize, divisor: Divisor) -> Result<(), HardwareError> {
        self.memory.write_word(layout.data_offset(slot), divisor.register_word())
    }

    /// Bring the transmitter up: carrier clock on `initial`, GPIO4 to
    /// GPCLK0, PWM pacing, then the DMA loop from `first`.
    pub fn start(&mut self, first: BusAddr, pacing: &PacingPlan, initial: Divisor) {
        self.armed = true;
        ClockGenerator::GPCLK0.start(&mut self.bus, CLOCK_SOURCE, CARRIER_MASH_STAGES, initial.get());
        gpio::set_function(&mut self.bus, gpio::GPCLK0_PIN, GpioFunction::Alt0);
        pacing.configure(&mut self.bus, CLOCK_SOURCE);
        self.channel.start(&mut self.bus, first);
        tracing::info!(
            channel = self.channel.index(),
            sample_rate_hz = pacing.sample_rate_hz(),
            "carrier on"
        );
    }

    /// Slot the DMA engine is executing, from one read of `CONBLK_AD`.
    ///
    /// `None` when the address is outside the ring (channel reset or not
    /// started yet).
    pub fn observe_slot(&self, layout: &RingLayout) -> Option<usize> {
        let addr = self.channel.current_control_block(&self.bus);
        layout.slot_of_control_block(self.memory.bus_base(), addr)
    }

    /// Raw `CS` word of the DMA channel.
    pub fn dma_status(&self) -> u32 {
        self.channel.status(&self.bus)
    }

    /// DMA channel in use.
    pub fn channel(&self) -> DmaChannel {
        self.channel
    }

    /// Return every peripheral to its idle state.
    ///
    /// Idempotent: only the first call after [`start`][Self::start] touches
    /// the registers. Returns `true` when it did.
    pub fn safe_idle(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        self.channel.reset(&mut self.bus);
        pwm::stop(&mut self.bus, CLOCK_SOURCE);
        ClockGenerator::GPCLK0.stop(&mut self.bus, CLOCK_SOURCE);
        gpio::set_function(&mut self.bus, gpio::GPCLK0_PIN, GpioFunction::Input);
        self.armed = false;
        tracing::info!(channel = self.channel.index(), "carrier off, hardware idle");
        true
    }

    /// `true` between [`start`][Self::start] and [`safe_idle`][Self::safe_idle].
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Register bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// DMA memory.
    pub fn memory(&self) -> &M {
        &self.memory
    }
}

impl<B: RegisterBus, M: DmaMemory> Drop for RadioHardware<B, M> {
    fn drop(&mut self) {
        if self.safe_idle() {
            tracing::warn!("hardware was still running at drop");
        }
    }
}
