//! Register-level Hardware Abstraction Layer for the GPIO FM transmitter
//!
//! This crate owns every access to the Raspberry Pi peripheral window and to
//! DMA-visible memory. Nothing above it touches a raw pointer.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (fm-radio binary)
//!         ↓
//! Signal path (transmitter crate: modulator, descriptor ring, controller)
//!         ↓
//! Platform HAL (this crate - register maps, RegisterBus, DmaMemory)
//!         ↓
//! /dev/mem + /dev/vcio (BCM2835 / BCM2836 / BCM2837 / BCM2711)
//! ```
//!
//! # Abstraction Levels
//!
//! ## Access traits
//! - [`RegisterBus`] - volatile 32-bit register reads and writes
//! - [`DmaMemory`] - bus-addressable memory for DMA control blocks
//!
//! ## Peripheral register maps
//! - [`clock`] - general-purpose and PWM clock generators
//! - [`dma`] - DMA channel registers and control block layout
//! - [`pwm`] - PWM FIFO used as the DMA pacing source
//! - [`gpio`] - pin function select (GPCLK0 on GPIO4)
//!
//! ## Discovery
//! - [`revision`] - SoC revision, peripheral base and PLLD frequency
//!
//! # Features
//!
//! - `mock`: recording [`mocks::MockRegisterBus`] and heap-backed
//!   [`mocks::MockDmaMemory`] for host-side tests
//!
//! # Example
//!
//! ```no_run
//! use platform::{MappedRegisters, RegisterBus, SocRevision, PERIPHERAL_WINDOW_SIZE};
//!
//! # fn main() -> Result<(), platform::HardwareError> {
//! let soc = SocRevision::detect()?;
//! let mut regs = MappedRegisters::map_registers(soc.peripheral_base(), PERIPHERAL_WINDOW_SIZE)?;
//! let cs = regs.read_register(platform::dma::DmaChannel::new(5)?.cs_offset());
//! # let _ = cs;
//! regs.unmap_registers();
//! # Ok(())
//! # }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // hex addresses and register names in doc comments
#![allow(clippy::must_use_candidate)] // register accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod clock;
pub mod dma;
pub mod dma_memory;
pub mod error;
pub mod gpio;
pub mod mailbox;
pub mod mmap;
pub mod pwm;
pub mod registers;
pub mod revision;

#[cfg(any(test, feature = "mock"))]
pub mod mocks;

// Re-export main access traits
pub use dma_memory::{peripheral_bus_addr, BusAddr, DmaMemory, MailboxMemory};
pub use error::HardwareError;
pub use registers::RegisterBus;

// Re-export the mapping handle and discovery types
pub use mmap::MappedRegisters;
pub use revision::{SocRevision, PERIPHERAL_BUS_BASE, PERIPHERAL_WINDOW_SIZE};

// Re-export peripheral types
pub use clock::{ClockGenerator, ClockSource};
pub use dma::{ControlBlock, DmaChannel};
pub use gpio::GpioFunction;
pub use pwm::PacingPlan;
