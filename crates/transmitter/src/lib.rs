//! DMA-paced FM carrier modulation
//!
//! Turns normalized PCM into a frequency-modulated carrier on GPIO4 by
//! rewriting the fractional divisor of general-purpose clock 0 once per
//! sample. The rewrites are performed by a DMA channel walking a circular
//! ring of control blocks, paced by the PWM FIFO's DREQ, so the CPU only has
//! to keep the ring ahead of the hardware.
//!
//! # Pipeline
//!
//! ```text
//! AudioFeed ──▶ DivisorModulator ──▶ DescriptorRing ──▶ RadioHardware
//! (f32 PCM)     (sample → Divisor)    (fill-ahead)      (GPCLK0 / PWM / DMA)
//!                         ╲                 ▲
//!                          ╲                │ CONBLK_AD
//!                           TransmissionController
//! ```
//!
//! # Modules
//!
//! - [`carrier`] - carrier configuration and its band-edge validation
//! - [`modulator`] - sample to divisor mapping
//! - [`ring`] - descriptor ring model and its DMA memory layout
//! - [`hardware`] - peripheral bring-up and safe idle
//! - [`controller`] - the session state machine
//! - [`feed`] - audio inputs (memory, WAV, playlists, read-ahead)
//! - [`settings`] - tunables loaded from JSON
//!
//! # Example
//!
//! ```
//! use transmitter::{CarrierConfig, DivisorModulator};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CarrierConfig::new(100.0e6, 75.0e3, 500_000_000, 48_000)?;
//! let modulator = DivisorModulator::new(config)?;
//! let peak = modulator.modulate(1.0)?;
//! assert!(peak < modulator.neutral());
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::print_stdout)] // prefer tracing over println! in lib code
#![allow(clippy::module_name_repetitions)]

pub mod carrier;
pub mod controller;
pub mod error;
pub mod feed;
pub mod hardware;
pub mod modulator;
pub mod pacing;
pub mod ring;
pub mod settings;
pub mod underrun;

pub use carrier::{CarrierConfig, SamplePolicy};
pub use controller::{ControllerState, SessionReport, TransmissionController};
pub use error::{ConfigError, FeedError, ModulationError, TransmitError};
pub use feed::playlist::{FeedSource, Playlist};
pub use feed::prefetch::PrefetchFeed;
pub use feed::wav::WavFeed;
pub use feed::{AudioFeed, MemoryFeed, PcmBlock};
pub use hardware::RadioHardware;
pub use modulator::{Divisor, DivisorModulator};
pub use pacing::{Pacer, SleepPacer, StopSignal, WaitReason};
pub use ring::{allocate_ring, Descriptor, DescriptorRing, RingLayout};
pub use settings::{DrainPolicy, TransmitterSettings};
pub use underrun::{UnderrunMonitor, UnderrunVerdict};
