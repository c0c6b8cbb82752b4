//! Bounded waits and cancellation.
//!
//! The control loop never blocks indefinitely: whenever the ring is full or
//! the feed is starved it hands a deadline-bounded pause to a [`Pacer`], then
//! re-checks the [`StopSignal`] and the hardware cursor. Tests substitute a
//! pacer that advances a mock DMA cursor instead of sleeping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Why the loop is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Every slot is pending; waiting for the hardware to consume some.
    RingFull,
    /// The feed returned no samples.
    Starved,
    /// Waiting for queued audio to play out while draining.
    Draining,
}

/// Bounded-wait primitive used by the control loop.
pub trait Pacer {
    /// Wait at most `max`. May return early.
    fn pause(&mut self, reason: WaitReason, max: Duration);
}

/// Sleeps for the poll interval (or less when the deadline is closer).
#[derive(Debug, Clone, Copy)]
pub struct SleepPacer {
    poll_interval: Duration,
}

impl SleepPacer {
    /// Pacer polling every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Pacer for SleepPacer {
    fn pause(&mut self, _reason: WaitReason, max: Duration) {
        std::thread::sleep(self.poll_interval.min(max));
    }
}

impl<P: Pacer + ?Sized> Pacer for &mut P {
    fn pause(&mut self, reason: WaitReason, max: Duration) {
        (**self).pause(reason, max);
    }
}

/// Cancellation token shared between the control loop and whoever may stop
/// it (signal handler, another thread, a test).
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    tripped: Arc<AtomicBool>,
}

impl StopSignal {
    /// Untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent.
    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    /// `true` once [`trip`][Self::trip] has been called on any clone.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}
