//! Transmission controller: the real-time fill-ahead loop.
//!
//! # State machine
//!
//! ```text
//!            run()                ring full            end of stream / stop / input error
//!   Idle ──────────▶ Priming ─────────────▶ Streaming ──────────────────────────────▶ Draining
//!    ▲                 │  │ end of stream                                                  │
//!    │                 │  └─────────────────────────────────────────────────────────────▶ │
//!    │                 │ priming deadline                                                  │
//!    │                 ▼                                                                   │
//!    │              Faulted ◀──────────── underrun limit / hardware error ─────────────────┤
//!    └─────────────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Faulted` is terminal: the controller refuses further sessions.
//!
//! # Loop
//!
//! While streaming, each pass observes the DMA cursor (one register read),
//! folds it into the ring, writes as many modulated samples as there are
//! free slots, and only then yields to the [`Pacer`]: on a full ring or a
//! starved feed. The ring's latency is the whole scheduling margin; a
//! missed deadline shows up as an underrun, never as a blocked write.
//!
//! Every slot the cursor has moved past is released back to the neutral
//! divisor in the same pass, so a cursor that outruns the writer plays the
//! center frequency. A cursor that stops moving for longer than the ring
//! lasts, or a channel whose `CS` reports it halted, faults the session.
//!
//! Whatever path leaves [`run`](TransmissionController::run), the hardware
//! is idled before it returns. [`RadioHardware`]'s `Drop` covers panics.

use std::fmt;
use std::time::{Duration, Instant};

use platform::{DmaChannel, DmaMemory, HardwareError, PacingPlan, RegisterBus};

use crate::carrier::CarrierConfig;
use crate::error::{ConfigError, FeedError, TransmitError};
use crate::feed::AudioFeed;
use crate::hardware::RadioHardware;
use crate::modulator::{Divisor, DivisorModulator};
use crate::pacing::{Pacer, SleepPacer, StopSignal, WaitReason};
use crate::ring::{allocate_ring, DescriptorRing, RingLayout};
use crate::settings::{DrainPolicy, TransmitterSettings};
use crate::underrun::{UnderrunMonitor, UnderrunVerdict};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No session; hardware idle.
    Idle,
    /// Filling the ring before the hardware starts.
    Priming,
    /// Hardware running, feed being pulled.
    Streaming,
    /// Feed no longer pulled; queued audio playing out or abandoned.
    Draining,
    /// A fatal error occurred. Terminal.
    Faulted,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Priming => "priming",
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Faulted => "faulted",
        })
    }
}

/// Outcome of a completed session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Audio samples written to the ring.
    pub audio_samples: u64,
    /// Neutral divisors written (priming pad, underrun recovery, flush).
    pub neutral_samples: u64,
    /// Slots the hardware was observed to consume.
    pub slots_consumed: u64,
    /// Underruns recovered from.
    pub underruns: u32,
    /// The session ended on a [`StopSignal`].
    pub stopped: bool,
    /// Wall time from `run` to hardware idle.
    pub elapsed: Duration,
}

/// Modulated samples waiting for free slots.
#[derive(Debug, Default)]
struct Backlog {
    divisors: Vec<Divisor>,
    next: usize,
}

impl Backlog {
    fn is_empty(&self) -> bool {
        self.next >= self.divisors.len()
    }

    fn peek(&self) -> Option<Divisor> {
        self.divisors.get(self.next).copied()
    }

    fn consume(&mut self) {
        self.next += 1;
        if self.is_empty() {
            self.divisors.clear();
            self.next = 0;
        }
    }
}

/// When the DMA cursor last moved.
#[derive(Debug, Clone, Copy)]
struct Watchdog {
    last_progress: Instant,
    limit: Duration,
}

impl Watchdog {
    fn new(now: Instant, limit: Duration) -> Self {
        Self {
            last_progress: now,
            limit,
        }
    }

    fn progressed(&mut self, now: Instant) {
        self.last_progress = now;
    }

    /// Time without progress once it exceeds the limit.
    fn overdue(&self, now: Instant) -> Option<Duration> {
        let idle = now.saturating_duration_since(self.last_progress);
        (idle > self.limit).then_some(idle)
    }
}

/// Sole owner of the transmitter hardware; runs sessions one at a time.
pub struct TransmissionController<B: RegisterBus, M: DmaMemory, P: Pacer = SleepPacer> {
    hardware: RadioHardware<B, M>,
    modulator: DivisorModulator,
    settings: TransmitterSettings,
    pacing: PacingPlan,
    layout: RingLayout,
    ring_duration: Duration,
    pacer: P,
    state: ControllerState,
}

impl<B: RegisterBus, M: DmaMemory> TransmissionController<B, M, SleepPacer> {
    /// Controller that sleeps for the configured poll interval when idle.
    ///
    /// # Errors
    ///
    /// As [`with_pacer`][Self::with_pacer].
    pub fn new(
        hardware: RadioHardware<B, M>,
        config: CarrierConfig,
        settings: TransmitterSettings,
    ) -> Result<Self, TransmitError> {
        let pacer = SleepPacer::new(settings.poll_interval());
        Self::with_pacer(hardware, config, settings, pacer)
    }
}

impl<B: RegisterBus, M: DmaMemory, P: Pacer> TransmissionController<B, M, P> {
    /// Validate everything that can be validated before touching hardware.
    ///
    /// # Errors
    ///
    /// - [`TransmitError::Config`] for an invalid carrier or settings,
    ///   including a poll interval that is not under half of the ring's
    ///   actual duration at this sample rate
    /// - [`TransmitError::Hardware`] when PWM pacing cannot reach the sample
    ///   rate
    pub fn with_pacer(
        hardware: RadioHardware<B, M>,
        config: CarrierConfig,
        settings: TransmitterSettings,
        pacer: P,
    ) -> Result<Self, TransmitError> {
        settings.validate()?;
        let modulator = DivisorModulator::new(config)?;
        let sample_rate_hz = config.sample_rate_hz();
        let layout = RingLayout::new(settings.ring_capacity(sample_rate_hz));
        let ring_duration = settings.ring_duration(sample_rate_hz);
        if settings.poll_interval().saturating_mul(2) >= ring_duration {
            return Err(ConfigError::InvalidSetting {
                name: "poll_interval_ms",
                reason: format!(
                    "{} slots at {sample_rate_hz} Hz last {} us, under two polls",
                    layout.capacity(),
                    ring_duration.as_micros()
                ),
            }
            .into());
        }
        let pacing = PacingPlan::new(config.reference_clock_hz(), sample_rate_hz)?;
        tracing::debug!(
            capacity = layout.capacity(),
            ring_us = u64::try_from(ring_duration.as_micros()).unwrap_or(u64::MAX),
            dma_bytes = layout.total_size(),
            pacing_divisor = pacing.divisor_raw(),
            "controller ready"
        );
        Ok(Self {
            hardware,
            modulator,
            settings,
            pacing,
            layout,
            ring_duration,
            pacer,
            state: ControllerState::Idle,
        })
    }

    /// Current state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Ring placement in DMA memory.
    pub fn layout(&self) -> &RingLayout {
        &self.layout
    }

    /// Hardware handle.
    pub fn hardware(&self) -> &RadioHardware<B, M> {
        &self.hardware
    }

    /// Modulator in use.
    pub fn modulator(&self) -> &DivisorModulator {
        &self.modulator
    }

    /// Pacer in use.
    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Run one session: prime, stream `feed` until it ends or `stop` trips,
    /// drain, idle the hardware.
    ///
    /// # Errors
    ///
    /// - [`TransmitError::Faulted`] when an earlier session faulted
    /// - [`TransmitError::PrimingTimeout`], [`TransmitError::UnderrunLimit`]
    ///   or [`TransmitError::Hardware`]: the controller becomes `Faulted`
    /// - [`TransmitError::Input`] / [`TransmitError::Modulation`]: queued
    ///   audio was drained first and the controller is `Idle` again
    pub fn run<F: AudioFeed + ?Sized>(
        &mut self,
        feed: &mut F,
        stop: &StopSignal,
    ) -> Result<SessionReport, TransmitError> {
        if self.state == ControllerState::Faulted {
            return Err(TransmitError::Faulted);
        }
        let expected = self.modulator.config().sample_rate_hz();
        if feed.sample_rate_hz() != expected {
            return Err(FeedError::SampleRateMismatch {
                source_name: "audio feed".into(),
                expected,
                found: feed.sample_rate_hz(),
            }
            .into());
        }

        let started = Instant::now();
        let mut report = SessionReport::default();
        let result = self.session(feed, stop, &mut report);
        self.hardware.safe_idle();
        report.elapsed = started.elapsed();

        match result {
            Ok(()) => {
                self.transition(ControllerState::Idle);
                tracing::info!(
                    audio_samples = report.audio_samples,
                    neutral_samples = report.neutral_samples,
                    underruns = report.underruns,
                    stopped = report.stopped,
                    elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
                    "session complete"
                );
                Ok(report)
            }
            Err(err) if err.is_input() => {
                self.transition(ControllerState::Idle);
                tracing::error!(error = %err, "session ended by input error");
                Err(err)
            }
            Err(err) => {
                self.transition(ControllerState::Faulted);
                tracing::error!(error = %err, "session faulted");
                Err(err)
            }
        }
    }

    fn transition(&mut self, next: ControllerState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "controller state");
            self.state = next;
        }
    }

    fn session<F: AudioFeed + ?Sized>(
        &mut self,
        feed: &mut F,
        stop: &StopSignal,
        report: &mut SessionReport,
    ) -> Result<(), TransmitError> {
        let neutral = self.modulator.neutral();
        let mut ring = allocate_ring(self.layout.capacity(), neutral)?;
        let mut backlog = Backlog::default();
        let mut input_error = None;

        // ── Priming ──────────────────────────────────────────────────────────
        self.transition(ControllerState::Priming);
        let timeout = self.settings.priming_timeout();
        let deadline = Instant::now() + timeout;
        let mut ended = false;
        while !ring.is_full() {
            if stop.is_tripped() {
                report.stopped = true;
                return Ok(());
            }
            if backlog.is_empty() && !ended {
                match self.pull(feed, &mut backlog) {
                    Ok(end_of_stream) => ended = end_of_stream,
                    Err(err) => {
                        input_error = Some(err);
                        ended = true;
                    }
                }
                if backlog.is_empty() && !ended {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TransmitError::PrimingTimeout(timeout));
                    }
                    let wait = self.settings.poll_interval().min(deadline - now);
                    self.pacer.pause(WaitReason::Starved, wait);
                    continue;
                }
            }
            while let Some(divisor) = backlog.peek() {
                if !ring.write_next(divisor) {
                    break;
                }
                backlog.consume();
                report.audio_samples += 1;
            }
            if ended && backlog.is_empty() {
                while ring.write_next(neutral) {
                    report.neutral_samples += 1;
                }
            }
        }

        let first = self.hardware.load_ring(&ring, &self.layout)?;
        self.hardware.start(first, &self.pacing, neutral);

        // ── Streaming ────────────────────────────────────────────────────────
        let mut monitor = UnderrunMonitor::new(self.settings.max_underruns, self.settings.underrun_window());
        let mut watchdog = Watchdog::new(Instant::now(), self.ring_duration);
        if !(ended && backlog.is_empty()) {
            self.transition(ControllerState::Streaming);
        }
        while !(ended && backlog.is_empty()) {
            if stop.is_tripped() {
                report.stopped = true;
                break;
            }
            self.observe(&mut ring, &mut monitor, &mut watchdog, report)?;

            let mut starved = false;
            while !ring.is_full() {
                if backlog.is_empty() {
                    if ended {
                        break;
                    }
                    match self.pull(feed, &mut backlog) {
                        Ok(end_of_stream) => ended = end_of_stream,
                        Err(err) => {
                            input_error = Some(err);
                            ended = true;
                        }
                    }
                    if backlog.is_empty() {
                        starved = !ended;
                        break;
                    }
                }
                let Some(divisor) = backlog.peek() else {
                    break;
                };
                self.push(&mut ring, divisor)?;
                backlog.consume();
                report.audio_samples += 1;
            }

            if ended && backlog.is_empty() {
                break;
            }
            let reason = if starved {
                WaitReason::Starved
            } else {
                WaitReason::RingFull
            };
            self.pacer.pause(reason, self.settings.poll_interval());
        }

        // ── Draining ─────────────────────────────────────────────────────────
        self.transition(ControllerState::Draining);
        if self.settings.drain_policy == DrainPolicy::Flush {
            self.flush(&mut ring, &mut monitor, &mut watchdog, report)?;
        }

        match input_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Pull one block and modulate it into the backlog; `true` at end of
    /// stream.
    fn pull<F: AudioFeed + ?Sized>(
        &mut self,
        feed: &mut F,
        backlog: &mut Backlog,
    ) -> Result<bool, TransmitError> {
        let block = feed.pull_block(self.settings.block_size)?;
        self.modulator.modulate_block(&block.samples, &mut backlog.divisors)?;
        Ok(block.end_of_stream)
    }

    /// Write one divisor to the ring and its DMA data word.
    fn push(&mut self, ring: &mut DescriptorRing, divisor: Divisor) -> Result<bool, TransmitError> {
        let slot = ring.write_slot();
        if !ring.write_next(divisor) {
            return Ok(false);
        }
        self.hardware.store(&self.layout, slot, divisor)?;
        Ok(true)
    }

    /// Fill every free slot with the neutral divisor.
    fn fill_neutral(&mut self, ring: &mut DescriptorRing, report: &mut SessionReport) -> Result<(), TransmitError> {
        let neutral = self.modulator.neutral();
        while self.push(ring, neutral)? {
            report.neutral_samples += 1;
        }
        Ok(())
    }

    /// Fold the hardware cursor into the ring, release the slots it moved
    /// past and handle an underrun.
    fn observe(
        &mut self,
        ring: &mut DescriptorRing,
        monitor: &mut UnderrunMonitor,
        watchdog: &mut Watchdog,
        report: &mut SessionReport,
    ) -> Result<(), TransmitError> {
        let now = Instant::now();
        let Some(slot) = self.hardware.observe_slot(&self.layout) else {
            tracing::trace!("DMA cursor outside ring");
            return self.check_progress(watchdog, now);
        };
        let from = ring.read_cursor();
        let advance = ring.observe(slot);
        if advance == 0 {
            return self.check_progress(watchdog, now);
        }
        watchdog.progressed(now);
        report.slots_consumed += advance;

        let neutral = self.modulator.neutral();
        for cursor in from..from.saturating_add(advance) {
            if let Some(played) = ring.release(cursor, neutral) {
                self.hardware.store(&self.layout, played, neutral)?;
            }
        }

        if !ring.is_underrun() {
            return Ok(());
        }
        match monitor.record(Instant::now()) {
            UnderrunVerdict::Recover { recent } => {
                report.underruns = report.underruns.saturating_add(1);
                tracing::warn!(
                    recent,
                    slot,
                    "underrun: holding carrier at center frequency"
                );
                ring.resync();
                self.fill_neutral(ring, report)
            }
            UnderrunVerdict::Escalate { recent } => {
                tracing::error!(
                    recent,
                    window_ms = u64::try_from(monitor.window().as_millis()).unwrap_or(u64::MAX),
                    "underrun limit exceeded"
                );
                Err(TransmitError::UnderrunLimit {
                    count: recent,
                    window: monitor.window(),
                })
            }
        }
    }

    /// Fault when the channel halted or the cursor has been still for
    /// longer than the ring lasts.
    fn check_progress(&self, watchdog: &Watchdog, now: Instant) -> Result<(), TransmitError> {
        let channel = self.hardware.channel().index();
        let status = self.hardware.dma_status();
        if DmaChannel::is_halted(status) {
            return Err(HardwareError::DmaHalted { channel, status }.into());
        }
        if let Some(idle) = watchdog.overdue(now) {
            return Err(HardwareError::DmaStalled {
                channel,
                idle_ms: u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
            }
            .into());
        }
        Ok(())
    }

    /// Let queued audio play out, back-filling freed slots with neutral.
    fn flush(
        &mut self,
        ring: &mut DescriptorRing,
        monitor: &mut UnderrunMonitor,
        watchdog: &mut Watchdog,
        report: &mut SessionReport,
    ) -> Result<(), TransmitError> {
        let target = ring.write_cursor();
        let timeout = self.settings.drain_timeout();
        let deadline = Instant::now() + timeout;
        self.fill_neutral(ring, report)?;
        loop {
            self.observe(ring, monitor, watchdog, report)?;
            if ring.read_cursor() >= target {
                tracing::debug!("queued audio flushed");
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    remaining = target.saturating_sub(ring.read_cursor()),
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "drain deadline reached, abandoning queued audio"
                );
                return Ok(());
            }
            self.fill_neutral(ring, report)?;
            self.pacer.pause(WaitReason::Draining, self.settings.poll_interval().min(deadline - now));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::feed::MemoryFeed;
    use platform::dma::cs;
    use platform::mocks::{MockDmaMemory, MockRegisterBus};
    use platform::BusAddr;

    /// Pacer that never waits and never moves the DMA cursor.
    struct FrozenPacer;

    impl Pacer for FrozenPacer {
        fn pause(&mut self, _reason: WaitReason, _max: Duration) {}
    }

    /// Waits like the real pacer, but the DMA cursor never moves.
    struct StuckCursor;

    impl Pacer for StuckCursor {
        fn pause(&mut self, _reason: WaitReason, max: Duration) {
            std::thread::sleep(max);
        }
    }

    /// The channel drops out with `CS.ERROR` on the first pause.
    struct ChannelError {
        bus: MockRegisterBus,
    }

    impl Pacer for ChannelError {
        fn pause(&mut self, _reason: WaitReason, _max: Duration) {
            self.bus.set(DmaChannel::new(5).unwrap().cs_offset(), cs::ERROR);
        }
    }

    fn build<P: Pacer>(
        settings: TransmitterSettings,
        bus: &MockRegisterBus,
        pacer: P,
    ) -> Result<TransmissionController<MockRegisterBus, MockDmaMemory, P>, TransmitError> {
        let mem = MockDmaMemory::new(BusAddr::new(0xC000_0000), 1 << 20);
        let hw = RadioHardware::new(bus.clone(), mem, DmaChannel::new(5).unwrap());
        let config = CarrierConfig::new(100e6, 75e3, 500_000_000, 8_000).unwrap();
        TransmissionController::with_pacer(hw, config, settings, pacer)
    }

    fn controller(
        settings: TransmitterSettings,
    ) -> (TransmissionController<MockRegisterBus, MockDmaMemory, FrozenPacer>, MockRegisterBus) {
        let bus = MockRegisterBus::new();
        (build(settings, &bus, FrozenPacer).unwrap(), bus)
    }

    /// 64 slots at 8 kHz: an 8 ms ring.
    fn short_ring() -> TransmitterSettings {
        TransmitterSettings {
            ring_latency_ms: 8,
            ..TransmitterSettings::default()
        }
    }

    #[test]
    fn test_starts_idle() {
        let (c, bus) = controller(TransmitterSettings::default());
        assert_eq!(c.state(), ControllerState::Idle);
        assert_eq!(c.layout().capacity(), 320);
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn test_rejects_feed_at_other_rate() {
        let (mut c, bus) = controller(TransmitterSettings::default());
        let mut feed = MemoryFeed::new(vec![0.0; 16], 48_000);
        let err = c.run(&mut feed, &StopSignal::new()).unwrap_err();
        assert!(matches!(err, TransmitError::Input(FeedError::SampleRateMismatch { .. })));
        assert_eq!(c.state(), ControllerState::Idle);
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn test_stop_before_start_touches_nothing() {
        let (mut c, bus) = controller(TransmitterSettings::default());
        let stop = StopSignal::new();
        stop.trip();
        let mut feed = MemoryFeed::new(vec![0.0; 4096], 8_000);
        let report = c.run(&mut feed, &stop).unwrap();
        assert!(report.stopped);
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn test_short_feed_pads_and_abandons() {
        let settings = TransmitterSettings {
            drain_policy: DrainPolicy::Abandon,
            ..TransmitterSettings::default()
        };
        let (mut c, bus) = controller(settings);
        let mut feed = MemoryFeed::new(vec![0.5; 10], 8_000);
        let report = c.run(&mut feed, &StopSignal::new()).unwrap();
        assert_eq!(report.audio_samples, 10);
        assert_eq!(report.neutral_samples, 310);
        assert_eq!(c.state(), ControllerState::Idle);
        assert_eq!(bus.idle_reset_count(), 1);
    }

    #[test]
    fn test_faulted_controller_refuses_sessions() {
        let (mut c, _) = controller(TransmitterSettings::default());
        c.state = ControllerState::Faulted;
        let mut feed = MemoryFeed::new(vec![0.0; 4], 8_000);
        assert!(matches!(
            c.run(&mut feed, &StopSignal::new()),
            Err(TransmitError::Faulted)
        ));
    }

    #[test]
    fn test_ring_capped_below_two_polls_is_rejected() {
        // Passes the latency check, but 65536 slots at 8 kHz last 8.192 s.
        let settings = TransmitterSettings {
            ring_latency_ms: 20_000,
            poll_interval_ms: 5_000,
            ..TransmitterSettings::default()
        };
        settings.validate().unwrap();
        let bus = MockRegisterBus::new();
        let err = build(settings, &bus, FrozenPacer).err().unwrap();
        assert!(matches!(
            err,
            TransmitError::Config(ConfigError::InvalidSetting { name: "poll_interval_ms", .. })
        ));
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn test_stuck_cursor_faults_the_session() {
        let bus = MockRegisterBus::new();
        let mut c = build(short_ring(), &bus, StuckCursor).unwrap();
        let mut feed = MemoryFeed::new(vec![0.2; 8_000], 8_000);

        let err = c.run(&mut feed, &StopSignal::new()).unwrap_err();

        assert!(matches!(
            err,
            TransmitError::Hardware(HardwareError::DmaStalled { channel: 5, idle_ms }) if idle_ms >= 8
        ));
        assert!(err.is_fault());
        assert_eq!(c.state(), ControllerState::Faulted);
        assert!(!c.hardware().is_armed());
        assert_eq!(bus.idle_reset_count(), 1);
    }

    #[test]
    fn test_halted_channel_faults_the_session() {
        let bus = MockRegisterBus::new();
        let pacer = ChannelError { bus: bus.clone() };
        let mut c = build(short_ring(), &bus, pacer).unwrap();
        let mut feed = MemoryFeed::new(vec![0.2; 8_000], 8_000);

        let err = c.run(&mut feed, &StopSignal::new()).unwrap_err();

        assert!(matches!(
            err,
            TransmitError::Hardware(HardwareError::DmaHalted { channel: 5, status: cs::ERROR })
        ));
        assert_eq!(c.state(), ControllerState::Faulted);
        assert_eq!(bus.value(DmaChannel::new(5).unwrap().cs_offset()), cs::RESET);
        assert_eq!(bus.idle_reset_count(), 1);
    }

    #[test]
    fn test_watchdog_limit() {
        let t = Instant::now();
        let mut w = Watchdog::new(t, Duration::from_millis(8));
        assert_eq!(w.overdue(t + Duration::from_millis(8)), None);
        assert_eq!(
            w.overdue(t + Duration::from_millis(9)),
            Some(Duration::from_millis(9))
        );
        w.progressed(t + Duration::from_millis(9));
        assert_eq!(w.overdue(t + Duration::from_millis(10)), None);
    }

    #[test]
    fn test_backlog_consumes_in_order() {
        let mut b = Backlog::default();
        b.divisors.extend([Divisor::from_raw(1), Divisor::from_raw(2)]);
        assert_eq!(b.peek(), Some(Divisor::from_raw(1)));
        b.consume();
        assert_eq!(b.peek(), Some(Divisor::from_raw(2)));
        b.consume();
        assert!(b.is_empty());
        assert!(b.divisors.is_empty());
    }
}
