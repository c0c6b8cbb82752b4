//! Controller sessions against the mock peripheral window.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::{
    broadcast_config, pcm16_stream, small_ring_settings, Rig, ScriptedFeed, StalledPipe, Step,
    ToneFeed,
};
use crossbeam::channel::bounded;
use platform::clock::CM_GP0CTL;
use platform::dma::cs;
use platform::gpio;
use platform::pwm::{PWM_CTL, PWM_DMAC};
use platform::GpioFunction;
use transmitter::{
    ControllerState, DrainPolicy, FeedError, MemoryFeed, PrefetchFeed, StopSignal, TransmitError,
    TransmitterSettings, WavFeed,
};

fn assert_idle_registers(rig: &Rig) {
    assert_eq!(rig.bus.value(rig.channel.cs_offset()), cs::RESET);
    assert_eq!(rig.bus.value(PWM_CTL), 0);
    assert_eq!(rig.bus.value(PWM_DMAC), 0);
    assert_eq!(rig.bus.value(CM_GP0CTL), 0x5A00_0006);
    assert_eq!(gpio::function_bits(&rig.bus, 4), GpioFunction::Input.bits());
}

#[test]
fn test_stop_during_streaming_leaves_hardware_idle() {
    let settings = TransmitterSettings::default();
    let rig = Rig::new(&settings, 48_000);
    let stop = StopSignal::new();
    let mut sim = rig.sim(480).stopping_after(10, stop.clone());
    let mut feed = ToneFeed::new(1_000.0, 0.8, 48_000);

    let mut controller = rig.controller(broadcast_config(48_000), settings, &mut sim);
    let report = controller.run(&mut feed, &stop).unwrap();

    assert!(report.stopped);
    assert_eq!(report.underruns, 0);
    assert!(report.audio_samples > 1920);
    assert_eq!(controller.state(), ControllerState::Idle);
    assert!(!controller.hardware().is_armed());
    assert_idle_registers(&rig);
    assert_eq!(rig.bus.idle_reset_count(), 1);
}

#[test]
fn test_underruns_below_threshold_are_absorbed() {
    let settings = small_ring_settings();
    let rig = Rig::new(&settings, 8_000);
    assert_eq!(rig.layout.capacity(), 64);
    let mut sim = rig.sim(32);
    let mut feed = ScriptedFeed::new(
        vec![
            Step::Samples(vec![0.25; 200]),
            Step::Starve,
            Step::Starve,
            Step::Starve,
            Step::Samples(vec![-0.25; 200]),
        ],
        8_000,
    );

    let mut controller = rig.controller(broadcast_config(8_000), settings, &mut sim);
    let report = controller.run(&mut feed, &StopSignal::new()).unwrap();

    assert!(report.underruns >= 1);
    assert!(report.underruns <= 8);
    assert_eq!(report.audio_samples, 400);
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(rig.bus.idle_reset_count(), 1);
}

#[test]
fn test_underrun_recovery_holds_center_frequency() {
    // 32 divides the ring; 40 makes the cursor land mid-ring after a lap.
    for step in [32, 40] {
        let settings = small_ring_settings();
        let rig = Rig::new(&settings, 8_000);
        let mut sim = rig.sim(step);
        let mut feed = ScriptedFeed::new(
            vec![Step::Samples(vec![1.0; 64]), Step::Starve, Step::Starve, Step::Starve],
            8_000,
        );

        let mut controller = rig.controller(broadcast_config(8_000), settings, &mut sim);
        let neutral = controller.modulator().neutral().get();
        let peak = controller.modulator().modulate(1.0).unwrap().get();
        let report = controller.run(&mut feed, &StopSignal::new()).unwrap();
        drop(controller);

        assert!(report.underruns >= 1, "step {step}");
        // Each audio sample is played exactly once, then only center.
        assert!(sim.trace.len() > 64, "step {step}");
        assert!(sim.trace[..64].iter().all(|&d| d == peak), "step {step}");
        assert!(sim.trace[64..].iter().all(|&d| d == neutral), "step {step}: {:?}", &sim.trace[64..]);
    }
}

#[test]
fn test_underrun_limit_faults_and_resets_once() {
    let settings = TransmitterSettings {
        max_underruns: 3,
        ..small_ring_settings()
    };
    let rig = Rig::new(&settings, 8_000);
    let mut sim = rig.sim(32);
    let mut feed = ScriptedFeed::new(vec![Step::Samples(vec![0.5; 64])], 8_000).then_starve();

    let mut controller = rig.controller(broadcast_config(8_000), settings, &mut sim);
    let err = controller.run(&mut feed, &StopSignal::new()).unwrap_err();

    assert!(matches!(err, TransmitError::UnderrunLimit { count: 4, .. }));
    assert!(err.is_fault());
    assert_eq!(controller.state(), ControllerState::Faulted);
    assert_idle_registers(&rig);
    assert_eq!(rig.bus.idle_reset_count(), 1);

    // Terminal: a second session is refused without touching registers.
    let writes = rig.bus.write_count();
    let mut again = MemoryFeed::new(vec![0.0; 256], 8_000);
    assert!(matches!(
        controller.run(&mut again, &StopSignal::new()),
        Err(TransmitError::Faulted)
    ));
    drop(controller);
    assert_eq!(rig.bus.write_count(), writes);
    assert_eq!(rig.bus.idle_reset_count(), 1);
}

#[test]
fn test_priming_timeout_never_starts_hardware() {
    let settings = TransmitterSettings {
        priming_timeout_ms: 20,
        ..small_ring_settings()
    };
    let rig = Rig::new(&settings, 8_000);
    let mut sim = rig.sim(32).sleeping_when_idle(Duration::from_millis(1));
    let mut feed = ScriptedFeed::starving(8_000);

    let mut controller = rig.controller(broadcast_config(8_000), settings, &mut sim);
    let err = controller.run(&mut feed, &StopSignal::new()).unwrap_err();

    assert!(matches!(err, TransmitError::PrimingTimeout(t) if t == Duration::from_millis(20)));
    assert_eq!(controller.state(), ControllerState::Faulted);
    drop(controller);
    assert_eq!(rig.bus.write_count(), 0);
    assert!(sim.pauses > 0);
}

#[test]
fn test_input_error_drains_then_surfaces() {
    let settings = small_ring_settings();
    let rig = Rig::new(&settings, 8_000);
    let mut sim = rig.sim(32);
    let mut feed = ScriptedFeed::new(vec![Step::Samples(vec![0.1; 100]), Step::Fail], 8_000);

    let mut controller = rig.controller(broadcast_config(8_000), settings, &mut sim);
    let err = controller.run(&mut feed, &StopSignal::new()).unwrap_err();

    assert!(matches!(err, TransmitError::Input(FeedError::Io { .. })));
    assert!(err.is_input());
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_idle_registers(&rig);

    // Not a fault: the next session runs.
    let mut next = MemoryFeed::new(vec![0.0; 500], 8_000);
    let report = controller.run(&mut next, &StopSignal::new()).unwrap();
    assert_eq!(report.audio_samples, 500);
    drop(controller);
    assert_eq!(rig.bus.idle_reset_count(), 2);

    // The 100 samples before the failure all reached the hardware.
    assert!(leading_audio(&sim.trace) >= 100);
}

/// Entries before the first one equal to the final (neutral) divisor.
fn leading_audio(trace: &[u32]) -> usize {
    let neutral = *trace.last().unwrap();
    trace.iter().position(|&d| d == neutral).unwrap_or(trace.len())
}

#[test]
fn test_end_of_stream_during_priming_pads_with_neutral() {
    let settings = small_ring_settings();
    let rig = Rig::new(&settings, 8_000);
    let mut sim = rig.sim(16);
    let mut feed = MemoryFeed::new(vec![0.9; 10], 8_000);

    let mut controller = rig.controller(broadcast_config(8_000), settings, &mut sim);
    let neutral = controller.modulator().neutral().get();
    let loud = controller.modulator().modulate(0.9).unwrap().get();
    let report = controller.run(&mut feed, &StopSignal::new()).unwrap();
    drop(controller);

    assert_eq!(report.audio_samples, 10);
    assert!(report.neutral_samples >= 54);
    assert!(!sim.reasons.contains(&transmitter::WaitReason::RingFull));
    assert_eq!(&sim.trace[..10], &[loud; 10]);
    assert!(sim.trace[10..].iter().all(|&d| d == neutral));
}

#[test]
fn test_abandon_skips_flush() {
    let settings = TransmitterSettings {
        drain_policy: DrainPolicy::Abandon,
        ..small_ring_settings()
    };
    let rig = Rig::new(&settings, 8_000);
    let mut sim = rig.sim(16);
    let mut feed = MemoryFeed::new(vec![0.3; 32], 8_000);

    let mut controller = rig.controller(broadcast_config(8_000), settings, &mut sim);
    let report = controller.run(&mut feed, &StopSignal::new()).unwrap();
    drop(controller);

    assert_eq!(report.slots_consumed, 0);
    assert_eq!(sim.pauses, 0);
    assert_idle_registers(&rig);
}

#[test]
fn test_stop_is_honoured_while_the_source_is_blocked() {
    let settings = TransmitterSettings {
        drain_policy: DrainPolicy::Abandon,
        max_underruns: u32::MAX,
        ..small_ring_settings()
    };
    let rig = Rig::new(&settings, 8_000);
    let mut sim = rig.sim(16);

    // 256 samples arrive, then the pipe goes quiet without closing.
    let (hold, release) = bounded::<()>(1);
    let pipe = StalledPipe::new(pcm16_stream(8_000, &[4_096; 256]), release);
    let wav = WavFeed::new(pipe, "<pipe>".into()).unwrap();
    let mut feed = PrefetchFeed::spawn(wav, "<pipe>".into(), settings.poll_interval()).unwrap();

    let stop = StopSignal::new();
    let tripper = {
        let stop = stop.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let at = Instant::now();
            stop.trip();
            at
        })
    };

    let mut controller = rig.controller(broadcast_config(8_000), settings, &mut sim);
    let report = controller.run(&mut feed, &stop).unwrap();
    let returned = Instant::now();
    let tripped = tripper.join().unwrap();

    assert!(report.stopped);
    assert_eq!(report.audio_samples, 256);
    assert!(report.underruns >= 1);
    assert!(returned.duration_since(tripped) < Duration::from_secs(1));
    assert_eq!(controller.state(), ControllerState::Idle);
    drop(controller);
    assert_idle_registers(&rig);
    drop(hold);
}
