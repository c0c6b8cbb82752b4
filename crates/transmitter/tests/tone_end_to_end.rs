//! A one-second 1 kHz tone through the whole pipeline, recovered from the
//! divisors the simulated DMA engine would have loaded into `GP0DIV`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

mod common;

use std::f64::consts::TAU;

use common::{broadcast_config, raw_divisor, Rig, ToneFeed, REFERENCE_HZ};
use platform::clock::CM_GP0DIV;
use transmitter::modulator::divisor_to_frequency;
use transmitter::{ControllerState, Divisor, StopSignal, TransmitterSettings};

const SAMPLE_RATE: u32 = 48_000;
const CENTER_HZ: f64 = 100.0e6;
const DEVIATION_HZ: f64 = 75.0e3;

#[test]
fn test_one_khz_tone_round_trips_through_the_ring() {
    let settings = TransmitterSettings::default();
    let rig = Rig::new(&settings, SAMPLE_RATE);
    assert_eq!(rig.layout.capacity(), 1920);
    let mut sim = rig.sim(480);
    let mut feed = ToneFeed::new(1_000.0, 1.0, SAMPLE_RATE).limited(48_000);

    let mut controller = rig.controller(broadcast_config(SAMPLE_RATE), settings, &mut sim);
    let step_hz = controller.modulator().step_hz();
    let neutral = controller.modulator().neutral();
    let report = controller.run(&mut feed, &StopSignal::new()).unwrap();
    assert_eq!(controller.state(), ControllerState::Idle);
    drop(controller);

    assert_eq!(report.audio_samples, 48_000);
    assert_eq!(report.underruns, 0);
    assert!(sim.trace.len() >= 48_000);

    // The carrier is started on the neutral divisor before the ring runs.
    assert_eq!(raw_divisor(rig.bus.writes_to(CM_GP0DIV)[0]), neutral.get());

    let frequencies: Vec<f64> = sim.trace[..48_000]
        .iter()
        .map(|&raw| divisor_to_frequency(Divisor::from_raw(raw), REFERENCE_HZ))
        .collect();

    for (i, &f) in frequencies.iter().enumerate() {
        let t = i as f64 / f64::from(SAMPLE_RATE);
        let expected = CENTER_HZ + DEVIATION_HZ * (TAU * 1_000.0 * t).sin();
        assert!(
            (f - expected).abs() <= step_hz,
            "sample {i}: {f} Hz, expected {expected} Hz"
        );
    }

    let peak = frequencies.iter().copied().fold(f64::MIN, f64::max);
    let trough = frequencies.iter().copied().fold(f64::MAX, f64::min);
    assert!((peak - (CENTER_HZ + DEVIATION_HZ)).abs() <= step_hz);
    assert!((trough - (CENTER_HZ - DEVIATION_HZ)).abs() <= step_hz);
    let mean = frequencies.iter().sum::<f64>() / frequencies.len() as f64;
    assert!((mean - CENTER_HZ).abs() < step_hz / 2.0);

    // Flushed tail sits on the carrier.
    assert!(sim.trace[48_000..].iter().all(|&d| d == neutral.get()));
}
