//! Shared rig for controller integration tests: a mock peripheral window,
//! heap-backed DMA memory, and a pacer that plays the part of the DMA engine.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::io::{self, Cursor, Read};
use std::time::Duration;

use crossbeam::channel::Receiver;
use platform::mocks::{MockDmaMemory, MockRegisterBus};
use platform::{BusAddr, DmaChannel};
use transmitter::{
    AudioFeed, CarrierConfig, FeedError, Pacer, PcmBlock, RadioHardware, RingLayout, StopSignal,
    TransmissionController, TransmitterSettings, WaitReason,
};

pub const DMA_BASE: u32 = 0xC000_0000;
pub const REFERENCE_HZ: u32 = 500_000_000;

/// Strip the clock manager password from a data word.
pub fn raw_divisor(word: u32) -> u32 {
    word & 0x00FF_FFFF
}

/// Stands in for the DMA engine: every pause moves `CONBLK_AD` forward by
/// `step` slots and records the data word of each slot it lands on, which
/// is what the real engine would copy into `GP0DIV`.
pub struct DmaSim {
    bus: MockRegisterBus,
    memory: MockDmaMemory,
    channel: DmaChannel,
    layout: RingLayout,
    step: usize,
    position: u64,
    started: bool,
    idle_sleep: Option<Duration>,
    stop_after: Option<(usize, StopSignal)>,
    pub pauses: usize,
    pub reasons: Vec<WaitReason>,
    pub trace: Vec<u32>,
}

impl DmaSim {
    pub fn step(&self) -> usize {
        self.step
    }

    /// Sleep this long on pauses while the channel is not running.
    pub fn sleeping_when_idle(mut self, sleep: Duration) -> Self {
        self.idle_sleep = Some(sleep);
        self
    }

    /// Trip `stop` on the `pauses`-th pause.
    pub fn stopping_after(mut self, pauses: usize, stop: StopSignal) -> Self {
        self.stop_after = Some((pauses, stop));
        self
    }

    fn record(&mut self, slot: usize) {
        let word = self.memory.word(self.layout.data_offset(slot));
        self.trace.push(raw_divisor(word));
    }
}

impl Pacer for DmaSim {
    fn pause(&mut self, reason: WaitReason, max: Duration) {
        self.pauses += 1;
        self.reasons.push(reason);
        if let Some((after, stop)) = &self.stop_after {
            if self.pauses >= *after {
                stop.trip();
            }
        }
        if !self.channel.is_active(&self.bus) {
            if let Some(sleep) = self.idle_sleep {
                std::thread::sleep(sleep.min(max));
            }
            return;
        }
        let capacity = self.layout.capacity() as u64;
        if !self.started {
            self.started = true;
            self.record(0);
        }
        for _ in 0..self.step {
            self.position += 1;
            let slot = (self.position % capacity) as usize;
            self.record(slot);
        }
        let slot = (self.position % capacity) as usize;
        let addr = DMA_BASE + self.layout.control_block_offset(slot, 0) as u32;
        self.bus.set(self.channel.conblk_offset(), addr);
    }
}

pub struct Rig {
    pub bus: MockRegisterBus,
    pub memory: MockDmaMemory,
    pub channel: DmaChannel,
    pub layout: RingLayout,
}

impl Rig {
    pub fn new(settings: &TransmitterSettings, sample_rate_hz: u32) -> Self {
        let layout = RingLayout::new(settings.ring_capacity(sample_rate_hz));
        Self {
            bus: MockRegisterBus::new(),
            memory: MockDmaMemory::new(BusAddr::new(DMA_BASE), layout.total_size()),
            channel: DmaChannel::new(settings.dma_channel).unwrap(),
            layout,
        }
    }

    pub fn sim(&self, step: usize) -> DmaSim {
        assert!(step < self.layout.capacity(), "a full lap is invisible to the controller");
        DmaSim {
            bus: self.bus.clone(),
            memory: self.memory.clone(),
            channel: self.channel,
            layout: self.layout,
            step,
            position: 0,
            started: false,
            idle_sleep: None,
            stop_after: None,
            pauses: 0,
            reasons: Vec::new(),
            trace: Vec::new(),
        }
    }

    pub fn controller<'a>(
        &self,
        config: CarrierConfig,
        settings: TransmitterSettings,
        sim: &'a mut DmaSim,
    ) -> TransmissionController<MockRegisterBus, MockDmaMemory, &'a mut DmaSim> {
        let hardware = RadioHardware::new(self.bus.clone(), self.memory.clone(), self.channel);
        TransmissionController::with_pacer(hardware, config, settings, sim).unwrap()
    }
}

/// 100 MHz carrier, 75 kHz deviation.
pub fn broadcast_config(sample_rate_hz: u32) -> CarrierConfig {
    CarrierConfig::new(100.0e6, 75.0e3, REFERENCE_HZ, sample_rate_hz).unwrap()
}

/// Settings giving a 64-slot ring at 8 kHz.
pub fn small_ring_settings() -> TransmitterSettings {
    TransmitterSettings {
        ring_latency_ms: 8,
        ..TransmitterSettings::default()
    }
}

/// Sine generator, optionally bounded.
pub struct ToneFeed {
    frequency_hz: f64,
    amplitude: f64,
    sample_rate_hz: u32,
    produced: usize,
    limit: Option<usize>,
}

impl ToneFeed {
    pub fn new(frequency_hz: f64, amplitude: f64, sample_rate_hz: u32) -> Self {
        Self {
            frequency_hz,
            amplitude,
            sample_rate_hz,
            produced: 0,
            limit: None,
        }
    }

    pub fn limited(mut self, samples: usize) -> Self {
        self.limit = Some(samples);
        self
    }

    pub fn sample(&self, index: usize) -> f32 {
        let t = index as f64 / f64::from(self.sample_rate_hz);
        (self.amplitude * (TAU * self.frequency_hz * t).sin()) as f32
    }
}

impl AudioFeed for ToneFeed {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn pull_block(&mut self, max_samples: usize) -> Result<PcmBlock, FeedError> {
        let end = match self.limit {
            Some(limit) => limit.min(self.produced + max_samples),
            None => self.produced + max_samples,
        };
        let samples: Vec<f32> = (self.produced..end).map(|i| self.sample(i)).collect();
        self.produced = end;
        Ok(PcmBlock {
            samples,
            end_of_stream: self.limit == Some(end),
        })
    }
}

/// One scripted pull.
#[derive(Debug, Clone)]
pub enum Step {
    Samples(Vec<f32>),
    Starve,
    Fail,
}

/// Feed that replays a script, then either ends or starves forever.
pub struct ScriptedFeed {
    steps: VecDeque<Step>,
    sample_rate_hz: u32,
    starve_when_done: bool,
    pub pulls: usize,
}

impl ScriptedFeed {
    pub fn new(steps: Vec<Step>, sample_rate_hz: u32) -> Self {
        Self {
            steps: steps.into(),
            sample_rate_hz,
            starve_when_done: false,
            pulls: 0,
        }
    }

    pub fn starving(sample_rate_hz: u32) -> Self {
        Self {
            starve_when_done: true,
            ..Self::new(Vec::new(), sample_rate_hz)
        }
    }

    pub fn then_starve(mut self) -> Self {
        self.starve_when_done = true;
        self
    }
}

impl AudioFeed for ScriptedFeed {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn pull_block(&mut self, max_samples: usize) -> Result<PcmBlock, FeedError> {
        self.pulls += 1;
        match self.steps.pop_front() {
            Some(Step::Samples(mut samples)) => {
                if samples.len() > max_samples {
                    let rest = samples.split_off(max_samples);
                    self.steps.push_front(Step::Samples(rest));
                }
                Ok(PcmBlock {
                    samples,
                    end_of_stream: false,
                })
            }
            Some(Step::Starve) => Ok(PcmBlock::default()),
            Some(Step::Fail) => Err(FeedError::Io {
                source_name: "scripted".into(),
                source: io::Error::new(io::ErrorKind::UnexpectedEof, "pipe closed"),
            }),
            None if self.starve_when_done => Ok(PcmBlock::default()),
            None => Ok(PcmBlock::last(Vec::new())),
        }
    }
}

/// Streaming WAV header (unknown `data` size) for 16-bit mono at
/// `sample_rate_hz`, followed by `samples`.
pub fn pcm16_stream(sample_rate_hz: u32, samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&u32::MAX.to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate_hz.to_le_bytes());
    out.extend_from_slice(&(sample_rate_hz * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&transmitter::feed::wav::UNKNOWN_DATA_SIZE.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Pipe that hands out its bytes, then blocks until `release` is dropped
/// and reports end of file.
pub struct StalledPipe {
    bytes: Cursor<Vec<u8>>,
    release: Receiver<()>,
}

impl StalledPipe {
    pub fn new(bytes: Vec<u8>, release: Receiver<()>) -> Self {
        Self {
            bytes: Cursor::new(bytes),
            release,
        }
    }
}

impl Read for StalledPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.bytes.read(buf)?;
        if n == 0 && !buf.is_empty() {
            let _ = self.release.recv();
        }
        Ok(n)
    }
}
