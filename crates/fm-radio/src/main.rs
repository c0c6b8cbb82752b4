//! `fm-radio`: broadcast WAV audio as FM from GPIO4.
//!
//! # Usage Examples
//!
//! ```bash
//! sudo fm-radio -f 100.1 song.wav
//! sudo fm-radio -f 100.1 --repeat intro.wav loop.wav
//! sox input.mp3 -r 48000 -c 1 -t wav - | sudo fm-radio -f 100.1 -
//! sudo fm-radio -vv -f 88.5 --deviation 50 --config radio.json song.wav
//! ```
//!
//! Needs root: the peripheral window is mapped from `/dev/mem` and the DMA
//! memory is allocated through `/dev/vcio`.

// Binary crate: nothing here is public API.
#![allow(missing_docs)]

mod cli;
mod exit;
mod signals;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use platform::{DmaChannel, MailboxMemory, MappedRegisters, SocRevision, PERIPHERAL_WINDOW_SIZE};
use tracing_subscriber::EnvFilter;
use transmitter::{
    AudioFeed, Playlist, PrefetchFeed, RadioHardware, RingLayout, SessionReport, StopSignal,
    TransmissionController,
};

use cli::Args;
use exit::Outcome;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(Outcome::Config.code())
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing(args.verbose);

    match run(&args) {
        Ok(report) => {
            tracing::info!(
                audio_samples = report.audio_samples,
                underruns = report.underruns,
                stopped = report.stopped,
                "transmission finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            let outcome = Outcome::of(&err);
            tracing::debug!(exit_code = outcome.code(), "exiting with error");
            eprintln!("fm-radio: {err:#}");
            outcome.into()
        }
    }
}

/// 0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE; `RUST_LOG` wins when set.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(args: &Args) -> anyhow::Result<SessionReport> {
    // Everything that can be rejected is rejected before /dev/mem is opened.
    let settings = args.settings().with_context(|| match args.config_path() {
        Some(path) => format!("loading settings from {}", path.display()),
        None => "validating settings".to_owned(),
    })?;
    let playlist = Playlist::new(args.sources(), args.repeat).context("opening playlist")?;
    let sample_rate_hz = playlist.sample_rate_hz();

    let soc = SocRevision::detect().context("identifying the board")?;
    let carrier = args
        .carrier(&settings, soc.plld_hz(), sample_rate_hz)
        .context("configuring the carrier")?;
    tracing::info!(
        soc = %soc,
        center_hz = carrier.center_frequency_hz(),
        deviation_hz = carrier.peak_deviation_hz(),
        reference_hz = carrier.reference_clock_hz(),
        sample_rate_hz,
        "carrier configured"
    );

    let channel = DmaChannel::new(settings.dma_channel)?;
    let layout = RingLayout::new(settings.ring_capacity(sample_rate_hz));
    let registers = MappedRegisters::map_registers(soc.peripheral_base(), PERIPHERAL_WINDOW_SIZE)
        .context("mapping the peripheral window (are you root?)")?;
    let memory = MailboxMemory::allocate(soc, layout.total_size()).context("allocating DMA memory")?;
    let hardware = RadioHardware::new(registers, memory, channel);
    let read_wait = settings.poll_interval();
    let mut controller = TransmissionController::new(hardware, carrier, settings)?;

    let stop = StopSignal::new();
    signals::watch(stop.clone())?;

    // Reads happen on their own thread so a stalled pipe cannot hold off a stop.
    let mut feed = PrefetchFeed::spawn(playlist, "playlist".into(), read_wait)
        .context("starting the reader thread")?;
    let report = controller.run(&mut feed, &stop).context("transmitting")?;
    Ok(report)
}
