//! Command line and the settings layering behind it.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use transmitter::{CarrierConfig, ConfigError, FeedSource, TransmitterSettings};

/// Broadcast WAV audio as FM from GPIO4.
#[derive(Parser, Debug)]
#[command(name = "fm-radio", author, version, about, long_about = None)]
pub struct Args {
    /// Carrier frequency in MHz
    #[arg(short, long, value_name = "MHz")]
    pub frequency: f64,

    /// Peak deviation in kHz
    #[arg(long, value_name = "kHz", default_value_t = 75.0)]
    pub deviation: f64,

    /// Reference clock in Hz (default: the board's PLLD)
    #[arg(long, value_name = "Hz")]
    pub reference_clock: Option<u32>,

    /// DMA channel driving the divisor updates
    #[arg(long, value_name = "0-15")]
    pub dma_channel: Option<u8>,

    /// Loop the playlist until stopped
    #[arg(long)]
    pub repeat: bool,

    /// JSON settings file; command line flags take precedence
    #[arg(long, value_name = "settings.json")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v=info, -vv=debug, -vvv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// WAV files to play in order; `-` reads a WAV stream from stdin
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<String>,
}

impl Args {
    /// Playlist entries in command line order.
    pub fn sources(&self) -> Vec<FeedSource> {
        self.files.iter().map(|f| FeedSource::from_arg(f)).collect()
    }

    /// Settings file (or defaults) with command line overrides applied.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when the file cannot be read or parsed, or the
    /// merged settings are invalid.
    pub fn settings(&self) -> Result<TransmitterSettings, ConfigError> {
        let mut settings = match &self.config {
            Some(path) => TransmitterSettings::load(path)?,
            None => TransmitterSettings::default(),
        };
        if let Some(channel) = self.dma_channel {
            settings.dma_channel = channel;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Carrier for a session at `sample_rate_hz`, using
    /// `board_reference_hz` unless `--reference-clock` overrides it.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for a carrier the clock generator cannot produce.
    pub fn carrier(
        &self,
        settings: &TransmitterSettings,
        board_reference_hz: u32,
        sample_rate_hz: u32,
    ) -> Result<CarrierConfig, ConfigError> {
        let reference = self.reference_clock.unwrap_or(board_reference_hz);
        CarrierConfig::new(
            self.frequency * 1e6,
            self.deviation * 1e3,
            reference,
            sample_rate_hz,
        )?
        .with_fractional_bits(settings.fractional_bits)
        .map(|c| c.with_sample_policy(settings.sample_policy))
    }

    /// Settings file path for log lines.
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}
