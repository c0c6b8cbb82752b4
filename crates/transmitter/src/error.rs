//! Error taxonomy.
//!
//! | Type               | Raised by                     | Fatal? |
//! |--------------------|-------------------------------|--------|
//! | [`ConfigError`]    | config and settings validation| yes, before any hardware is touched |
//! | [`ModulationError`]| per-sample divisor mapping    | only under `SamplePolicy::Reject` |
//! | [`FeedError`]      | audio feeds                   | drains, then surfaces |
//! | [`TransmitError`]  | the controller                | hardware is idle before it is returned |
//!
//! Underruns are not errors: the controller absorbs them until more than
//! `max_underruns` land inside `underrun_window`, then reports
//! [`TransmitError::UnderrunLimit`].

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use platform::HardwareError;

/// Invalid carrier configuration or settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A frequency implies a divisor outside the representable 2..=4095 range.
    #[error("{frequency_hz:.0} Hz is out of reach of a {reference_hz} Hz reference (divisor {divisor:.3})")]
    DivisorOutOfRange {
        /// Frequency that cannot be synthesized.
        frequency_hz: f64,
        /// Reference clock in use.
        reference_hz: u32,
        /// Divisor it would need.
        divisor: f64,
    },

    /// Center frequency not positive and finite.
    #[error("invalid carrier frequency {0} Hz")]
    InvalidFrequency(f64),

    /// Deviation not in (0, center / 10].
    #[error("peak deviation {deviation_hz} Hz must be positive and at most a tenth of {center_hz} Hz")]
    InvalidDeviation {
        /// Requested deviation.
        deviation_hz: f64,
        /// Center frequency.
        center_hz: f64,
    },

    /// Sample rate of zero.
    #[error("sample rate must be non-zero")]
    InvalidSampleRate,

    /// Fractional bits outside 10..=12.
    #[error("fractional bits {0} outside 10..=12")]
    InvalidFractionalBits(u8),

    /// A session setting is out of range.
    #[error("invalid setting `{name}`: {reason}")]
    InvalidSetting {
        /// Setting name as it appears in the settings file.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The settings file could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    SettingsIo {
        /// Settings file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The settings file is not valid JSON for the settings schema.
    #[error("cannot parse settings file {}: {source}", path.display())]
    SettingsParse {
        /// Settings file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// A sample that cannot be turned into a divisor.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ModulationError {
    /// Sample outside [-1, 1] (or NaN) under `SamplePolicy::Reject`.
    #[error("sample {0} outside [-1, 1]")]
    SampleOutOfRange(f32),

    /// The instantaneous frequency needs a divisor outside 2..=4095.
    #[error("instantaneous frequency {0:.0} Hz not representable")]
    DivisorOutOfRange(f64),
}

/// Audio feed failure.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Reading the underlying stream failed.
    #[error("read error on {source_name}: {source}")]
    Io {
        /// File name or `<stdin>`.
        source_name: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The stream is not a WAV file this feed can play.
    #[error("{source_name}: {reason}")]
    Format {
        /// File name or `<stdin>`.
        source_name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A playlist entry has a different sample rate from the first entry.
    #[error("{source_name} is {found} Hz but the playlist runs at {expected} Hz")]
    SampleRateMismatch {
        /// Offending entry.
        source_name: String,
        /// Session sample rate.
        expected: u32,
        /// Rate of the offending entry.
        found: u32,
    },

    /// A playlist with no entries.
    #[error("playlist is empty")]
    EmptyPlaylist,
}

/// Failure of a transmission session.
///
/// Whenever one of these is returned from
/// [`TransmissionController::run`](crate::TransmissionController::run) the
/// clock, PWM, DMA and GPIO have already been restored to idle.
#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    /// Register mapping, DMA memory or pacing setup failed, or the DMA
    /// channel halted or stalled mid-session.
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Configuration rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The ring could not be filled before the priming deadline.
    #[error("ring not primed within {} ms", .0.as_millis())]
    PrimingTimeout(Duration),

    /// Too many underruns inside the window.
    #[error("{count} underruns within {} ms", .window.as_millis())]
    UnderrunLimit {
        /// Underruns counted inside the window.
        count: u32,
        /// Window length.
        window: Duration,
    },

    /// The audio feed failed; queued audio was drained first.
    #[error(transparent)]
    Input(#[from] FeedError),

    /// A sample was rejected by the modulator; queued audio was drained first.
    #[error(transparent)]
    Modulation(#[from] ModulationError),

    /// The controller faulted earlier and accepts no further sessions.
    #[error("controller is faulted")]
    Faulted,
}

impl TransmitError {
    /// `true` for the errors that leave the controller `Faulted`: everything
    /// except a failed input.
    pub fn is_fault(&self) -> bool {
        !self.is_input()
    }

    /// `true` when the audio input, not the hardware, ended the session.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input(_) | Self::Modulation(_))
    }
}
