//! Session settings.
//!
//! Everything about a session except the carrier frequencies: latency, polling,
//! deadlines, underrun tolerance and divisor policy. All fields have defaults so a settings
//! file only needs the keys it changes:
//!
//! ```json
//! { "ring_latency_ms": 60, "drain_policy": "abandon" }
//! ```
//!
//! | Key                  | Default | Meaning |
//! |----------------------|---------|---------|
//! | `ring_latency_ms`    | 40      | audio queued ahead of the hardware |
//! | `poll_interval_ms`   | 2       | longest single wait of the control loop, under half the ring |
//! | `priming_timeout_ms` | 2000    | deadline for filling the ring before start |
//! | `max_underruns`      | 8       | underruns tolerated per window |
//! | `underrun_window_ms` | 5000    | sliding window for `max_underruns` |
//! | `drain_policy`       | `flush` | `flush` plays queued audio out, `abandon` stops at once |
//! | `drain_timeout_ms`   | 500     | upper bound on a flush |
//! | `block_size`         | 1024    | samples pulled from the feed per call |
//! | `dma_channel`        | 5       | DMA channel driving the ring |
//! | `fractional_bits`    | 12      | divisor precision (10-12) |
//! | `sample_policy`      | `clamp` | `clamp` or `reject` samples outside [-1, 1] |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::carrier::{SamplePolicy, DEFAULT_FRACTIONAL_BITS, MIN_FRACTIONAL_BITS};
use crate::error::ConfigError;

/// Smallest ring, whatever the latency.
pub const MIN_RING_CAPACITY: usize = 64;
/// Largest ring, whatever the latency.
pub const MAX_RING_CAPACITY: usize = 65_536;

/// What happens to queued audio when a session stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainPolicy {
    /// Let queued audio play out, back-filling with the neutral divisor.
    #[default]
    Flush,
    /// Stop the hardware immediately.
    Abandon,
}

/// Tunables of a transmission session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransmitterSettings {
    /// Audio queued ahead of the hardware, in milliseconds.
    pub ring_latency_ms: u32,
    /// Longest single wait of the control loop, in milliseconds.
    pub poll_interval_ms: u32,
    /// Deadline for filling the ring before the hardware starts.
    pub priming_timeout_ms: u32,
    /// Underruns tolerated inside one window.
    pub max_underruns: u32,
    /// Sliding window for `max_underruns`, in milliseconds.
    pub underrun_window_ms: u32,
    /// Queued-audio handling on stop.
    pub drain_policy: DrainPolicy,
    /// Upper bound on a flush, in milliseconds.
    pub drain_timeout_ms: u32,
    /// Samples requested from the feed per pull.
    pub block_size: usize,
    /// DMA channel (0-15).
    pub dma_channel: u8,
    /// Divisor precision applied to the carrier.
    pub fractional_bits: u8,
    /// Out-of-range sample policy applied to the carrier.
    pub sample_policy: SamplePolicy,
}

impl Default for TransmitterSettings {
    fn default() -> Self {
        Self {
            ring_latency_ms: 40,
            poll_interval_ms: 2,
            priming_timeout_ms: 2_000,
            max_underruns: 8,
            underrun_window_ms: 5_000,
            drain_policy: DrainPolicy::Flush,
            drain_timeout_ms: 500,
            block_size: 1024,
            dma_channel: 5,
            fractional_bits: DEFAULT_FRACTIONAL_BITS,
            sample_policy: SamplePolicy::Clamp,
        }
    }
}

impl TransmitterSettings {
    /// Parse a JSON settings document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::SettingsParse`] for malformed JSON or unknown keys,
    /// then anything [`validate`][Self::validate] reports.
    pub fn from_json(json: &str, origin: &Path) -> Result<Self, ConfigError> {
        let settings: Self =
            serde_json::from_str(json).map_err(|source| ConfigError::SettingsParse {
                path: origin.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a JSON settings file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::SettingsIo`] when the file cannot be read, otherwise as
    /// [`from_json`][Self::from_json].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json(&json, path)?;
        tracing::debug!(
            path = %path.display(),
            ring_latency_ms = settings.ring_latency_ms,
            poll_interval_ms = settings.poll_interval_ms,
            dma_channel = settings.dma_channel,
            "settings loaded"
        );
        Ok(settings)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidSetting`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name: &'static str, reason: &str| {
            Err(ConfigError::InvalidSetting {
                name,
                reason: reason.into(),
            })
        };
        if self.ring_latency_ms == 0 {
            return invalid("ring_latency_ms", "must be positive");
        }
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms", "must be positive");
        }
        // A cursor that laps the ring between two polls looks like no movement.
        if u64::from(self.poll_interval_ms) * 2 >= u64::from(self.ring_latency_ms) {
            return invalid("poll_interval_ms", "must be less than half of ring_latency_ms");
        }
        if self.priming_timeout_ms == 0 {
            return invalid("priming_timeout_ms", "must be positive");
        }
        if self.underrun_window_ms == 0 {
            return invalid("underrun_window_ms", "must be positive");
        }
        if self.block_size == 0 {
            return invalid("block_size", "must be positive");
        }
        if self.dma_channel > platform::dma::MAX_CHANNEL {
            return invalid("dma_channel", "must be 0-15");
        }
        if !(MIN_FRACTIONAL_BITS..=DEFAULT_FRACTIONAL_BITS).contains(&self.fractional_bits) {
            return invalid("fractional_bits", "must be 10-12");
        }
        Ok(())
    }

    /// Ring slots for `sample_rate_hz`: the configured latency worth of
    /// samples, bounded to [`MIN_RING_CAPACITY`]..=[`MAX_RING_CAPACITY`].
    pub fn ring_capacity(&self, sample_rate_hz: u32) -> usize {
        let samples = u64::from(sample_rate_hz) * u64::from(self.ring_latency_ms) / 1000;
        usize::try_from(samples)
            .unwrap_or(MAX_RING_CAPACITY)
            .clamp(MIN_RING_CAPACITY, MAX_RING_CAPACITY)
    }

    /// Time the hardware takes to walk the whole ring at `sample_rate_hz`.
    ///
    /// Differs from `ring_latency_ms` when the capacity bounds apply.
    pub fn ring_duration(&self, sample_rate_hz: u32) -> Duration {
        let slots = self.ring_capacity(sample_rate_hz) as u64;
        Duration::from_micros(slots * 1_000_000 / u64::from(sample_rate_hz.max(1)))
    }

    /// Poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }

    /// Priming deadline.
    pub fn priming_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.priming_timeout_ms))
    }

    /// Underrun window.
    pub fn underrun_window(&self) -> Duration {
        Duration::from_millis(u64::from(self.underrun_window_ms))
    }

    /// Drain deadline.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.drain_timeout_ms))
    }
}
