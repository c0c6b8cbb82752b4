//! Carrier configuration.
//!
//! A [`CarrierConfig`] is fixed for the whole session. Construction checks
//! everything that can be checked without hardware: deviation bounds,
//! fractional precision and, most importantly, that both band edges
//! (`center ± deviation`) map to divisors the clock generator can hold.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::modulator::{divisor_for_frequency, DIVISOR_MAX_INTEGER, DIVISOR_MIN_INTEGER};

/// Fractional divisor bits used unless configured otherwise.
pub const DEFAULT_FRACTIONAL_BITS: u8 = 12;

/// Fewest fractional bits accepted. Below 10 the carrier step at 100 MHz
/// exceeds 20 kHz and speech becomes unintelligible.
pub const MIN_FRACTIONAL_BITS: u8 = 10;

/// Broadcast FM peak deviation.
pub const DEFAULT_DEVIATION_HZ: f64 = 75_000.0;

/// What to do with samples outside [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplePolicy {
    /// Clamp into range; NaN becomes silence.
    #[default]
    Clamp,
    /// Fail the sample with `SampleOutOfRange`.
    Reject,
}

/// Center frequency, deviation, reference clock and sample rate of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarrierConfig {
    center_frequency_hz: f64,
    peak_deviation_hz: f64,
    reference_clock_hz: u32,
    sample_rate_hz: u32,
    #[serde(default = "default_fractional_bits")]
    fractional_bits: u8,
    #[serde(default)]
    sample_policy: SamplePolicy,
}

fn default_fractional_bits() -> u8 {
    DEFAULT_FRACTIONAL_BITS
}

impl CarrierConfig {
    /// Build and validate a config with 12 fractional bits and clamping.
    ///
    /// # Errors
    ///
    /// See [`validate`][Self::validate].
    pub fn new(
        center_frequency_hz: f64,
        peak_deviation_hz: f64,
        reference_clock_hz: u32,
        sample_rate_hz: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            center_frequency_hz,
            peak_deviation_hz,
            reference_clock_hz,
            sample_rate_hz,
            fractional_bits: DEFAULT_FRACTIONAL_BITS,
            sample_policy: SamplePolicy::Clamp,
        };
        config.validate()?;
        Ok(config)
    }

    /// Same config with a different divisor precision.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidFractionalBits`] outside 10..=12, or a band
    /// edge that no longer fits after requantization.
    pub fn with_fractional_bits(mut self, bits: u8) -> Result<Self, ConfigError> {
        self.fractional_bits = bits;
        self.validate()?;
        Ok(self)
    }

    /// Same config with a different out-of-range sample policy.
    #[must_use]
    pub fn with_sample_policy(mut self, policy: SamplePolicy) -> Self {
        self.sample_policy = policy;
        self
    }

    /// Check every invariant. Deserialized configs must pass through this
    /// before use; [`DivisorModulator::new`](crate::DivisorModulator::new)
    /// does so.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidFrequency`]: center not positive and finite
    /// - [`ConfigError::InvalidDeviation`]: deviation not in (0, center / 10]
    /// - [`ConfigError::InvalidSampleRate`]: zero sample rate
    /// - [`ConfigError::InvalidFractionalBits`]: bits outside 10..=12
    /// - [`ConfigError::DivisorOutOfRange`]: a band edge needs a divisor
    ///   outside 2..=4095
    pub fn validate(&self) -> Result<(), ConfigError> {
        let center = self.center_frequency_hz;
        if !(center.is_finite() && center > 0.0) {
            return Err(ConfigError::InvalidFrequency(center));
        }
        let deviation = self.peak_deviation_hz;
        if !(deviation.is_finite() && deviation > 0.0 && deviation <= center / 10.0) {
            return Err(ConfigError::InvalidDeviation {
                deviation_hz: deviation,
                center_hz: center,
            });
        }
        if self.sample_rate_hz == 0 {
            return Err(ConfigError::InvalidSampleRate);
        }
        if !(MIN_FRACTIONAL_BITS..=DEFAULT_FRACTIONAL_BITS).contains(&self.fractional_bits) {
            return Err(ConfigError::InvalidFractionalBits(self.fractional_bits));
        }
        for edge in [center - deviation, center + deviation] {
            let divisor = f64::from(self.reference_clock_hz) / edge;
            let fits = divisor_for_frequency(edge, self).is_some_and(|d| {
                (DIVISOR_MIN_INTEGER..=DIVISOR_MAX_INTEGER).contains(&d.integer_part())
            });
            if !fits {
                return Err(ConfigError::DivisorOutOfRange {
                    frequency_hz: edge,
                    reference_hz: self.reference_clock_hz,
                    divisor,
                });
            }
        }
        Ok(())
    }

    /// Carrier frequency for a zero sample.
    pub fn center_frequency_hz(&self) -> f64 {
        self.center_frequency_hz
    }

    /// Frequency swing for a full-scale sample.
    pub fn peak_deviation_hz(&self) -> f64 {
        self.peak_deviation_hz
    }

    /// Clock feeding GPCLK0.
    pub fn reference_clock_hz(&self) -> u32 {
        self.reference_clock_hz
    }

    /// Audio sample rate, which is also the divisor update rate.
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Fractional bits kept in each divisor.
    pub fn fractional_bits(&self) -> u8 {
        self.fractional_bits
    }

    /// Out-of-range sample policy.
    pub fn sample_policy(&self) -> SamplePolicy {
        self.sample_policy
    }
}
