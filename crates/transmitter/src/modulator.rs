//! Sample → clock divisor mapping.
//!
//! GPCLK0 outputs `reference / divisor`. To emit the instantaneous frequency
//!
//! ```text
//! f = center + sample * deviation
//! ```
//!
//! the divisor register must hold `reference / f` in 12.12 fixed point.
//! The mapping is pure and monotonic: a larger sample is a higher
//! frequency and therefore a smaller (or equal) divisor.
//!
//! # Resolution
//!
//! One raw step at 12 fractional bits moves the carrier by roughly
//! `f² / (reference * 4096)`:
//!
//! | Reference | Carrier  | Step     |
//! |-----------|----------|----------|
//! | 500 MHz   | 88 MHz   | ~3.8 kHz |
//! | 500 MHz   | 100 MHz  | ~4.9 kHz |
//! | 750 MHz   | 100 MHz  | ~3.3 kHz |
//!
//! Rounding to the nearest step (never truncating) keeps the quantization
//! error symmetric, so a silent input sits on the center frequency rather
//! than half a step above it.

use platform::ClockGenerator;

use crate::carrier::{CarrierConfig, SamplePolicy};
use crate::error::{ConfigError, ModulationError};

/// Fractional bits of the hardware divisor register.
pub const REGISTER_FRACTION_BITS: u8 = 12;

/// Smallest integer divisor usable with MASH 1.
pub const DIVISOR_MIN_INTEGER: u32 = 2;

/// Largest integer divisor the 12-bit field holds.
pub const DIVISOR_MAX_INTEGER: u32 = 4095;

/// A GPCLK divisor in the register's 12.12 fixed-point layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Divisor(u32);

impl Divisor {
    /// Wrap a raw 12.12 value (only the low 24 bits are meaningful).
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw & 0x00FF_FFFF)
    }

    /// Raw 12.12 value.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Integer part (DIVI).
    pub const fn integer_part(self) -> u32 {
        self.0 >> 12
    }

    /// Fractional part (DIVF), in 1/4096 units.
    pub const fn fractional_part(self) -> u32 {
        self.0 & 0xFFF
    }

    /// `GP0DIV` word: password plus divisor. This is what each ring slot
    /// hands to the DMA engine.
    pub const fn register_word(self) -> u32 {
        ClockGenerator::divisor_word(self.0)
    }

    /// Divisor as a real number.
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 4096.0
    }
}

/// Quantized divisor for `frequency_hz`, or `None` when the frequency is not
/// positive or the divisor overflows the 24-bit register.
///
/// The integer part is not range-checked here.
pub(crate) fn divisor_for_frequency(frequency_hz: f64, config: &CarrierConfig) -> Option<Divisor> {
    if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
        return None;
    }
    let frac = config.fractional_bits().min(REGISTER_FRACTION_BITS);
    let shift = u32::from(REGISTER_FRACTION_BITS - frac);
    let scaled = f64::from(config.reference_clock_hz()) / frequency_hz * f64::from(1u32 << frac);
    let rounded = scaled.round();
    if !(0.0..=f64::from(0x00FF_FFFFu32 >> shift)).contains(&rounded) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Safety: range checked above
    let steps = rounded as u32;
    Some(Divisor(steps << shift))
}

fn in_range(divisor: Divisor) -> bool {
    (DIVISOR_MIN_INTEGER..=DIVISOR_MAX_INTEGER).contains(&divisor.integer_part())
}

/// Map one normalized sample to a divisor.
///
/// Out-of-range samples are clamped or rejected according to the config's
/// [`SamplePolicy`]. Under `Clamp`, NaN is treated as silence.
///
/// # Errors
///
/// - [`ModulationError::SampleOutOfRange`] under `Reject` for a sample
///   outside [-1, 1] or NaN
/// - [`ModulationError::DivisorOutOfRange`] only for an unvalidated config
pub fn sample_to_divisor(sample: f32, config: &CarrierConfig) -> Result<Divisor, ModulationError> {
    let sample = match config.sample_policy() {
        SamplePolicy::Clamp if sample.is_nan() => 0.0,
        SamplePolicy::Clamp => sample.clamp(-1.0, 1.0),
        SamplePolicy::Reject if (-1.0..=1.0).contains(&sample) => sample,
        SamplePolicy::Reject => return Err(ModulationError::SampleOutOfRange(sample)),
    };
    let frequency = config.center_frequency_hz() + f64::from(sample) * config.peak_deviation_hz();
    divisor_for_frequency(frequency, config)
        .filter(|d| in_range(*d))
        .ok_or(ModulationError::DivisorOutOfRange(frequency))
}

/// Frequency GPCLK0 emits when loaded with `divisor`.
pub fn divisor_to_frequency(divisor: Divisor, reference_clock_hz: u32) -> f64 {
    f64::from(reference_clock_hz) * 4096.0 / f64::from(divisor.get())
}

/// Divisor for a zero sample: the unmodulated carrier.
///
/// # Errors
///
/// As [`sample_to_divisor`]; never fails for a validated config.
pub fn neutral_divisor(config: &CarrierConfig) -> Result<Divisor, ModulationError> {
    sample_to_divisor(0.0, config)
}

/// Validated, session-long modulator.
#[derive(Debug, Clone, Copy)]
pub struct DivisorModulator {
    config: CarrierConfig,
    neutral: Divisor,
}

impl DivisorModulator {
    /// Validate `config` and precompute the neutral divisor.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from [`CarrierConfig::validate`].
    pub fn new(config: CarrierConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let neutral = divisor_for_frequency(config.center_frequency_hz(), &config)
            .filter(|d| in_range(*d))
            .ok_or_else(|| ConfigError::DivisorOutOfRange {
                frequency_hz: config.center_frequency_hz(),
                reference_hz: config.reference_clock_hz(),
                divisor: f64::from(config.reference_clock_hz()) / config.center_frequency_hz(),
            })?;
        tracing::debug!(
            center_hz = config.center_frequency_hz(),
            neutral = neutral.get(),
            step_hz = step_hz(&config, neutral),
            "modulator ready"
        );
        Ok(Self { config, neutral })
    }

    /// Divisor for one sample.
    ///
    /// # Errors
    ///
    /// [`ModulationError::SampleOutOfRange`] under `SamplePolicy::Reject`.
    pub fn modulate(&self, sample: f32) -> Result<Divisor, ModulationError> {
        sample_to_divisor(sample, &self.config)
    }

    /// Append the divisors for a block of samples to `out`.
    ///
    /// On error `out` holds the divisors of the samples before the
    /// offending one.
    ///
    /// # Errors
    ///
    /// As [`modulate`][Self::modulate].
    pub fn modulate_block(&self, samples: &[f32], out: &mut Vec<Divisor>) -> Result<(), ModulationError> {
        out.reserve(samples.len());
        for &sample in samples {
            out.push(self.modulate(sample)?);
        }
        Ok(())
    }

    /// The unmodulated carrier divisor.
    pub fn neutral(&self) -> Divisor {
        self.neutral
    }

    /// Session configuration.
    pub fn config(&self) -> &CarrierConfig {
        &self.config
    }

    /// Carrier frequency change of one quantization step at the center.
    pub fn step_hz(&self) -> f64 {
        step_hz(&self.config, self.neutral)
    }
}

fn step_hz(config: &CarrierConfig, neutral: Divisor) -> f64 {
    let quantum = 1u32 << (REGISTER_FRACTION_BITS - config.fractional_bits().min(REGISTER_FRACTION_BITS));
    let reference = config.reference_clock_hz();
    divisor_to_frequency(neutral, reference)
        - divisor_to_frequency(Divisor(neutral.get().saturating_add(quantum)), reference)
}
