//! SoC revision discovery.
//!
//! The peripheral window moves between Raspberry Pi generations and the PLLD
//! frequency that feeds the clock generators changes with it:
//!
//! | SoC            | Boards              | Peripheral base | PLLD    | Mailbox mem flags |
//! |----------------|---------------------|-----------------|---------|-------------------|
//! | BCM2835        | Pi 1, Zero          | `0x2000_0000`   | 500 MHz | `0x0C` (L1 non-allocating) |
//! | BCM2836/BCM2837| Pi 2, Pi 3, Zero 2  | `0x3F00_0000`   | 500 MHz | `0x04` (direct, uncached) |
//! | BCM2711        | Pi 4, CM4, Pi 400   | `0xFE00_0000`   | 750 MHz | `0x04` (direct, uncached) |
//!
//! The base is read from `/proc/device-tree/soc/ranges`, the same source the
//! firmware's `bcm_host_get_peripheral_address()` uses: a big-endian 32-bit
//! parent address at byte offset 4, or at byte offset 8 on SoCs whose
//! device tree uses two-cell parent addresses (offset 4 then reads zero).

use std::path::Path;

use crate::error::HardwareError;

/// Device-tree node describing the SoC address translation.
pub const SOC_RANGES: &str = "/proc/device-tree/soc/ranges";

/// Length of the peripheral window mapped for register access (16 MiB).
pub const PERIPHERAL_WINDOW_SIZE: usize = 0x0100_0000;

/// Bus address of the peripheral window as seen by the DMA engine.
///
/// Identical on every revision; control blocks always target `0x7Exx_xxxx`.
pub const PERIPHERAL_BUS_BASE: u32 = 0x7E00_0000;

/// Supported Broadcom SoC revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocRevision {
    /// Pi 1 / Pi Zero.
    Bcm2835,
    /// Pi 2 / Pi 3 / Zero 2 (BCM2836 and BCM2837 share the layout).
    Bcm2836,
    /// Pi 4 family.
    Bcm2711,
}

impl SocRevision {
    /// Identify the running board from the device tree.
    ///
    /// # Errors
    ///
    /// [`HardwareError::UnsupportedPlatform`] when the device tree is missing
    /// (not a Raspberry Pi) or names an unknown peripheral base.
    pub fn detect() -> Result<Self, HardwareError> {
        Self::detect_from(Path::new(SOC_RANGES))
    }

    /// Identify the board from a `soc/ranges` blob at `path`.
    ///
    /// # Errors
    ///
    /// See [`detect`][Self::detect].
    pub fn detect_from(path: &Path) -> Result<Self, HardwareError> {
        let ranges = std::fs::read(path).map_err(|err| {
            HardwareError::UnsupportedPlatform(format!("cannot read {}: {err}", path.display()))
        })?;
        let base = parse_soc_ranges(&ranges)?;
        let soc = Self::from_peripheral_base(base)?;
        tracing::info!(soc = soc.name(), base, "SoC detected");
        Ok(soc)
    }

    /// Map a physical peripheral base to its revision.
    ///
    /// # Errors
    ///
    /// [`HardwareError::UnsupportedPlatform`] for an unknown base address.
    pub fn from_peripheral_base(base: u64) -> Result<Self, HardwareError> {
        match base {
            0x2000_0000 => Ok(Self::Bcm2835),
            0x3F00_0000 => Ok(Self::Bcm2836),
            0xFE00_0000 => Ok(Self::Bcm2711),
            other => Err(HardwareError::UnsupportedPlatform(format!(
                "unknown peripheral base {other:#x}"
            ))),
        }
    }

    /// Physical address of the peripheral window.
    pub const fn peripheral_base(self) -> u64 {
        match self {
            Self::Bcm2835 => 0x2000_0000,
            Self::Bcm2836 => 0x3F00_0000,
            Self::Bcm2711 => 0xFE00_0000,
        }
    }

    /// PLLD output frequency in Hz. This is the reference clock for GPCLK0
    /// and the PWM clock generator.
    pub const fn plld_hz(self) -> u32 {
        match self {
            Self::Bcm2835 | Self::Bcm2836 => 500_000_000,
            Self::Bcm2711 => 750_000_000,
        }
    }

    /// Allocation flags for mailbox memory visible to both DMA and the ARM
    /// without cache maintenance.
    pub const fn mailbox_mem_flags(self) -> u32 {
        match self {
            Self::Bcm2835 => 0x0C,
            Self::Bcm2836 | Self::Bcm2711 => 0x04,
        }
    }

    /// Chip name for log lines.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bcm2835 => "BCM2835",
            Self::Bcm2836 => "BCM2836/7",
            Self::Bcm2711 => "BCM2711",
        }
    }
}

impl core::fmt::Display for SocRevision {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Extract the peripheral base from a `soc/ranges` blob.
///
/// # Errors
///
/// [`HardwareError::UnsupportedPlatform`] when the blob is too short.
pub fn parse_soc_ranges(ranges: &[u8]) -> Result<u64, HardwareError> {
    let word_at = |at: usize| -> Option<u32> {
        let bytes: [u8; 4] = ranges.get(at..at.checked_add(4)?)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    };
    match word_at(4) {
        Some(0) => word_at(8).map(u64::from),
        other => other.map(u64::from),
    }
    .ok_or_else(|| {
        HardwareError::UnsupportedPlatform(format!(
            "soc/ranges too short ({} bytes)",
            ranges.len()
        ))
    })
}
