//! Hardware access errors.
//!
//! Every variant is fatal for a transmission session: there is no retry path
//! for a failed mapping or an unrecognised SoC. Callers that need to tell a
//! privilege problem apart from an unknown board use
//! [`HardwareError::is_unsupported_platform`].

use std::io;
use std::path::PathBuf;

/// Error raised while acquiring or driving the peripheral hardware.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// A device node (`/dev/mem`, `/dev/vcio`) could not be opened.
    ///
    /// Almost always missing root privilege.
    #[error("cannot open {}: {source}", path.display())]
    Open {
        /// Device node that failed to open.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// `mmap` of a physical range failed.
    #[error("cannot map {size:#x} bytes at physical address {base:#x}: {source}")]
    Map {
        /// Physical base address requested.
        base: u64,
        /// Length of the mapping in bytes.
        size: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A VideoCore mailbox property request was refused or the ioctl failed.
    #[error("mailbox request {tag:#07x} failed: {reason}")]
    Mailbox {
        /// Property tag of the failed request.
        tag: u32,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The SoC revision could not be identified from the device tree.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// A DMA channel number outside 0–15 was requested.
    #[error("invalid DMA channel {0} (expected 0-15)")]
    InvalidDmaChannel(u8),

    /// An access fell outside a DMA memory allocation.
    #[error("DMA memory offset {offset:#x} outside {size:#x}-byte allocation")]
    DmaOutOfBounds {
        /// Byte offset of the rejected access.
        offset: usize,
        /// Size of the allocation in bytes.
        size: usize,
    },

    /// The DMA channel stopped walking the ring (`ACTIVE` clear or `ERROR`
    /// set in `CS`).
    #[error("DMA channel {channel} halted (CS {status:#010x})")]
    DmaHalted {
        /// Channel number.
        channel: u8,
        /// `CS` word read back.
        status: u32,
    },

    /// The DMA cursor has not moved for longer than the ring lasts.
    #[error("DMA channel {channel} made no progress for {idle_ms} ms")]
    DmaStalled {
        /// Channel number.
        channel: u8,
        /// Time since the cursor last moved.
        idle_ms: u64,
    },

    /// The PWM pacing clock cannot produce the requested sample rate.
    #[error("cannot pace {sample_rate_hz} Hz from a {reference_hz} Hz reference")]
    PacingOutOfRange {
        /// Requested sample rate.
        sample_rate_hz: u32,
        /// Reference clock feeding the PWM clock generator.
        reference_hz: u32,
    },
}

impl HardwareError {
    /// `true` when the board itself is not recognised (as opposed to a
    /// privilege or mapping failure on a recognised board).
    pub fn is_unsupported_platform(&self) -> bool {
        matches!(self, Self::UnsupportedPlatform(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_names_the_device() {
        let err = HardwareError::Open {
            path: PathBuf::from("/dev/mem"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("/dev/mem"));
        assert!(!err.is_unsupported_platform());
    }

    #[test]
    fn test_map_error_formats_hex() {
        let err = HardwareError::Map {
            base: 0x3F00_0000,
            size: 0x0100_0000,
            source: io::Error::from(io::ErrorKind::InvalidInput),
        };
        let s = err.to_string();
        assert!(s.contains("0x3f000000"), "got: {s}");
        assert!(s.contains("0x1000000"), "got: {s}");
    }

    #[test]
    fn test_dma_halt_shows_status_word() {
        let err = HardwareError::DmaHalted {
            channel: 5,
            status: 0x8000_0000,
        };
        assert_eq!(err.to_string(), "DMA channel 5 halted (CS 0x80000000)");
    }

    #[test]
    fn test_unsupported_platform_predicate() {
        let err = HardwareError::UnsupportedPlatform("no device tree".into());
        assert!(err.is_unsupported_platform());
    }
}
