//! Clock manager: general-purpose and PWM clock generators.
//!
//! Each generator is a CTL/DIV register pair. Every write must carry the
//! `0x5A` password in bits 24-31 or the clock manager ignores it.
//!
//! # Register Map (offsets from the peripheral base)
//!
//! | Register | Offset     | Use |
//! |----------|------------|-----|
//! | `GP0CTL` | `0x101070` | GPCLK0 control (the RF carrier on GPIO4) |
//! | `GP0DIV` | `0x101074` | GPCLK0 divisor, 12.12 fixed point |
//! | `PWMCTL` | `0x1010A0` | PWM clock control (DMA pacing) |
//! | `PWMDIV` | `0x1010A4` | PWM clock divisor |
//!
//! # Control word
//!
//! ```text
//! 31      24 23     11 10 9 8  7    6 5    4    3  0
//! [PASSWORD] [ zero  ] [MASH] [BUSY] . [KILL][ENAB][SRC]
//! ```
//!
//! Changing SRC or MASH while ENAB is set glitches the output, so
//! [`ClockGenerator::start`] always disables first and waits for BUSY to
//! drop. The divisor register may be rewritten while running; the carrier
//! modulation relies on that.

use crate::registers::RegisterBus;

/// Clock manager password, required in every CTL/DIV write.
pub const PASSWORD: u32 = 0x5A00_0000;

/// GPCLK0 control register.
pub const CM_GP0CTL: u32 = 0x0010_1070;
/// GPCLK0 divisor register.
pub const CM_GP0DIV: u32 = 0x0010_1074;
/// PWM clock control register.
pub const CM_PWMCTL: u32 = 0x0010_10A0;
/// PWM clock divisor register.
pub const CM_PWMDIV: u32 = 0x0010_10A4;

/// Mask of the 24 divisor bits (12 integer . 12 fractional).
pub const DIVISOR_MASK: u32 = 0x00FF_FFFF;

/// Upper bound on BUSY polls before giving up on a clock stop.
pub const BUSY_POLL_LIMIT: u32 = 100_000;

/// Control register bits.
pub mod ctl {
    /// Enable the generator.
    pub const ENAB: u32 = 1 << 4;
    /// Stop immediately (glitches; only for recovery).
    pub const KILL: u32 = 1 << 5;
    /// Generator is running (read-only).
    pub const BUSY: u32 = 1 << 7;

    /// MASH noise-shaping stage count (0-3) in bits 9-10.
    pub const fn mash(stages: u32) -> u32 {
        (stages & 0b11) << 9
    }
}

/// Clock source selector (CTL bits 0-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    /// Ground; output held low.
    Ground,
    /// 19.2 MHz crystal (54 MHz on BCM2711).
    Oscillator,
    /// PLLA per-channel output.
    PllA,
    /// PLLC per-channel output (tracks the core clock; avoid).
    PllC,
    /// PLLD per-channel output, the stable 500/750 MHz reference.
    PllD,
    /// HDMI auxiliary clock.
    Hdmi,
}

impl ClockSource {
    /// SRC field encoding.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Ground => 0,
            Self::Oscillator => 1,
            Self::PllA => 4,
            Self::PllC => 5,
            Self::PllD => 6,
            Self::Hdmi => 7,
        }
    }
}

/// One CTL/DIV register pair of the clock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockGenerator {
    ctl: u32,
    div: u32,
}

impl ClockGenerator {
    /// GPCLK0, routed to GPIO4 in ALT0. This is the RF carrier.
    pub const GPCLK0: Self = Self {
        ctl: CM_GP0CTL,
        div: CM_GP0DIV,
    };

    /// PWM clock generator, used only to pace DMA.
    pub const PWM: Self = Self {
        ctl: CM_PWMCTL,
        div: CM_PWMDIV,
    };

    /// Control register offset.
    pub const fn ctl_offset(self) -> u32 {
        self.ctl
    }

    /// Divisor register offset. Carrier control blocks target this.
    pub const fn div_offset(self) -> u32 {
        self.div
    }

    /// DIV register word for a raw 12.12 divisor.
    pub const fn divisor_word(raw: u32) -> u32 {
        PASSWORD | (raw & DIVISOR_MASK)
    }

    /// CTL word that leaves the generator stopped on `source`.
    pub const fn idle_control_word(source: ClockSource) -> u32 {
        PASSWORD | source.bits()
    }

    /// Disable the generator and wait (bounded) for BUSY to clear.
    ///
    /// Returns `false` if the generator was still busy after
    /// [`BUSY_POLL_LIMIT`] polls; the caller decides whether that matters.
    pub fn stop<B: RegisterBus + ?Sized>(self, bus: &mut B, source: ClockSource) -> bool {
        bus.write_register(self.ctl, Self::idle_control_word(source));
        let settled = self.wait_idle(bus);
        if !settled {
            tracing::warn!(ctl = self.ctl, "clock generator still busy after stop");
        }
        settled
    }

    /// Program divisor and MASH, then enable from `source`.
    pub fn start<B: RegisterBus + ?Sized>(
        self,
        bus: &mut B,
        source: ClockSource,
        mash_stages: u32,
        raw_divisor: u32,
    ) -> bool {
        let settled = self.stop(bus, source);
        bus.write_register(self.div, Self::divisor_word(raw_divisor));
        let base = PASSWORD | ctl::mash(mash_stages) | source.bits();
        bus.write_register(self.ctl, base);
        bus.write_register(self.ctl, base | ctl::ENAB);
        tracing::debug!(
            ctl = self.ctl,
            source = source.bits(),
            mash_stages,
            raw_divisor,
            "clock generator started"
        );
        settled
    }

    /// `true` when CTL reports the generator running.
    pub fn is_busy<B: RegisterBus + ?Sized>(self, bus: &B) -> bool {
        bus.read_register(self.ctl) & ctl::BUSY != 0
    }

    fn wait_idle<B: RegisterBus + ?Sized>(self, bus: &B) -> bool {
        (0..BUSY_POLL_LIMIT).any(|_| !self.is_busy(bus))
    }
}
