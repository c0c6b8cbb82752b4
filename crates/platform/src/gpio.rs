//! GPIO function select.
//!
//! Each `GPFSELn` register holds the 3-bit function of ten pins. The carrier
//! needs exactly one pin: GPIO4 in ALT0 routes GPCLK0 to the header (pin 7).

use crate::registers::RegisterBus;

/// First function select register.
pub const GPFSEL0: u32 = 0x0020_0000;

/// GPIO carrying GPCLK0 in ALT0.
pub const GPCLK0_PIN: u8 = 4;

/// Pin function encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioFunction {
    /// High-impedance input. The safe idle state for the antenna pin.
    Input,
    /// Push-pull output.
    Output,
    /// Alternate function 0 (GPCLK0 on GPIO4).
    Alt0,
}

impl GpioFunction {
    /// FSEL field encoding.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Input => 0b000,
            Self::Output => 0b001,
            Self::Alt0 => 0b100,
        }
    }
}

/// `GPFSELn` register offset for `pin`.
pub const fn fsel_offset(pin: u8) -> u32 {
    GPFSEL0 + (pin as u32 / 10) * 4
}

/// Bit position of `pin` within its `GPFSELn` register.
pub const fn fsel_shift(pin: u8) -> u32 {
    (pin as u32 % 10) * 3
}

/// Set the function of `pin`, leaving the other nine pins in the register
/// untouched.
pub fn set_function<B: RegisterBus + ?Sized>(bus: &mut B, pin: u8, function: GpioFunction) {
    let shift = fsel_shift(pin);
    bus.modify_register(fsel_offset(pin), 0b111 << shift, function.bits() << shift);
    tracing::trace!(pin, function = function.bits(), "GPIO function set");
}

/// Read back the function field of `pin`.
pub fn function_bits<B: RegisterBus + ?Sized>(bus: &B, pin: u8) -> u32 {
    (bus.read_register(fsel_offset(pin)) >> fsel_shift(pin)) & 0b111
}
