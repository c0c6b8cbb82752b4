//! Register access trait.
//!
//! Offsets are byte offsets from the start of the peripheral window
//! (`SocRevision::peripheral_base`), exactly as they appear in the BCM2835
//! ARM Peripherals manual once the `0x7E00_0000` bus prefix is stripped.
//! The register maps in [`crate::clock`], [`crate::dma`], [`crate::pwm`] and
//! [`crate::gpio`] are expressed in these offsets.

/// Volatile 32-bit access to memory-mapped peripheral registers.
///
/// Implementations must not reorder, merge or elide accesses: each call is
/// exactly one bus transaction. Writes take effect on hardware immediately
/// and are not transactional.
///
/// Both methods are infallible. Offsets come from the const register maps in
/// this crate; an implementation that receives an offset outside its window
/// drops the write (and reads back 0) after logging it.
pub trait RegisterBus {
    /// Read one 32-bit register.
    fn read_register(&self, offset: u32) -> u32;

    /// Write one 32-bit register.
    fn write_register(&mut self, offset: u32, value: u32);

    /// Read-modify-write helper: clears `mask` then ORs in `bits & mask`.
    ///
    /// Two bus transactions; not atomic with respect to the hardware.
    fn modify_register(&mut self, offset: u32, mask: u32, bits: u32) {
        let current = self.read_register(offset);
        self.write_register(offset, (current & !mask) | (bits & mask));
    }
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    fn read_register(&self, offset: u32) -> u32 {
        (**self).read_register(offset)
    }

    fn write_register(&mut self, offset: u32, value: u32) {
        (**self).write_register(offset, value);
    }
}
