//! Process-mapped view of the peripheral window.
//!
//! [`MappedRegisters`] is the single owned handle to the register region for
//! a session. It is acquired explicitly with [`MappedRegisters::map_registers`]
//! and released with [`MappedRegisters::unmap_registers`] (or on drop); there
//! is no process-wide mapping.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::error::HardwareError;
use crate::registers::RegisterBus;

/// Physical memory device node.
pub const DEV_MEM: &str = "/dev/mem";

/// Owned, volatile view of a physical register range.
pub struct MappedRegisters {
    map: Option<MmapMut>,
    physical_base: u64,
    size: usize,
}

impl MappedRegisters {
    /// Map `size` bytes of physical memory starting at `physical_base`
    /// through `/dev/mem`.
    ///
    /// # Errors
    ///
    /// [`HardwareError::Open`] when `/dev/mem` cannot be opened (typically
    /// missing root privilege), [`HardwareError::Map`] when the kernel
    /// refuses the range.
    pub fn map_registers(physical_base: u64, size: usize) -> Result<Self, HardwareError> {
        Self::map_from(Path::new(DEV_MEM), physical_base, size)
    }

    /// Map a range of an arbitrary file. Used with `/dev/mem` on hardware and
    /// with an ordinary file in tests.
    ///
    /// # Errors
    ///
    /// See [`map_registers`][Self::map_registers].
    pub fn map_from(path: &Path, physical_base: u64, size: usize) -> Result<Self, HardwareError> {
        let file = open_sync(path)?;
        // SAFETY: the mapping is private to this handle and every access goes
        // through read_volatile/write_volatile at 4-byte aligned offsets that
        // are bounds-checked against `size`. Concurrent modification by the
        // hardware is the reason for the volatile accesses, not a soundness
        // hole: no Rust reference to the mapped bytes is ever handed out.
        let map = unsafe {
            MmapOptions::new()
                .offset(physical_base)
                .len(size)
                .map_mut(&file)
        }
        .map_err(|source| HardwareError::Map {
            base: physical_base,
            size,
            source,
        })?;

        tracing::debug!(
            base = physical_base,
            size,
            path = %path.display(),
            "peripheral window mapped"
        );

        Ok(Self {
            map: Some(map),
            physical_base,
            size,
        })
    }

    /// Release the mapping. Idempotent; later accesses are dropped.
    pub fn unmap_registers(&mut self) {
        if self.map.take().is_some() {
            tracing::debug!(base = self.physical_base, "peripheral window unmapped");
        }
    }

    /// `true` until [`unmap_registers`][Self::unmap_registers] is called.
    pub fn is_mapped(&self) -> bool {
        self.map.is_some()
    }

    /// Physical base address of the mapping.
    pub fn physical_base(&self) -> u64 {
        self.physical_base
    }

    /// Length of the mapping in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Byte index of a register, or `None` when it is misaligned or outside
    /// the window.
    fn index(&self, offset: u32) -> Option<usize> {
        let index = usize::try_from(offset).ok()?;
        let end = index.checked_add(4)?;
        (index % 4 == 0 && end <= self.size).then_some(index)
    }
}

impl RegisterBus for MappedRegisters {
    fn read_register(&self, offset: u32) -> u32 {
        let (Some(map), Some(index)) = (self.map.as_ref(), self.index(offset)) else {
            tracing::error!(offset, "register read outside mapped window");
            return 0;
        };
        // SAFETY: `index` is 4-aligned and `index + 4 <= size` (checked in
        // `index`); the mapping base is page-aligned, so the pointer is a
        // valid, aligned u32 inside the live mapping.
        unsafe { map.as_ptr().add(index).cast::<u32>().read_volatile() }
    }

    fn write_register(&mut self, offset: u32, value: u32) {
        let Some(index) = self.index(offset) else {
            tracing::error!(offset, value, "register write outside mapped window");
            return;
        };
        let Some(map) = self.map.as_mut() else {
            tracing::error!(offset, value, "register write after unmap");
            return;
        };
        // SAFETY: as in `read_register`; `&mut self` guarantees no other
        // access through this handle is in flight.
        unsafe { map.as_mut_ptr().add(index).cast::<u32>().write_volatile(value) }
    }
}

impl Drop for MappedRegisters {
    fn drop(&mut self) {
        self.unmap_registers();
    }
}

/// Open a device node read/write with `O_SYNC` (uncached access on `/dev/mem`).
pub(crate) fn open_sync(path: &Path) -> Result<File, HardwareError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC)
        .open(path)
        .map_err(|source| HardwareError::Open {
            path: PathBuf::from(path),
            source,
        })
}
