//! VideoCore mailbox property interface (`/dev/vcio`).
//!
//! DMA control blocks must live in memory the DMA engine can address and
//! that bypasses the ARM caches. The GPU firmware hands out such memory
//! through four property tags:
//!
//! | Tag       | Request                    | Response      |
//! |-----------|----------------------------|---------------|
//! | `0x3000C` | size, alignment, flags     | handle        |
//! | `0x3000D` | handle                     | bus address   |
//! | `0x3000E` | handle                     | status        |
//! | `0x3000F` | handle                     | status        |
//!
//! # Message layout (32-bit words)
//!
//! ```text
//! [0] total size in bytes
//! [1] request code 0, response 0x8000_0000 on success
//! [2] tag
//! [3] value buffer size in bytes
//! [4] request value length in bytes
//! [5..] values (request in, response out)
//! [n] end tag 0
//! ```

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::HardwareError;

/// Mailbox device node.
pub const DEV_VCIO: &str = "/dev/vcio";

/// Allocate GPU memory.
pub const TAG_ALLOCATE: u32 = 0x0003_000C;
/// Lock an allocation, returning its bus address.
pub const TAG_LOCK: u32 = 0x0003_000D;
/// Unlock an allocation.
pub const TAG_UNLOCK: u32 = 0x0003_000E;
/// Release an allocation.
pub const TAG_RELEASE: u32 = 0x0003_000F;

/// Response code for a processed request.
pub const RESPONSE_SUCCESS: u32 = 0x8000_0000;

/// `_IOWR(100, 0, char *)`.
pub const IOCTL_MBOX_PROPERTY: u64 =
    (3 << 30) | ((core::mem::size_of::<*mut u8>() as u64) << 16) | (100 << 8);

/// Open handle to the firmware mailbox.
pub struct Mailbox {
    file: File,
}

impl Mailbox {
    /// Open `/dev/vcio`.
    ///
    /// # Errors
    ///
    /// [`HardwareError::Open`] when the node is missing or not accessible.
    pub fn open() -> Result<Self, HardwareError> {
        let path = Path::new(DEV_VCIO);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| HardwareError::Open {
                path: PathBuf::from(path),
                source,
            })?;
        Ok(Self { file })
    }

    /// Allocate `size` bytes aligned to `align`; returns the firmware handle.
    pub fn mem_alloc(&self, size: u32, align: u32, flags: u32) -> Result<u32, HardwareError> {
        let handle = self.call(TAG_ALLOCATE, &[size, align, flags], 1)?;
        if handle == 0 {
            return Err(HardwareError::Mailbox {
                tag: TAG_ALLOCATE,
                reason: format!("firmware refused {size} bytes"),
            });
        }
        Ok(handle)
    }

    /// Lock an allocation in place; returns its bus address.
    pub fn mem_lock(&self, handle: u32) -> Result<u32, HardwareError> {
        let bus = self.call(TAG_LOCK, &[handle], 1)?;
        if bus == 0 {
            return Err(HardwareError::Mailbox {
                tag: TAG_LOCK,
                reason: format!("lock of handle {handle} returned no address"),
            });
        }
        Ok(bus)
    }

    /// Unlock an allocation.
    pub fn mem_unlock(&self, handle: u32) -> Result<(), HardwareError> {
        self.call(TAG_UNLOCK, &[handle], 1).map(drop)
    }

    /// Return an allocation to the firmware.
    pub fn mem_release(&self, handle: u32) -> Result<(), HardwareError> {
        self.call(TAG_RELEASE, &[handle], 1).map(drop)
    }

    fn call(&self, tag: u32, request: &[u32], response_words: usize) -> Result<u32, HardwareError> {
        let mut message = encode_property(tag, request, response_words);
        // SAFETY: the property ioctl reads and writes exactly `message[0]`
        // bytes, which is the length of the buffer we pass.
        #[allow(clippy::cast_possible_truncation)] // Safety: ioctl number fits in 32 bits
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                IOCTL_MBOX_PROPERTY as _,
                message.as_mut_ptr(),
            )
        };
        if rc < 0 {
            return Err(HardwareError::Mailbox {
                tag,
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        let values = decode_property(tag, &message)?;
        Ok(values.first().copied().unwrap_or(0))
    }
}

/// Build a single-tag property message.
pub fn encode_property(tag: u32, request: &[u32], response_words: usize) -> Vec<u32> {
    let value_words = request.len().max(response_words);
    let mut message = Vec::with_capacity(value_words + 6);
    let total_words = value_words + 6;
    message.extend([
        word_bytes(total_words),
        0,
        tag,
        word_bytes(value_words),
        word_bytes(request.len()),
    ]);
    message.extend_from_slice(request);
    message.resize(5 + value_words, 0);
    message.push(0);
    message
}

/// Check the firmware's response code and return the value words.
///
/// # Errors
///
/// [`HardwareError::Mailbox`] when the message is truncated or the request
/// was not processed.
pub fn decode_property(tag: u32, message: &[u32]) -> Result<&[u32], HardwareError> {
    let code = message.get(1).copied().ok_or_else(|| HardwareError::Mailbox {
        tag,
        reason: "truncated response".into(),
    })?;
    if code != RESPONSE_SUCCESS {
        return Err(HardwareError::Mailbox {
            tag,
            reason: format!("response code {code:#010x}"),
        });
    }
    let end = message.len().saturating_sub(1);
    Ok(message.get(5..end).unwrap_or_default())
}

#[allow(clippy::cast_possible_truncation)] // Safety: messages are a handful of words
fn word_bytes(words: usize) -> u32 {
    (words * 4) as u32
}
