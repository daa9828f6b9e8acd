use std::io;
use std::ptr::null_mut;

use log::{debug, warn};

use crate::util::{Size, align_up};

/// A large, unpopulated, access-protected address-space reservation.
///
/// The region is mapped anonymous and `PROT_NONE`, so the kernel commits no
/// memory for it. Sub-ranges are later replaced with `MAP_FIXED` mappings;
/// unmapping the reservation releases everything carved out of it as well.
pub struct Reservation {
    /// Start of the reserved region
    pub ptr: *mut u8,
    /// Reservation length in bytes
    pub len: usize,
}

impl Reservation {
    /// Reserves `size` bytes of anonymous `PROT_NONE` address space.
    ///
    /// When the kernel cannot place a region of the requested size, the
    /// request is halved and retried until it fits. Halving stops at
    /// `floor`: a reservation that small is useless to the caller, so the
    /// last OS error is returned instead.
    ///
    /// # Errors
    ///
    /// Returns the mmap error observed once halving reaches the floor.
    pub fn reserve(size: Size, floor: Size) -> io::Result<Self> {
        let mut len = size.bytes();
        loop {
            let ptr = unsafe {
                libc::mmap(
                    null_mut(),
                    len,
                    libc::PROT_NONE,
                    libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                    -1,
                    0,
                )
            };
            if ptr != libc::MAP_FAILED {
                debug!("Reserved 0x{:x} bytes at {:p}", len, ptr);
                return Ok(Reservation {
                    ptr: ptr as *mut u8,
                    len,
                });
            }
            let err = io::Error::last_os_error();
            if len / 2 < floor.bytes() {
                return Err(err);
            }
            warn!("Reserving 0x{:x} bytes failed ({}), halving", len, err);
            len /= 2;
        }
    }

    /// Returns the first `align`-aligned address inside the reservation.
    ///
    /// `align` must be a power of two no larger than the reservation.
    pub fn aligned_start(&self, align: usize) -> *mut u8 {
        align_up(self.ptr as usize, align) as *mut u8
    }

    /// One past the last byte of the reservation.
    pub fn end(&self) -> *const u8 {
        self.ptr.wrapping_add(self.len)
    }

    /// Releases the reservation and everything mapped inside it.
    ///
    /// Consumes self. The tool itself never calls this; the reservation
    /// lives until process exit.
    pub fn dealloc(self) {
        unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.len) };
    }
}
