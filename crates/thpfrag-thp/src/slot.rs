use std::ptr::write_volatile;

use thiserror::Error;
use thpfrag_core::memory::{Residency, ResidencyError, page_size, pmd_size};
use thpfrag_core::util::madvise;

/// Errors that can happen while claiming a slot or advising claimed slots.
#[derive(Debug, Error)]
pub enum SlotError {
    /// The kernel could not place the fixed mapping at the requested
    /// address.
    #[error("mapping not placed at the requested address")]
    Placement(#[source] std::io::Error),
    /// The populated slot is not backed by a single huge page.
    #[error("slot not backed by a huge page")]
    NotHugeBacked,
    /// An advisory kernel call failed on an already-committed range.
    #[error("madvise({advice}) failed")]
    Advise {
        /// The advice that failed
        advice: &'static str,
        /// The underlying OS error
        #[source]
        source: std::io::Error,
    },
    /// Reading the page residency map failed.
    #[error(transparent)]
    Residency(#[from] ResidencyError),
}

impl SlotError {
    /// Whether this failure is an expected contention outcome that the
    /// allocation loop retries, as opposed to a fatal environment failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, SlotError::Placement(_) | SlotError::NotHugeBacked)
    }
}

/// Strategy seam for the allocation loop.
///
/// An implementation claims one slot at a fixed address and, once the loop
/// halts, pins the claimed range against automatic huge page promotion.
pub trait ClaimSlot {
    /// Size in bytes of one slot.
    fn slot_size(&self) -> usize;

    /// Attempts to claim the slot at `addr` as a resident, huge-page-backed
    /// mapping.
    ///
    /// On any failure the slot's mapping may be left in a partial state;
    /// the caller abandons it and either retries the same address or halts.
    ///
    /// # Errors
    ///
    /// Transient failures (see [`SlotError::is_transient`]) drive the
    /// caller's retry logic; everything else is fatal.
    fn claim(&mut self, addr: *mut u8) -> Result<(), SlotError>;

    /// Excludes `[start, start + len)` from automatic huge page promotion.
    ///
    /// Invoked once after the allocation loop halts, so the kernel cannot
    /// re-collapse ranges the fragmentation pass is about to shatter. A
    /// zero-length range succeeds.
    ///
    /// # Errors
    ///
    /// Any failure is fatal to the caller.
    fn disable_collapse(&mut self, start: *mut u8, len: usize) -> Result<(), SlotError>;
}

/// Claims huge-page-backed slots out of a `PROT_NONE` reservation.
///
/// Each claim replaces one slot of the reservation with a fixed anonymous
/// read/write mapping, hints the kernel towards huge page backing, faults
/// the slot in, and verifies the backing through the page residency map.
pub struct ThpClaimer {
    pmd_size: usize,
    page_size: usize,
    residency: Residency,
}

impl ThpClaimer {
    /// Creates a claimer for the detected page and THP sizes.
    ///
    /// # Errors
    ///
    /// Fails if the page residency map cannot be opened.
    pub fn new() -> Result<Self, ResidencyError> {
        Ok(ThpClaimer {
            pmd_size: pmd_size(),
            page_size: page_size(),
            residency: Residency::new()?,
        })
    }
}

impl ClaimSlot for ThpClaimer {
    fn slot_size(&self) -> usize {
        self.pmd_size
    }

    fn claim(&mut self, addr: *mut u8) -> Result<(), SlotError> {
        let mapped = unsafe {
            libc::mmap(
                addr as *mut libc::c_void,
                self.pmd_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_FIXED,
                -1,
                0,
            )
        };
        if mapped != addr as *mut libc::c_void {
            return Err(SlotError::Placement(std::io::Error::last_os_error()));
        }

        // Precondition for huge backing: the hint must land before the
        // first write faults the slot in, since it does not retroactively
        // promote already-populated memory. At this point the slot also
        // merges with neighbouring huge page VMAs, keeping the VMA count
        // flat across millions of slots.
        madvise(addr, self.pmd_size, libc::MADV_HUGEPAGE).map_err(|source| SlotError::Advise {
            advice: "MADV_HUGEPAGE",
            source,
        })?;

        // Keep KSM off the slot; a same-content merge would split the huge
        // page once the system comes under memory pressure.
        madvise(addr, self.pmd_size, libc::MADV_UNMERGEABLE).map_err(|source| {
            SlotError::Advise {
                advice: "MADV_UNMERGEABLE",
                source,
            }
        })?;

        // Fault the slot in.
        unsafe { write_volatile(addr, 1) };

        // A PMD-mapped THP faults in as one piece, so an unbacked last base
        // page means the kernel fell back to base page granularity.
        let last_page = addr.wrapping_add(self.pmd_size - self.page_size);
        if !self.residency.is_resident(last_page)? {
            return Err(SlotError::NotHugeBacked);
        }
        Ok(())
    }

    fn disable_collapse(&mut self, start: *mut u8, len: usize) -> Result<(), SlotError> {
        madvise(start, len, libc::MADV_NOHUGEPAGE).map_err(|source| SlotError::Advise {
            advice: "MADV_NOHUGEPAGE",
            source,
        })
    }
}
