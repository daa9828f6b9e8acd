use pagemap2::{PageMapError, VirtualMemoryArea};
use thiserror::Error;

use crate::memory::page_size;

/// Errors that can happen while reading the kernel's page residency map.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ResidencyError(#[from] PageMapError);

/// Page residency probe backed by `/proc/self/pagemap`.
///
/// Reports, per base page of virtual address space, whether the page
/// currently has physical backing committed by the kernel. The probe is
/// read-only and idempotent: two probes of the same address without
/// intervening memory operations yield the same answer.
pub struct Residency {
    pagemap: pagemap2::PageMap,
    page_mask: u64,
}

impl Residency {
    /// Opens the residency map of the current process.
    ///
    /// # Errors
    ///
    /// Returns an error if `/proc/self/pagemap` cannot be opened.
    pub fn new() -> Result<Self, ResidencyError> {
        Ok(Residency {
            pagemap: pagemap2::PageMap::new(std::process::id() as u64)?,
            page_mask: page_size() as u64 - 1,
        })
    }

    /// Reports whether the base page containing `addr` is resident.
    ///
    /// A page counts as resident when it is present in RAM or swapped out;
    /// in both cases the kernel has committed backing for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the pagemap entry for `addr` cannot be read.
    pub fn is_resident(&mut self, addr: *const u8) -> Result<bool, ResidencyError> {
        let vaddr_start_page = addr as u64 & !self.page_mask;
        let vaddr_end_page = vaddr_start_page + self.page_mask;

        let region = VirtualMemoryArea::from((vaddr_start_page, vaddr_end_page));
        let entries = self.pagemap.pagemap_vma(&region)?;
        assert_eq!(
            entries.len(),
            1,
            "Got {} pagemap entries for virtual address 0x{:x}, expected exactly one",
            entries.len(),
            addr as usize
        );
        Ok(entries[0].present() || entries[0].swapped())
    }
}
