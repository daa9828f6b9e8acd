use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::info;
use thpfrag_core::util::{NamedProgress, madvise};

use crate::driver::ThpRange;
use crate::slot::SlotError;

/// Shatters every claimed slot down to a single resident base page.
///
/// For each slot, the tail `[slot + page_size, slot + slot_size)` is first
/// marked cold, which splits the huge page without parking it on the
/// deferred split queue, and then discarded outright. The virtual mappings
/// survive; only the physical backing past the first base page goes away.
///
/// # Errors
///
/// Any madvise failure is fatal: once the slots are committed there is no
/// recovery path, and the error carries the OS code for the exit status.
pub fn fragment(
    range: &ThpRange,
    page_size: usize,
    progress: Option<&MultiProgress>,
) -> Result<(), SlotError> {
    let tail_len = range.slot_size() - page_size;
    let bar = progress.map(|p| {
        p.add(
            ProgressBar::new(range.slot_count() as u64)
                .with_style(ProgressStyle::named_bar("Shattering THPs")),
        )
    });

    for slot in range.slots() {
        let tail = slot.wrapping_add(page_size);
        madvise(tail, tail_len, libc::MADV_COLD).map_err(|source| SlotError::Advise {
            advice: "MADV_COLD",
            source,
        })?;
        madvise(tail, tail_len, libc::MADV_DONTNEED).map_err(|source| SlotError::Advise {
            advice: "MADV_DONTNEED",
            source,
        })?;
        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }
    if let Some(bar) = &bar {
        bar.finish();
    }

    info!("Shattered {} THP slots", range.slot_count());
    Ok(())
}
