use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, info};
use serde::Serialize;
use thpfrag_core::util::NamedProgress;

use crate::slot::{ClaimSlot, SlotError};

/// Number of consecutive failed claims at one cursor address before the
/// allocation loop halts.
pub const RETRY_BUDGET: u32 = 1000;

/// Why the allocation loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Halt {
    /// The cursor reached the end of the reservation.
    EndOfReservation,
    /// The retry budget was exhausted at one cursor address.
    RetryBudget,
}

/// The slot-aligned span the allocation loop managed to claim.
///
/// Covers `[start, start + len)` where `len` is a multiple of the slot size
/// and may be zero.
#[derive(Clone, Copy, Debug)]
pub struct ThpRange {
    start: *mut u8,
    len: usize,
    slot_size: usize,
}

impl ThpRange {
    /// Base address of the first slot.
    pub fn start(&self) -> *mut u8 {
        self.start
    }

    /// Length of the claimed span in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no slot was claimed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of one slot in bytes.
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Number of claimed slots.
    pub fn slot_count(&self) -> usize {
        self.len / self.slot_size
    }

    /// Iterates over the base address of every claimed slot.
    pub fn slots(&self) -> impl Iterator<Item = *mut u8> + '_ {
        let start = self.start;
        let slot_size = self.slot_size;
        (0..self.slot_count()).map(move |i| start.wrapping_add(i * slot_size))
    }
}

/// Outcome of the allocation loop.
#[derive(Debug)]
pub struct Allocation {
    /// The claimed span
    pub range: ThpRange,
    /// Why the loop stopped
    pub halt: Halt,
}

/// Walks `[start, end)` in slot-size strides, claiming each slot through
/// `claimer`.
///
/// The cursor only advances past verified slots. A transient claim failure
/// is retried at the same cursor address; after `retry_budget` consecutive
/// failures the loop halts and keeps everything claimed so far. Fatal
/// failures propagate immediately.
///
/// After the loop halts, automatic huge page promotion is disabled over the
/// claimed span (a zero-length span included), so the kernel cannot quietly
/// re-collapse memory the fragmentation pass is about to shatter.
///
/// # Arguments
///
/// * `claimer` - The slot claim strategy
/// * `start` - Slot-aligned start of the walk
/// * `end` - One past the last usable byte
/// * `retry_budget` - Consecutive transient failures tolerated per address
/// * `progress` - Optional progress reporting
///
/// # Errors
///
/// Returns non-transient claim errors and `disable_collapse` failures.
pub fn allocate(
    claimer: &mut dyn ClaimSlot,
    start: *mut u8,
    end: *const u8,
    retry_budget: u32,
    progress: Option<&MultiProgress>,
) -> Result<Allocation, SlotError> {
    let slot_size = claimer.slot_size();
    assert!(
        (start as usize).is_multiple_of(slot_size),
        "start 0x{:x} is not slot-aligned",
        start as usize
    );

    let total_slots = (end as usize).saturating_sub(start as usize) / slot_size;
    let bar = progress.map(|p| {
        p.add(
            ProgressBar::new(total_slots as u64)
                .with_style(ProgressStyle::named_bar("Claiming THPs")),
        )
    });

    let mut cursor = start;
    let mut retries = 0u32;
    let halt = loop {
        if cursor as usize + slot_size > end as usize {
            break Halt::EndOfReservation;
        }
        match claimer.claim(cursor) {
            Ok(()) => {
                cursor = cursor.wrapping_add(slot_size);
                retries = 0;
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
            }
            Err(e) if e.is_transient() => {
                debug!("Claim at {:p} failed: {}", cursor, e);
                retries += 1;
                if retries >= retry_budget {
                    break Halt::RetryBudget;
                }
            }
            Err(e) => return Err(e),
        }
    };
    if let Some(bar) = &bar {
        bar.finish();
    }

    let len = cursor as usize - start as usize;
    claimer.disable_collapse(start, len)?;
    info!("Claimed {} THP slots ({:?})", len / slot_size, halt);
    Ok(Allocation {
        range: ThpRange {
            start,
            len,
            slot_size,
        },
        halt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLOT_SIZE: usize = 2 << 20;
    const BASE: *mut u8 = 0x2000_0000_0000 as *mut u8;

    /// Claim stub that fails `fails_per_slot` times before each success and
    /// records every call.
    struct MockClaimer {
        fails_per_slot: u32,
        failed: u32,
        fatal: bool,
        claims: Vec<*mut u8>,
        disabled: Option<(*mut u8, usize)>,
    }

    impl MockClaimer {
        fn new(fails_per_slot: u32) -> Self {
            MockClaimer {
                fails_per_slot,
                failed: 0,
                fatal: false,
                claims: vec![],
                disabled: None,
            }
        }
    }

    impl ClaimSlot for MockClaimer {
        fn slot_size(&self) -> usize {
            SLOT_SIZE
        }

        fn claim(&mut self, addr: *mut u8) -> Result<(), SlotError> {
            self.claims.push(addr);
            if self.fatal {
                return Err(SlotError::Advise {
                    advice: "MADV_HUGEPAGE",
                    source: std::io::Error::from_raw_os_error(libc::ENOMEM),
                });
            }
            if self.failed < self.fails_per_slot {
                self.failed += 1;
                return Err(SlotError::NotHugeBacked);
            }
            self.failed = 0;
            Ok(())
        }

        fn disable_collapse(&mut self, start: *mut u8, len: usize) -> Result<(), SlotError> {
            self.disabled = Some((start, len));
            Ok(())
        }
    }

    fn end_after(slots: usize) -> *const u8 {
        BASE.wrapping_add(slots * SLOT_SIZE)
    }

    #[test]
    fn test_allocates_to_end_of_reservation() {
        let slots = (1usize << 30) / SLOT_SIZE;
        let mut claimer = MockClaimer::new(0);
        let allocation =
            allocate(&mut claimer, BASE, end_after(slots), RETRY_BUDGET, None).unwrap();
        assert_eq!(allocation.halt, Halt::EndOfReservation);
        assert_eq!(allocation.range.slot_count(), 512);
        assert_eq!(allocation.range.start(), BASE);
        assert_eq!(claimer.claims.len(), 512);
        assert_eq!(claimer.disabled, Some((BASE, slots * SLOT_SIZE)));
        for (i, slot) in allocation.range.slots().enumerate() {
            assert_eq!(slot, BASE.wrapping_add(i * SLOT_SIZE));
        }
    }

    #[test]
    fn test_halts_after_retry_budget() {
        let mut claimer = MockClaimer::new(u32::MAX);
        let allocation = allocate(&mut claimer, BASE, end_after(16), RETRY_BUDGET, None).unwrap();
        assert_eq!(allocation.halt, Halt::RetryBudget);
        assert!(allocation.range.is_empty());
        assert_eq!(allocation.range.slot_count(), 0);
        // All attempts target the same address, and there are exactly as
        // many as the budget allows.
        assert_eq!(claimer.claims.len(), RETRY_BUDGET as usize);
        assert!(claimer.claims.iter().all(|&addr| addr == BASE));
        assert_eq!(claimer.disabled, Some((BASE, 0)));
    }

    #[test]
    fn test_retries_same_address_then_advances() {
        let mut claimer = MockClaimer::new(2);
        let allocation = allocate(&mut claimer, BASE, end_after(3), RETRY_BUDGET, None).unwrap();
        assert_eq!(allocation.halt, Halt::EndOfReservation);
        assert_eq!(allocation.range.slot_count(), 3);
        // Two failures and one success per slot, always at the slot's own
        // address.
        assert_eq!(claimer.claims.len(), 9);
        for (i, &addr) in claimer.claims.iter().enumerate() {
            assert_eq!(addr, BASE.wrapping_add(i / 3 * SLOT_SIZE));
        }
    }

    #[test]
    fn test_fatal_error_propagates() {
        let mut claimer = MockClaimer::new(0);
        claimer.fatal = true;
        let result = allocate(&mut claimer, BASE, end_after(4), RETRY_BUDGET, None);
        assert!(matches!(result, Err(SlotError::Advise { .. })));
        assert_eq!(claimer.disabled, None);
    }

    #[test]
    fn test_empty_reservation() {
        let mut claimer = MockClaimer::new(0);
        let allocation = allocate(&mut claimer, BASE, end_after(0), RETRY_BUDGET, None).unwrap();
        assert_eq!(allocation.halt, Halt::EndOfReservation);
        assert!(allocation.range.is_empty());
        assert!(claimer.claims.is_empty());
        assert_eq!(claimer.disabled, Some((BASE, 0)));
    }

    #[test]
    fn test_slots_within_reservation() {
        let mut claimer = MockClaimer::new(1);
        let allocation = allocate(&mut claimer, BASE, end_after(8), 4, None).unwrap();
        let end = end_after(8) as usize;
        assert!(allocation.range.slot_count() <= 8);
        for slot in allocation.range.slots() {
            assert!((slot as usize) >= BASE as usize);
            assert!((slot as usize) + SLOT_SIZE <= end);
        }
    }
}
