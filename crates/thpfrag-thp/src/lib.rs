//! Transparent Huge Page (THP) claim-and-shatter engine.
//!
//! This crate turns a [`thpfrag_core::memory::Reservation`] into maximal
//! physical fragmentation in three sequential phases:
//!
//! 1. Walk the reservation in THP-sized strides and claim each slot as a
//!    resident, huge-page-backed mapping ([`allocate`] driving a
//!    [`ClaimSlot`] implementation such as [`ThpClaimer`]).
//! 2. Pin the claimed range against khugepaged re-collapse.
//! 3. Shatter every claimed slot down to a single resident base page while
//!    keeping the virtual mapping intact ([`fragment`]).
//!
//! Other processes then find the huge-page-eligible physical capacity
//! consumed without most of it being resident.
//!
//! # Platform Requirements
//!
//! - x86_64 Linux with THP support enabled
//! - THP should be set to "always" or "madvise" mode

#![warn(missing_docs)]

mod driver;
mod fragment;
mod slot;

pub use self::driver::{Allocation, Halt, RETRY_BUDGET, ThpRange, allocate};
pub use self::fragment::fragment;
pub use self::slot::{ClaimSlot, SlotError, ThpClaimer};
