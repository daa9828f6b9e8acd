//! # thpfrag
//!
//! thpfrag deliberately fragments a process's huge-page-backed address
//! space to simulate memory pressure: with memory compaction out of the
//! picture, other processes can no longer allocate transparent huge pages.
//!
//! The tool runs three phases in sequence:
//!
//! 1. Reserve a very large, contiguous, unpopulated virtual region
//!    (default 32 TiB, halved until the kernel accepts it).
//! 2. Walk the region in THP-sized strides and claim each slot as a
//!    resident, huge-page-backed mapping, retrying contended slots up to a
//!    bounded budget.
//! 3. Shatter every claimed slot: release all but one base page of physical
//!    backing while keeping the virtual mapping intact.
//!
//! ## Quickstart guide
//!
//! ```sh
//! # Build and run the tool with its classic defaults
//! cargo run --release --bin=thp_fragment
//!
//! # Smaller reservation, keep the THPs instead of shattering them
//! cargo run --release --bin=thp_fragment -- --reserve-gb 1 --skip-fragment
//! ```
//!
//! The one line of plain stdout output is the number of THPs claimed before
//! the loop halted; pass `--output report.json` for a machine-readable run
//! report.
//!
//! ## Members
//!
//! - [`memory`] / [`util`] (from `thpfrag-core`): reservations, pagemap
//!   residency probes, page size detection, sizes and madvise helpers.
//! - [`thp`] (from `thpfrag-thp`): the claim loop state machine and the
//!   fragmentation pass.
//! - `thpfrag-bin`: the `thp_fragment` binary.

pub use thpfrag_core::memory;
pub use thpfrag_core::util;
pub use thpfrag_thp as thp;
