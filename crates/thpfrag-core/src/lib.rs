//! # thpfrag core
//!
//! `thpfrag-core` is the foundational library for the thpfrag tool. It
//! provides the memory plumbing the fragmentation engine is built on:
//!
//! - [`memory::Reservation`] - a very large, unpopulated, access-protected
//!   address-space reservation that huge page slots are later carved out of.
//! - [`memory::Residency`] - per-base-page physical residency probes backed
//!   by the kernel's `/proc/self/pagemap` interface.
//! - [`memory::page_size`] / [`memory::pmd_size`] - runtime detection of the
//!   base page size and the kernel's PMD-level transparent huge page size.
//! - [`util`] module - the [`util::Size`] type, madvise wrappers, and
//!   progress reporting helpers.
//!
//! ## Platform Support
//!
//! This crate targets x86_64 Linux with transparent huge page support. The
//! residency probes read `/proc/self/pagemap`; the present/swapped bits are
//! available without elevated privileges.

#![warn(missing_docs)]

pub mod memory;
pub mod util;
