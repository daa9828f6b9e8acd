//! Memory management abstractions for the thpfrag tool.
//!
//! The `memory` module provides:
//! - [`Reservation`]: a huge anonymous `PROT_NONE` address-space reservation.
//! - [`Residency`]: per-base-page physical residency probes over the
//!   kernel's pagemap interface.
//! - [`page_size`] / [`pmd_size`]: runtime page and THP size detection.
//! - [`thp_enabled_mode`]: the system-wide transparent huge page mode.

mod page_sizes;
mod reservation;
mod residency;

pub use self::page_sizes::{DEFAULT_PMD_SIZE, page_size, pmd_size, thp_enabled_mode};
pub use self::reservation::Reservation;
pub use self::residency::{Residency, ResidencyError};
