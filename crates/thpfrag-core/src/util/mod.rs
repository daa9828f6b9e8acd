//! Utility types and helpers used throughout the thpfrag tool.
//!
//! This module provides:
//! - [`Size`] - Memory size representation
//! - Address and madvise helpers ([`align_up`], [`madvise`])
//! - Progress reporting utilities ([`NamedProgress`])

mod alloc_util;
mod named_progress;
mod size;

pub use self::alloc_util::*;
pub use self::named_progress::NamedProgress;
pub use self::size::Size;
