//! Binary crate for the thpfrag tool.
//!
//! Hosts the `thp_fragment` binary plus the logging bootstrap shared with
//! its tests. The library crates live under `crates/`; this crate only
//! wires them to a command line.

use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

/// Initializes env_logger routed through an indicatif [`MultiProgress`],
/// so log lines do not tear the progress bars.
///
/// The default filter is `info`; override with `RUST_LOG`.
pub fn init_logging_with_progress() -> anyhow::Result<MultiProgress> {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    let progress = MultiProgress::new();
    LogWrapper::new(progress.clone(), logger).try_init()?;
    Ok(progress)
}
