use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::MultiProgress;
use log::{error, info, warn};
use serde::Serialize;
use thpfrag_core::memory::{Reservation, page_size, pmd_size, thp_enabled_mode};
use thpfrag_core::util::Size;
use thpfrag_thp::{Halt, RETRY_BUDGET, ThpClaimer, allocate, fragment};

/// CLI arguments for the `thp_fragment` binary.
///
/// Running without any arguments reproduces the classic behavior: reserve
/// 32 TiB of address space, claim as many THPs as possible, then shatter
/// each one down to a single resident base page.
#[derive(Debug, Parser, Serialize, Clone)]
struct CliArgs {
    /// Address space to reserve, in GiB (halved automatically when the
    /// kernel cannot place a region that large).
    #[clap(long = "reserve-gb", default_value = "32768")]
    reserve_gb: usize,
    /// Consecutive failed claims at one address before the loop gives up.
    #[clap(long = "retry-budget", default_value_t = RETRY_BUDGET)]
    retry_budget: u32,
    /// Stop after the allocation loop, leaving the THPs intact.
    #[clap(long = "skip-fragment")]
    skip_fragment: bool,
    /// Output file for the run report (JSON format).
    #[clap(long = "output")]
    output: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunReport {
    args: CliArgs,
    page_size: usize,
    pmd_size: usize,
    reserved_bytes: usize,
    claimed_slots: usize,
    halt: Halt,
    claim_duration_ms: u64,
    shatter_duration_ms: Option<u64>,
}

impl RunReport {
    fn save_to_file(&self, filename: &str) -> Result<()> {
        let file = File::create(filename)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!("Run report saved to {}", filename);
        Ok(())
    }
}

fn run(args: &CliArgs, progress: &MultiProgress) -> Result<RunReport> {
    match thp_enabled_mode() {
        Some(mode) if mode == "never" => {
            warn!("Transparent hugepages are disabled (mode 'never'); no slot will verify")
        }
        Some(mode) => info!("Transparent hugepage mode: {}", mode),
        None => warn!("Cannot determine the transparent hugepage mode"),
    }

    let page_size = page_size();
    let pmd_size = pmd_size();
    info!("Base page size {} bytes, THP size {} bytes", page_size, pmd_size);

    // The kernel commits nothing for the reservation; slots become real
    // memory one fixed mapping at a time.
    let reservation = Reservation::reserve(Size::GB(args.reserve_gb), Size::B(pmd_size))
        .context("reserving address space")?;

    let mut claimer = ThpClaimer::new().context("opening the page residency map")?;
    let start = reservation.aligned_start(pmd_size);

    let claim_start = Instant::now();
    let allocation = allocate(
        &mut claimer,
        start,
        reservation.end(),
        args.retry_budget,
        Some(progress),
    )
    .context("claiming THP slots")?;
    let claim_duration_ms = claim_start.elapsed().as_millis() as u64;

    println!("Allocated {} THPs", allocation.range.slot_count());

    let shatter_duration_ms = if args.skip_fragment {
        None
    } else {
        let shatter_start = Instant::now();
        fragment(&allocation.range, page_size, Some(progress))
            .context("shattering THP slots")?;
        Some(shatter_start.elapsed().as_millis() as u64)
    };

    // The reservation and the shattered slots stay mapped until process
    // exit; their single resident base pages are the whole point.
    Ok(RunReport {
        args: args.clone(),
        page_size,
        pmd_size,
        reserved_bytes: reservation.len,
        claimed_slots: allocation.range.slot_count(),
        halt: allocation.halt,
        claim_duration_ms,
        shatter_duration_ms,
    })
}

/// Maps a fatal error to the process exit code: the OS error code where one
/// exists in the chain, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| {
            cause
                .downcast_ref::<std::io::Error>()
                .and_then(|io| io.raw_os_error())
        })
        .unwrap_or(1)
}

fn main() {
    let args = CliArgs::parse();
    let progress = match thpfrag_bin::init_logging_with_progress() {
        Ok(progress) => progress,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:?}", e);
            std::process::exit(1);
        }
    };
    info!("CLI args: {:?}", args);

    match run(&args, &progress) {
        Ok(report) => {
            if let Some(output) = &args.output {
                if let Err(e) = report.save_to_file(output) {
                    error!("{:#}", e);
                    std::process::exit(exit_code(&e));
                }
            }
        }
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(exit_code(&e));
        }
    }
}
