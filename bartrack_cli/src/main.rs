#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! CLI entrypoint for the bar tracker.
//!
//! Responsibilities:
//! - Load the per-user parameter bundle and assemble the fusion loop
//! - Initialize tracing (stderr; JSONL data stays on stdout in `--json`)
//! - Replay recorded frame logs or simulate synthetic sets
//! - Map errors to stable exit codes

mod cli;
mod error_fmt;
mod replay;
mod report;
mod simulate;
mod tracing_setup;

use clap::Parser;
use eyre::WrapErr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bartrack_core::fusion::FusionLoop;
use bartrack_core::store::{FileBlobStore, ParamRepository};
use cli::{Cli, Commands};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use tracing_setup::init_tracing;

fn main() {
    let _ = color_eyre::install();

    let cli = Cli::parse();
    init_tracing(cli.json, &cli.log_level);
    let interrupted = interrupt_flag();

    let json = cli.json;
    if let Err(report) = run(cli, &interrupted) {
        // Machine consumers get the error on stdout with everything else;
        // humans get it on stderr with a fix hint.
        if json {
            println!("{}", format_error_json(&report));
        } else {
            eprintln!("{}", humanize(&report));
        }
        std::process::exit(exit_code_for_error(&report));
    }
}

/// Ctrl-C raises a flag that the long-running commands poll between
/// records; nothing is torn down mid-sample.
fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let raised = Arc::clone(&flag);
    if let Err(e) = ctrlc::set_handler(move || {
        raised.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(error = %e, "running without an interrupt handler");
    }
    flag
}

fn run(cli: Cli, interrupted: &Arc<AtomicBool>) -> eyre::Result<()> {
    // Per-user parameters; missing or corrupt files fall back to defaults.
    let store = FileBlobStore::new(&cli.params_dir);
    let repo = ParamRepository::open(cli.user, Box::new(store));
    let params = *repo.params();

    match cli.cmd {
        Commands::Replay { input, every } => {
            let mut fusion = FusionLoop::new(params).wrap_err("assemble fusion loop")?;
            replay::run_replay(&mut fusion, &input, every, cli.json, interrupted)
        }
        Commands::Simulate { reps, depth_cm } => {
            let mut fusion = FusionLoop::new(params).wrap_err("assemble fusion loop")?;
            simulate::run_simulate(&mut fusion, reps, depth_cm, cli.json)
        }
        Commands::ShowParams => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&params).wrap_err("serialize params")?
                );
            } else {
                let blob = bartrack_config::to_blob(&params)?;
                print!("{}", String::from_utf8_lossy(&blob));
            }
            Ok(())
        }
    }
}
