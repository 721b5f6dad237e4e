//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bartrack", version, about = "Bar tracking CLI")]
pub struct Cli {
    /// Directory holding per-user parameter files
    #[arg(long, value_name = "DIR", default_value = "etc/params")]
    pub params_dir: PathBuf,

    /// Parameter profile to load
    #[arg(long, value_name = "NAME", default_value = "default")]
    pub user: String,

    /// Emit JSONL on stdout (logs move to stderr)
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a recorded frame log through the fusion pipeline
    Replay {
        /// Frame log: records of u64-le timestamp-ms, u8 length, frame bytes
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        /// Emit every Nth state snapshot (0 = rep events only)
        #[arg(long, value_name = "N", default_value_t = 20)]
        every: u32,
    },
    /// Synthesize a set of reps and run it through the full pipeline
    Simulate {
        /// Number of reps in the set
        #[arg(long, default_value_t = 3)]
        reps: u32,
        /// Rep depth in centimeters
        #[arg(long, value_name = "CM", default_value_t = 40.0)]
        depth_cm: f64,
    },
    /// Print the effective parameter bundle for the selected user
    ShowParams,
}
