// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::vm::Options;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Memory Array Redcode Simulator.

Assembles each warrior file (ICWS'94 draft Redcode with EQU/FOR macros
and P-space extensions), loads them into a shared circular core and
fights the configured number of rounds. Diagnostics and results are
printed as text by default; --format json emits one machine-readable
document instead.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "redMARS",
    version = VERSION,
    about = "Memory Array Redcode Simulator (ICWS'94 + '88 compatibility)",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    /// Redcode source files, one warrior each (1 to 36).
    #[arg(value_name = "WARRIOR", required = true)]
    pub files: Vec<PathBuf>,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select output format. text is default; json emits one document with diagnostics, per-round results and final scores."
    )]
    pub format: OutputFormat,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress per-round output; only final scores are printed."
    )]
    pub quiet: bool,
    #[arg(long = "core-size", default_value_t = 8000)]
    pub core_size: i32,
    #[arg(long = "max-cycles", default_value_t = 80_000)]
    pub max_cycles: i32,
    #[arg(long = "max-length", default_value_t = 100)]
    pub max_length: usize,
    #[arg(long = "max-processes", default_value_t = 8000)]
    pub max_processes: usize,
    #[arg(long = "min-separation", default_value_t = 100)]
    pub min_separation: i32,
    #[arg(
        long = "read-limit",
        default_value_t = 0,
        long_help = "Read folding radius; 0 means unlimited."
    )]
    pub read_limit: i32,
    #[arg(
        long = "write-limit",
        default_value_t = 0,
        long_help = "Write folding radius; 0 means unlimited."
    )]
    pub write_limit: i32,
    #[arg(short = 'r', long = "rounds", default_value_t = 1)]
    pub rounds: usize,
    #[arg(
        long = "p-space-size",
        default_value_t = 0,
        long_help = "P-space cells per warrior; 0 derives core-size/16 (or the largest divisor up to 16)."
    )]
    pub p_space_size: usize,
    #[arg(
        long = "seed",
        long_help = "Explicit positioning seed. Without it the seed derives from the warriors' checksum."
    )]
    pub seed: Option<i32>,
    #[arg(
        long = "fixed-series",
        action = ArgAction::SetTrue,
        conflicts_with = "fixed_position",
        long_help = "Re-derive the seed every round so each round replays identical positions."
    )]
    pub fixed_series: bool,
    #[arg(
        long = "fixed-position",
        long_help = "Force the second warrior's load address (two-warrior battles)."
    )]
    pub fixed_position: Option<i32>,
    #[arg(
        long = "dump-core",
        action = ArgAction::SetTrue,
        long_help = "After the last round, print every core cell that differs from the initial DAT.F $0, $0."
    )]
    pub dump_core: bool,
}

/// Check cross-argument constraints and build simulator options.
pub fn validate_cli(cli: &Cli) -> Result<Options, String> {
    if cli.files.len() > crate::vm::MAX_WARRIORS {
        return Err(format!(
            "{} warrior files given, the maximum is {}",
            cli.files.len(),
            crate::vm::MAX_WARRIORS
        ));
    }
    if cli.core_size < 1 {
        return Err(format!("core size {} is not positive", cli.core_size));
    }
    if cli.max_cycles < 1 {
        return Err(format!("max cycles {} is not positive", cli.max_cycles));
    }
    if cli.max_length == 0 {
        return Err("max length must be at least 1".to_string());
    }
    if cli.rounds == 0 {
        return Err("rounds must be at least 1".to_string());
    }
    Ok(Options {
        core_size: cli.core_size,
        max_cycles: cli.max_cycles,
        max_length: cli.max_length,
        max_processes: cli.max_processes,
        min_separation: cli.min_separation,
        read_limit: cli.read_limit,
        write_limit: cli.write_limit,
        rounds: cli.rounds,
        p_space_size: cli.p_space_size,
        warriors: cli.files.len(),
        seed: cli.seed,
        fixed_series: cli.fixed_series,
        fixed_position: cli.fixed_position,
    })
}
