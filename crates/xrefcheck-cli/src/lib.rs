//! CLI wiring for the `xrefcheck` binary.
//!
//! Exit codes: `0` when every reference verified, `1` when scan or verify
//! errors were found (or the run was interrupted), `2` for configuration
//! and environment failures.

mod cli;
mod commands;
mod output;
mod utils;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use crate::cli::{Cli, ColorArg, Commands};

/// Parse arguments, dispatch, and translate the outcome to an exit code.
pub async fn run() -> ExitCode {
    let parsed = Cli::parse();

    let (verbose, color) = match &parsed.command {
        Some(Commands::Check(args)) => (args.verbose, args.color),
        Some(Commands::DumpConfig) => (false, ColorArg::Auto),
        None => (parsed.check.verbose, parsed.check.color),
    };
    if let Err(err) = utils::logging::init(verbose, color) {
        eprintln!("Error: {err:#}");
        return ExitCode::from(2);
    }

    let outcome = match parsed.command {
        Some(Commands::DumpConfig) => commands::dump_config::run(),
        Some(Commands::Check(args)) => commands::check::run(args).await,
        None => commands::check::run(parsed.check).await,
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", format!("Error: {err:#}").red());
            ExitCode::from(2)
        }
    }
}
