//! The `dump-config` command: print the built-in defaults so users can
//! bootstrap their own `.xrefcheck.yaml`.

use std::process::ExitCode;

use anyhow::Result;

use xrefcheck_core::Config;

pub fn run() -> Result<ExitCode> {
    print!("{}", Config::default().to_yaml()?);
    Ok(ExitCode::SUCCESS)
}
