//! Entrypoint for the `xrefcheck` binary.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    xrefcheck_cli::run().await
}
