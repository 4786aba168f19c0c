//! Logging initialization and color control.

use anyhow::Result;
use colored::control as color_control;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::cli::ColorArg;

/// Set up the tracing subscriber and resolve the color mode.
///
/// Diagnostics go to stderr so report output on stdout stays clean. The
/// `NO_COLOR` convention wins over auto-detection but not over an explicit
/// `--color always`.
pub fn init(verbose: bool, color: ColorArg) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match color {
        ColorArg::Always => color_control::set_override(true),
        ColorArg::Never => color_control::set_override(false),
        ColorArg::Auto => {
            if std::env::var_os("NO_COLOR").is_some() {
                color_control::set_override(false);
            }
        }
    }
    Ok(())
}
