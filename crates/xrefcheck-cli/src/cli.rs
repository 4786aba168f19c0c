//! Command-line interface for `xrefcheck`.
//!
//! `check` is the default command: running `xrefcheck` with no subcommand
//! scans and verifies the current repository. All check options are also
//! accepted at the top level, so `xrefcheck --root docs` works without
//! spelling out `check`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use xrefcheck_core::VerifyMode;

#[derive(Parser, Debug)]
#[command(name = "xrefcheck")]
#[command(version)]
#[command(about = "Verify cross references in repository documentation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub check: CheckArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the repository and verify every reference (the default)
    Check(CheckArgs),
    /// Print the built-in default configuration as YAML
    DumpConfig,
}

#[derive(Args, Clone, Debug, Default)]
pub struct CheckArgs {
    /// Configuration file; defaults to `.xrefcheck.yaml` and friends under the root
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Repository root to scan
    #[arg(long, value_name = "PATH", default_value = ".")]
    pub root: PathBuf,

    /// Which verification families to run
    #[arg(long, value_enum, default_value_t = ModeArg::Full)]
    pub mode: ModeArg,

    /// Dump the scanned repository structure before verification
    #[arg(short, long)]
    pub verbose: bool,

    /// Show a live progress bar (default outside CI)
    #[arg(long, overrides_with = "no_progress_bar")]
    pub progress_bar: bool,

    /// Never show a progress bar
    #[arg(long, overrides_with = "progress_bar")]
    pub no_progress_bar: bool,

    /// When to color the output
    #[arg(long, value_enum, default_value_t = ColorArg::Auto)]
    pub color: ColorArg,

    /// Scan untracked files as well
    #[arg(long)]
    pub include_untracked: bool,

    /// Extra glob for files to drop from the scan (repeatable)
    #[arg(long = "ignored", value_name = "GLOB")]
    pub ignored: Vec<String>,

    /// Extra glob for files whose own references are not verified (repeatable)
    #[arg(long = "ignore-refs-from", value_name = "GLOB")]
    pub ignore_refs_from: Vec<String>,

    /// Extra glob for local targets accepted without checking (repeatable)
    #[arg(long = "ignore-local-refs-to", value_name = "GLOB")]
    pub ignore_local_refs_to: Vec<String>,

    /// Extra regex for external URLs accepted without probing (repeatable)
    #[arg(long = "ignore-external-refs-to", value_name = "REGEX")]
    pub ignore_external_refs_to: Vec<String>,

    /// Timeout per external request, e.g. `10s` or `500ms`
    #[arg(long = "external-timeout", value_name = "DURATION", value_parser = parse_duration)]
    pub external_timeout: Option<Duration>,

    /// Treat 401 and 403 responses as healthy
    #[arg(long, overrides_with = "no_ignore_auth_failures")]
    pub ignore_auth_failures: bool,

    /// Treat 401 and 403 responses as failures
    #[arg(long, overrides_with = "ignore_auth_failures")]
    pub no_ignore_auth_failures: bool,

    /// Wait applied to 429 responses lacking a Retry-After header
    #[arg(long = "default-retry-after", value_name = "DURATION", value_parser = parse_duration)]
    pub default_retry_after: Option<Duration>,

    /// Rate-limit retries per URL before giving up
    #[arg(long = "max-retries", value_name = "N")]
    pub max_retries: Option<usize>,
}

impl CheckArgs {
    /// Explicit progress-bar choice, if either flag was given.
    pub fn progress_bar_override(&self) -> Option<bool> {
        if self.progress_bar {
            Some(true)
        } else if self.no_progress_bar {
            Some(false)
        } else {
            None
        }
    }

    /// Explicit auth-failure choice, if either flag was given.
    pub fn auth_failures_override(&self) -> Option<bool> {
        if self.ignore_auth_failures {
            Some(true)
        } else if self.no_ignore_auth_failures {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Only local file and anchor checks
    Local,
    /// Only external URL probing
    External,
    /// Everything
    #[default]
    Full,
}

impl From<ModeArg> for VerifyMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Local => Self::LocalOnly,
            ModeArg::External => Self::ExternalOnly,
            ModeArg::Full => Self::Full,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorArg {
    Always,
    Never,
    #[default]
    Auto,
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    humantime::parse_duration(text).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_check_with_top_level_args() {
        let cli = Cli::try_parse_from(["xrefcheck", "--root", "docs", "--mode", "local"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.check.root, PathBuf::from("docs"));
        assert_eq!(cli.check.mode, ModeArg::Local);
    }

    #[test]
    fn durations_parse_with_unit_suffixes() {
        let cli =
            Cli::try_parse_from(["xrefcheck", "check", "--external-timeout", "500ms"]).unwrap();
        let Some(Commands::Check(args)) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.external_timeout, Some(Duration::from_millis(500)));

        assert!(Cli::try_parse_from(["xrefcheck", "--external-timeout", "later"]).is_err());
    }

    #[test]
    fn later_flag_of_a_pair_wins() {
        let cli = Cli::try_parse_from(["xrefcheck", "--progress-bar", "--no-progress-bar"]).unwrap();
        assert_eq!(cli.check.progress_bar_override(), Some(false));

        let cli = Cli::try_parse_from([
            "xrefcheck",
            "--no-ignore-auth-failures",
            "--ignore-auth-failures",
        ])
        .unwrap();
        assert_eq!(cli.check.auth_failures_override(), Some(true));

        let cli = Cli::try_parse_from(["xrefcheck"]).unwrap();
        assert_eq!(cli.check.progress_bar_override(), None);
        assert_eq!(cli.check.auth_failures_override(), None);
    }

    #[test]
    fn repeatable_exclusion_flags_accumulate() {
        let cli = Cli::try_parse_from([
            "xrefcheck",
            "--ignored",
            "vendor/**",
            "--ignored",
            "dist/**",
        ])
        .unwrap();
        assert_eq!(cli.check.ignored, vec!["vendor/**", "dist/**"]);
    }
}
