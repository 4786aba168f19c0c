//! The `check` command: scan, verify, report.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use xrefcheck_core::{
    Config, MarkdownScanner, RepoScanner, ScanMode, ScannerRegistry, Verifier, VerifyConfig,
};

use crate::cli::CheckArgs;
use crate::output::progress::ProgressDisplay;
use crate::output::report;
use crate::utils::ci;

pub async fn run(args: CheckArgs) -> Result<ExitCode> {
    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let registry = ScannerRegistry::new(vec![Arc::new(MarkdownScanner::new(
        &config.scanners.markdown,
    ))]);
    let exclusions = config.exclusions.compile()?;
    let scan_mode = if args.include_untracked {
        ScanMode::IncludeUntracked
    } else {
        ScanMode::OnlyTracked
    };
    let scanner = RepoScanner::new(registry, scan_mode, exclusions.clone());
    let (repo, scan_errors) = scanner.scan(&args.root)?;

    if args.verbose {
        println!("{repo:#?}");
    }
    report::print_scan_errors(&scan_errors, &repo.root);

    let verifier = Verifier::new(
        VerifyConfig::from_config(&config, args.mode.into()),
        exclusions,
    )?;

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let progress_enabled = args.progress_bar_override().unwrap_or_else(|| !ci::is_ci());
    let display = progress_enabled.then(|| ProgressDisplay::spawn(verifier.progress()));

    let result = verifier.verify_repo(&repo, &cancel).await;

    if let Some(display) = display {
        display.finish().await;
    }
    ctrl_c.abort();

    report::print_verify_result(&result, &repo.root);

    let failed = !scan_errors.is_empty() || result.verify_errors().is_some() || result.interrupted;
    Ok(if failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn load_config(args: &CheckArgs) -> Result<Config> {
    if let Some(path) = &args.config {
        return Ok(Config::load(path)?);
    }
    match Config::search(&args.root) {
        Some(path) => {
            debug!("using configuration from {}", path.display());
            Ok(Config::load(&path)?)
        }
        None => {
            debug!("no configuration file found, using built-in defaults");
            Ok(Config::default())
        }
    }
}

/// Fold command-line overrides into the loaded configuration. Exclusion
/// flags accumulate on top of the file, scalar flags replace it.
fn apply_overrides(config: &mut Config, args: &CheckArgs) {
    config.exclusions.ignore.extend(args.ignored.iter().cloned());
    config
        .exclusions
        .ignore_refs_from
        .extend(args.ignore_refs_from.iter().cloned());
    config
        .exclusions
        .ignore_local_refs_to
        .extend(args.ignore_local_refs_to.iter().cloned());
    config
        .exclusions
        .ignore_external_refs_to
        .extend(args.ignore_external_refs_to.iter().cloned());

    if let Some(timeout) = args.external_timeout {
        config.networking.external_ref_check_timeout = timeout;
    }
    if let Some(ignore) = args.auth_failures_override() {
        config.networking.ignore_auth_failures = ignore;
    }
    if let Some(delay) = args.default_retry_after {
        config.networking.default_retry_after = delay;
    }
    if let Some(retries) = args.max_retries {
        config.networking.max_retries = retries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn overrides_extend_exclusions_and_replace_scalars() {
        let mut config = Config::default();
        config.exclusions.ignore.push("vendor/**".to_string());

        let args = CheckArgs {
            ignored: vec!["dist/**".to_string()],
            external_timeout: Some(Duration::from_secs(3)),
            max_retries: Some(7),
            ignore_auth_failures: true,
            ..CheckArgs::default()
        };
        apply_overrides(&mut config, &args);

        assert_eq!(config.exclusions.ignore, vec!["vendor/**", "dist/**"]);
        assert_eq!(
            config.networking.external_ref_check_timeout,
            Duration::from_secs(3)
        );
        assert_eq!(config.networking.max_retries, 7);
        assert!(config.networking.ignore_auth_failures);
    }
}
