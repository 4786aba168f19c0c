//! Final report rendering: scan errors, invalid references, copy/paste
//! findings, and the closing summary line.

use std::path::Path;

use colored::Colorize;

use xrefcheck_core::{GatherScanError, Reference, VerifyResult};

/// Render a path relative to the repository root where possible.
fn relative<'a>(root: &Path, path: &'a Path) -> std::borrow::Cow<'a, str> {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
}

fn describe_reference(reference: &Reference) -> String {
    let mut target = reference.link.clone();
    if let Some(anchor) = &reference.anchor {
        target.push('#');
        target.push_str(anchor);
    }
    if target.is_empty() {
        target.push_str("<current file>");
    }
    format!("[{}] -> {}", reference.text.trim(), target)
}

/// Print the scan-error block, grouped by file. Quiet when empty.
pub fn print_scan_errors(errors: &[GatherScanError], root: &Path) {
    if errors.is_empty() {
        return;
    }
    println!("{}", "=== Scan errors found ===".red().bold());
    let mut current_file = None;
    for error in errors {
        if current_file != Some(&error.file) {
            current_file = Some(&error.file);
            println!("  {}:", relative(root, &error.file).bold());
        }
        println!(
            "    at {}: {}",
            error.position.to_string().cyan(),
            error.kind
        );
    }
    println!();
}

/// Print verification failures, copy/paste findings, and the summary.
pub fn print_verify_result(result: &VerifyResult, root: &Path) {
    if let Some(errors) = result.verify_errors() {
        println!("{}", "=== Invalid references found ===".red().bold());
        let mut current_file = None;
        for invalid in errors {
            if current_file != Some(&invalid.file) {
                current_file = Some(&invalid.file);
                println!("  {}:", relative(root, &invalid.file).bold());
            }
            println!(
                "    {} at {}",
                describe_reference(&invalid.reference),
                invalid.reference.position.to_string().cyan(),
            );
            println!("      {}", invalid.error.to_string().red());
        }
        println!();
    }

    if !result.copy_pastes.is_empty() {
        println!("{}", "=== Possible copy/paste errors ===".yellow().bold());
        let mut current_file = None;
        for finding in &result.copy_pastes {
            if current_file != Some(&finding.file) {
                current_file = Some(&finding.file);
                println!("  {}:", relative(root, &finding.file).bold());
            }
            println!(
                "    {} at {} looks copied from {} at {}",
                describe_reference(&finding.copied),
                finding.copied.position.to_string().cyan(),
                describe_reference(&finding.original),
                finding.original.position.to_string().cyan(),
            );
        }
        println!();
    }

    if result.interrupted {
        println!("{}", "Interrupted, results are partial.".yellow());
    } else if result.verify_errors().is_none() {
        println!("{}", "All references are valid.".green());
    } else {
        println!(
            "{}",
            format!("Found {} invalid references.", result.errors.len()).red()
        );
    }
}
