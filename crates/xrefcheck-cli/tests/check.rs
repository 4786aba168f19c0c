//! End-to-end tests driving the built binary against throwaway git repos.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

fn git(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("git is available");
    assert!(status.success(), "git {args:?} failed");
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);
        Self { dir }
    }

    fn write(&self, relative: &str, contents: &str) -> &Self {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
        self
    }

    fn add_all(&self) -> &Self {
        git(self.dir.path(), &["add", "."]);
        self
    }

    fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

fn xrefcheck() -> Command {
    Command::cargo_bin("xrefcheck").unwrap()
}

#[test]
fn valid_repository_passes() {
    let fixture = Fixture::new();
    fixture
        .write("README.md", "# Readme\n\n[docs](./docs/guide.md#intro)\n")
        .write("docs/guide.md", "# Guide\n\n## Intro\n")
        .add_all();

    xrefcheck()
        .args(["--root"])
        .arg(fixture.root())
        .args(["--mode", "local", "--no-progress-bar", "--color", "never"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All references are valid."));
}

#[test]
fn broken_local_reference_fails() {
    let fixture = Fixture::new();
    fixture
        .write("README.md", "[gone](./missing.md)\n")
        .add_all();

    xrefcheck()
        .args(["check", "--root"])
        .arg(fixture.root())
        .args(["--mode", "local", "--no-progress-bar", "--color", "never"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("=== Invalid references found ==="))
        .stdout(predicate::str::contains("missing.md"));
}

#[test]
fn broken_anchor_suggests_the_right_one() {
    let fixture = Fixture::new();
    fixture
        .write("README.md", "[go](./a.md#section-one)\n")
        .write("a.md", "## Section two\n")
        .add_all();

    xrefcheck()
        .args(["--root"])
        .arg(fixture.root())
        .args(["--mode", "local", "--no-progress-bar", "--color", "never"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("section-one"))
        .stdout(predicate::str::contains("section-two"));
}

#[test]
fn scan_errors_fail_the_run() {
    let fixture = Fixture::new();
    fixture
        .write("README.md", "# Top\n\n<!-- xrefcheck: ignore all -->\n")
        .add_all();

    xrefcheck()
        .args(["--root"])
        .arg(fixture.root())
        .args(["--mode", "local", "--no-progress-bar", "--color", "never"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("=== Scan errors found ==="))
        .stdout(predicate::str::contains("ignore all"));
}

#[test]
fn configuration_file_is_discovered_under_the_root() {
    let fixture = Fixture::new();
    fixture
        .write("README.md", "[gone](./missing.md)\n")
        .write(".xrefcheck.yaml", "exclusions:\n  ignoreRefsFrom: ['README.md']\n")
        .add_all();

    xrefcheck()
        .args(["--root"])
        .arg(fixture.root())
        .args(["--mode", "local", "--no-progress-bar", "--color", "never"])
        .assert()
        .success();
}

#[test]
fn exclusion_flags_accumulate_on_top_of_the_config() {
    let fixture = Fixture::new();
    fixture
        .write("README.md", "# Fine\n")
        .write("drafts/wip.md", "[gone](./missing.md)\n")
        .add_all();

    xrefcheck()
        .args(["--root"])
        .arg(fixture.root())
        .args([
            "--mode",
            "local",
            "--ignored",
            "drafts/**",
            "--no-progress-bar",
            "--color",
            "never",
        ])
        .assert()
        .success();
}

#[test]
fn local_mode_skips_external_urls() {
    let fixture = Fixture::new();
    fixture
        .write("README.md", "[dead](http://127.0.0.1:1/unreachable)\n")
        .add_all();

    xrefcheck()
        .args(["--root"])
        .arg(fixture.root())
        .args(["--mode", "local", "--no-progress-bar", "--color", "never"])
        .assert()
        .success();
}

#[test]
fn non_repository_roots_exit_with_2() {
    let dir = tempfile::tempdir().unwrap();
    xrefcheck()
        .args(["--root"])
        .arg(dir.path())
        .args(["--no-progress-bar", "--color", "never"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("git"));
}

#[test]
fn invalid_configuration_exits_with_2() {
    let fixture = Fixture::new();
    fixture
        .write("README.md", "# Fine\n")
        .write("xrefcheck.yaml", "scanners:\n  anchorSimilarityThreshold: 2.0\n")
        .add_all();

    xrefcheck()
        .args(["--root"])
        .arg(fixture.root())
        .args(["--no-progress-bar", "--color", "never"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("anchorSimilarityThreshold"));
}

#[test]
fn dump_config_prints_the_default_yaml() {
    xrefcheck()
        .arg("dump-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("exclusions:"))
        .stdout(predicate::str::contains("maxRetries: 3"))
        .stdout(predicate::str::contains("flavor: GitHub"));
}

#[test]
fn untracked_files_are_scanned_only_on_request() {
    let fixture = Fixture::new();
    fixture.write("tracked.md", "# Fine\n").add_all();
    fixture.write("untracked.md", "[gone](./missing.md)\n");

    xrefcheck()
        .args(["--root"])
        .arg(fixture.root())
        .args(["--mode", "local", "--no-progress-bar", "--color", "never"])
        .assert()
        .success();

    xrefcheck()
        .args(["--root"])
        .arg(fixture.root())
        .args([
            "--mode",
            "local",
            "--include-untracked",
            "--no-progress-bar",
            "--color",
            "never",
        ])
        .assert()
        .code(1);
}
