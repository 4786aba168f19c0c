//! Repository scanning: enumerate files through git, dispatch them to
//! format scanners, and assemble the [`RepoInfo`] graph.
//!
//! Scan errors come in two stages. Format scanners are context-free and
//! report [`ParseScanError`]s that carry only a position; the repository
//! scanner promotes them to [`GatherScanError`]s by attaching the owning
//! file. Neither stage ever aborts the scan of other files.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::CompiledExclusions;
use crate::paths;
use crate::types::{DirStatus, FileInfo, FileStatus, Position, RepoInfo};
use crate::{Error, Result};

/// What a format scanner can report without knowing its file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// An `ignore link` annotation was not followed by a link.
    ExpectedLinkAfterIgnoreLink,
    /// An `ignore all` annotation appeared after the first content block.
    IgnoreAllMisplaced,
    /// An `ignore paragraph` annotation was followed by something else.
    ExpectedParagraphAfterIgnoreParagraph { found: String },
    /// The annotation option is not one of the known ones.
    UnrecognisedIgnoreOption { option: String },
}

impl fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpectedLinkAfterIgnoreLink => {
                f.write_str("expected a link after the \"ignore link\" annotation")
            }
            Self::IgnoreAllMisplaced => {
                f.write_str("\"ignore all\" is only valid at the top of the file")
            }
            Self::ExpectedParagraphAfterIgnoreParagraph { found } => write!(
                f,
                "expected a paragraph after the \"ignore paragraph\" annotation, found {found}"
            ),
            Self::UnrecognisedIgnoreOption { option } => write!(
                f,
                "unrecognised annotation `{option}`; \
                 expected \"ignore link\", \"ignore paragraph\" or \"ignore all\""
            ),
        }
    }
}

/// A scan error as reported by a format scanner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseScanError {
    pub position: Position,
    pub kind: ScanErrorKind,
}

impl ParseScanError {
    /// Promote to a gather error by attaching the owning file.
    pub fn in_file(self, file: PathBuf) -> GatherScanError {
        GatherScanError {
            file,
            position: self.position,
            kind: self.kind,
        }
    }
}

/// A scan error tied to the file it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatherScanError {
    pub file: PathBuf,
    pub position: Position,
    pub kind: ScanErrorKind,
}

/// Which files the repository scanner considers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Only files tracked by git.
    #[default]
    OnlyTracked,
    /// Tracked plus untracked files, minus whatever gitignore excludes.
    IncludeUntracked,
}

/// A format-specific scanner, registered by file extension.
pub trait FileScanner: Send + Sync {
    /// Extensions (without dot) this scanner claims.
    fn extensions(&self) -> &[&'static str];

    /// Parse one file. Recoverable problems go into the error list; an `Err`
    /// means the file could not be read at all.
    fn scan(&self, path: &Path) -> Result<(FileInfo, Vec<ParseScanError>)>;
}

/// Maps file extensions to scanners, built once at startup.
#[derive(Clone)]
pub struct ScannerRegistry {
    scanners: Vec<Arc<dyn FileScanner>>,
    by_extension: HashMap<String, usize>,
}

impl ScannerRegistry {
    pub fn new(scanners: Vec<Arc<dyn FileScanner>>) -> Self {
        let mut by_extension = HashMap::new();
        for (index, scanner) in scanners.iter().enumerate() {
            for extension in scanner.extensions() {
                by_extension.insert((*extension).to_lowercase(), index);
            }
        }
        Self {
            scanners,
            by_extension,
        }
    }

    /// The scanner claiming this path's extension, if any.
    pub fn scanner_for(&self, path: &Path) -> Option<&dyn FileScanner> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        self.by_extension
            .get(&extension)
            .map(|&index| self.scanners[index].as_ref())
    }
}

/// Scans a repository into a [`RepoInfo`].
pub struct RepoScanner {
    registry: ScannerRegistry,
    mode: ScanMode,
    exclusions: CompiledExclusions,
}

impl RepoScanner {
    pub fn new(registry: ScannerRegistry, mode: ScanMode, exclusions: CompiledExclusions) -> Self {
        Self {
            registry,
            mode,
            exclusions,
        }
    }

    /// Enumerate, parse, and assemble. `root` must be a git work tree.
    pub fn scan(&self, root: &Path) -> Result<(RepoInfo, Vec<GatherScanError>)> {
        let root = paths::canonicalize(root)?;
        let tracked = git_ls_files(&root, &[])?;
        let untracked = git_ls_files(&root, &["--others", "--exclude-standard"])?;
        debug!(
            tracked = tracked.len(),
            untracked = untracked.len(),
            "enumerated repository files"
        );

        let mut repo = RepoInfo {
            root: root.clone(),
            ..RepoInfo::default()
        };
        let mut errors = Vec::new();

        for relative in &tracked {
            self.process_file(&mut repo, &mut errors, relative, true);
        }
        match self.mode {
            ScanMode::IncludeUntracked => {
                for relative in &untracked {
                    self.process_file(&mut repo, &mut errors, relative, false);
                }
            }
            ScanMode::OnlyTracked => {
                for relative in &untracked {
                    let path = paths::join_under_root(&root, Path::new(relative));
                    if self.exclusions.ignore.matches(&root, &path) {
                        continue;
                    }
                    if self.registry.scanner_for(&path).is_some() {
                        warn!(
                            "{relative} is not added to git and will not be verified; \
                             run with --include-untracked to scan it"
                        );
                        repo.files.insert(path.clone(), FileStatus::NotAddedToGit);
                        index_directories(&mut repo, &root, &path, false);
                    }
                }
            }
        }

        errors.sort_by(|a, b| a.file.cmp(&b.file).then(a.position.cmp(&b.position)));
        Ok((repo, errors))
    }

    fn process_file(
        &self,
        repo: &mut RepoInfo,
        errors: &mut Vec<GatherScanError>,
        relative: &str,
        tracked: bool,
    ) {
        let path = paths::join_under_root(&repo.root, Path::new(relative));
        if self.exclusions.ignore.matches(&repo.root, &path) {
            debug!("{relative} excluded from scanning");
            return;
        }

        let status = match self.registry.scanner_for(&path) {
            None => FileStatus::NotScannable,
            Some(scanner) => match scanner.scan(&path) {
                Ok((info, parse_errors)) => {
                    errors.extend(
                        parse_errors
                            .into_iter()
                            .map(|error| error.in_file(path.clone())),
                    );
                    FileStatus::Scanned(info)
                }
                Err(err) => {
                    warn!("cannot read {relative}: {err}");
                    FileStatus::NotScannable
                }
            },
        };
        let root = repo.root.clone();
        index_directories(repo, &root, &path, tracked);
        repo.files.insert(path, status);
    }
}

/// Record every directory between the root and `file`; tracked wins over
/// untracked when both contribute the same directory.
fn index_directories(repo: &mut RepoInfo, root: &Path, file: &Path, tracked: bool) {
    let status = if tracked {
        DirStatus::Tracked
    } else {
        DirStatus::Untracked
    };
    let mut current = file.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        repo.directories
            .entry(dir.to_path_buf())
            .and_modify(|existing| {
                if tracked {
                    *existing = DirStatus::Tracked;
                }
            })
            .or_insert(status);
        current = dir.parent();
    }
}

/// Run `git ls-files` in `root` and return its output lines.
fn git_ls_files(root: &Path, extra: &[&str]) -> Result<Vec<String>> {
    let mut command = Command::new("git");
    command.arg("ls-files").args(extra).current_dir(root);
    let rendered = format!("ls-files {}", extra.join(" "));

    let output = command.output().map_err(|err| Error::Git {
        command: rendered.clone(),
        message: err.to_string(),
    })?;
    if !output.status.success() {
        return Err(Error::Git {
            command: rendered,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
