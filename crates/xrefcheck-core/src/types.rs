//! Core data types shared by the scanner pipeline and the verifier.
//!
//! The scan phase produces a [`RepoInfo`]: every enumerated file with its
//! parsed [`FileInfo`] (references and anchors in document order) plus a
//! directory index derived from the file paths. The verifier reads this
//! structure immutably; nothing here is mutated after scanning finishes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::anchor::Anchor;

/// A printable source location, 1-based line and column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Where a link points, computed from its raw text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocationType {
    /// Empty link, referring to the current document.
    Local,
    /// Path relative to the referring document.
    Relative,
    /// Path anchored at the repository root.
    Absolute,
    /// URL with a `://` scheme separator.
    External,
    /// Any other scheme, such as `mailto:` or `tel:`.
    Other,
}

impl LocationType {
    /// Classify a raw link string.
    ///
    /// A scheme separator is only recognized within the first ten characters,
    /// so a stray `://` deep inside a relative path does not make the link
    /// external.
    pub fn of(link: &str) -> Self {
        if link.is_empty() {
            return Self::Local;
        }
        let head: String = link.chars().take(10).collect();
        if head.contains("://") {
            return Self::External;
        }
        if link.chars().next().is_some_and(std::path::is_separator) {
            return Self::Absolute;
        }
        if link.starts_with("./") || link.starts_with("../") {
            return Self::Relative;
        }
        if link.contains(':') {
            return Self::Other;
        }
        Self::Relative
    }
}

/// A link found in a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    /// The link text as written.
    pub text: String,
    /// Link target with any fragment removed.
    pub link: String,
    /// URL-decoded fragment, if the target carried one.
    pub anchor: Option<String>,
    pub position: Position,
    /// `false` opts this reference out of duplicate-name detection; such
    /// references are also skipped by the verifier. The markdown scanner
    /// clears the flag for references under an ignore annotation.
    pub copy_paste_check: bool,
}

impl Reference {
    pub fn location_type(&self) -> LocationType {
        LocationType::of(&self.link)
    }
}

/// Parsed contents of a single scanned file, both sequences in document order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub references: Vec<Reference>,
    pub anchors: Vec<Anchor>,
}

/// What the repository scanner recorded for a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileStatus {
    /// A scanner claimed the extension and produced contents.
    Scanned(FileInfo),
    /// No scanner is registered for this extension.
    NotScannable,
    /// The file has a recognized extension but is not tracked by git.
    NotAddedToGit,
}

/// Tracking state of a directory, derived from the files beneath it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirStatus {
    Tracked,
    Untracked,
}

/// The immutable scan product.
///
/// Keys in both maps are canonical: absolute, symlink-resolved at the root,
/// lexically normalized below it. [`BTreeMap`] keeps iteration deterministic.
#[derive(Clone, Debug, Default)]
pub struct RepoInfo {
    pub files: BTreeMap<PathBuf, FileStatus>,
    pub directories: BTreeMap<PathBuf, DirStatus>,
    pub root: PathBuf,
}

impl RepoInfo {
    /// Look up a file's parsed contents, if it was scanned.
    pub fn scanned(&self, path: &Path) -> Option<&FileInfo> {
        match self.files.get(path) {
            Some(FileStatus::Scanned(info)) => Some(info),
            _ => None,
        }
    }

    /// Iterate scanned files in path order.
    pub fn scanned_files(&self) -> impl Iterator<Item = (&PathBuf, &FileInfo)> {
        self.files.iter().filter_map(|(path, status)| match status {
            FileStatus::Scanned(info) => Some((path, info)),
            _ => None,
        })
    }
}
