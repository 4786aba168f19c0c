//! Path canonicalization and pattern matching.
//!
//! The repository root is canonicalized once; every other path is joined
//! beneath it lexically, so references to files that do not exist can still
//! be resolved and compared against the scan product. Glob patterns are
//! always interpreted relative to the root.

use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;

use crate::{Error, Result};

/// Resolve a path through the filesystem into canonical form.
pub fn canonicalize(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|err| {
        Error::Config(format!("cannot resolve path `{}`: {err}", path.display()))
    })
}

/// Join `relative` under `root` and normalize the result lexically.
///
/// `.` components are dropped and `..` pops the previous component, without
/// touching the filesystem. The target therefore stays comparable with
/// canonical map keys even when it does not exist on disk.
pub fn join_under_root(root: &Path, relative: &Path) -> PathBuf {
    normalize(&root.join(relative))
}

/// Lexically normalize a path, folding `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// A set of glob patterns compiled for matching paths under one root.
#[derive(Clone, Debug, Default)]
pub struct RelativeGlobs {
    set: Option<GlobSet>,
}

impl RelativeGlobs {
    /// Compile patterns; `*` does not cross directory separators, use `**`
    /// for recursive matches.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self { set: None });
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|err| Error::Config(format!("invalid glob `{pattern}`: {err}")))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|err| Error::Config(format!("cannot compile glob set: {err}")))?;
        Ok(Self { set: Some(set) })
    }

    /// Whether `target` (canonical, under `root`) matches any pattern.
    ///
    /// Targets outside the root never match.
    pub fn matches(&self, root: &Path, target: &Path) -> bool {
        let Some(set) = &self.set else { return false };
        match target.strip_prefix(root) {
            Ok(relative) => set.is_match(relative),
            Err(_) => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_none()
    }
}

/// Convenience wrapper matching one target against raw patterns.
pub fn matches_glob_patterns(root: &Path, patterns: &[String], target: &Path) -> Result<bool> {
    Ok(RelativeGlobs::compile(patterns)?.matches(root, target))
}

/// Compile an extended regular expression used for URL exclusion patterns.
///
/// Case-sensitive and multiline; compilation failure is a configuration
/// error surfaced at load time.
pub fn compile_extended_regex(pattern: &str) -> Result<Regex> {
    regex::RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|err| Error::Config(format!("invalid regex `{pattern}`: {err}")))
}
