//! Anchors and the slug algorithm.
//!
//! Headers become addressable anchors through *slugging*: the header text is
//! canonicalized into the fragment a forge would generate for it. The two
//! supported flavors share the whole pipeline except for one step, so adding
//! a flavor means adding one arm to [`slugify`].
//!
//! Slugging pipeline:
//!
//! 1. lowercase the text once;
//! 2. replace `+` and whitespace with a sentinel, collapsing runs;
//! 3. drop sentinels adjacent to a literal `-`, turn the rest into `-`;
//! 4. drop every character that is not alphanumeric, `_`, or `-`;
//! 5. GitLab only: collapse runs of `-` left over from filtering.
//!
//! The result is idempotent: feeding a slug back through the pipeline
//! returns it unchanged.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Position;

/// Anchor slugging rule set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flavor {
    #[default]
    GitHub,
    GitLab,
}

/// What kind of construct produced an anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnchorType {
    /// An ATX or Setext heading of the given level (1 through 6).
    Header(u8),
    /// An explicit `<a name=…>` or `<a id=…>` tag.
    Handmade,
    /// A link-reference definition (`[label]: target`).
    Biblio,
}

impl fmt::Display for AnchorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header(level) => write!(f, "level {level} header"),
            Self::Handmade => f.write_str("explicit anchor"),
            Self::Biblio => f.write_str("bibliography entry"),
        }
    }
}

/// An addressable point inside a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Anchor {
    pub kind: AnchorType,
    /// Canonical slug, unique within a file once suffixes are assigned.
    pub name: String,
    pub position: Position,
}

const SENTINEL: char = '\u{1}';

/// Compute the canonical slug for a header title.
pub fn slugify(flavor: Flavor, text: &str) -> String {
    let lower = text.to_lowercase();

    // Whitespace and `+` turn into sentinels; runs collapse immediately.
    let mut marked: Vec<char> = Vec::with_capacity(lower.len());
    for ch in lower.chars() {
        if ch == '+' || ch.is_whitespace() {
            if marked.last() != Some(&SENTINEL) {
                marked.push(SENTINEL);
            }
        } else {
            marked.push(ch);
        }
    }

    // A sentinel touching a literal dash disappears, the rest become dashes.
    let mut dashed = String::with_capacity(marked.len());
    for (i, &ch) in marked.iter().enumerate() {
        if ch == SENTINEL {
            let prev = i.checked_sub(1).map(|j| marked[j]);
            let next = marked.get(i + 1).copied();
            if prev == Some('-') || next == Some('-') {
                continue;
            }
            dashed.push('-');
        } else {
            dashed.push(ch);
        }
    }

    let filtered: String = dashed
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    match flavor {
        Flavor::GitHub => filtered,
        Flavor::GitLab => collapse_dashes(&filtered),
    }
}

fn collapse_dashes(slug: &str) -> String {
    let mut out = String::with_capacity(slug.len());
    let mut prev_dash = false;
    for ch in slug.chars() {
        if ch == '-' {
            if !prev_dash {
                out.push('-');
            }
            prev_dash = true;
        } else {
            out.push(ch);
            prev_dash = false;
        }
    }
    out
}

/// Make anchor names unique within one file.
///
/// The k-th occurrence of a slug (k >= 2) becomes `slug-<k-1>`; the first
/// occurrence keeps the bare slug. Call once, on the document-ordered list.
pub fn assign_duplicate_suffixes(anchors: &mut [Anchor]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for anchor in anchors {
        let count = seen.entry(anchor.name.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            anchor.name = format!("{}-{}", anchor.name, *count - 1);
        }
    }
}

/// Undo a duplicate suffix, returning the bare slug.
///
/// Returns `Some` only when the name ends in `-<digits>`.
pub fn strip_anchor_dup_no(name: &str) -> Option<String> {
    let (bare, digits) = name.rsplit_once('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(bare.to_string())
}

/// Normalized similarity between two anchor names, in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b)
}

/// Candidates similar enough to `target` to be worth suggesting.
///
/// Everything scoring above `threshold` is returned, best score first, ties
/// broken lexicographically.
pub fn suggest_anchors<'a, I>(target: &str, candidates: I, threshold: f64) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .map(|candidate| (similarity(target, candidate), candidate))
        .filter(|(score, _)| *score > threshold)
        .collect();
    scored.sort_by(|(score_a, name_a), (score_b, name_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| name_a.cmp(name_b))
    });
    scored.into_iter().map(|(_, name)| name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header(name: &str, line: usize) -> Anchor {
        Anchor {
            kind: AnchorType::Header(2),
            name: name.to_string(),
            position: Position::new(line, 1),
        }
    }

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify(Flavor::GitHub, "Section one"), "section-one");
        assert_eq!(slugify(Flavor::GitHub, "Hello, World!"), "hello-world");
        assert_eq!(slugify(Flavor::GitHub, "a + b"), "a-b");
        assert_eq!(slugify(Flavor::GitHub, "snake_case kept"), "snake_case-kept");
    }

    #[test]
    fn slugify_sentinels_next_to_dashes_vanish() {
        assert_eq!(slugify(Flavor::GitHub, "a - b"), "a-b");
        assert_eq!(slugify(Flavor::GitHub, "_-  First -  - File"), "_-first--file");
        assert_eq!(slugify(Flavor::GitHub, "_-  First - fi - le"), "_-first-fi-le");
    }

    #[test]
    fn slugify_gitlab_collapses_dash_runs() {
        assert_eq!(slugify(Flavor::GitLab, "_-  First -  - File"), "_-first-file");
        assert_eq!(slugify(Flavor::GitLab, "a -- b"), "a-b");
    }

    #[test]
    fn slugify_keeps_unicode_letters() {
        assert_eq!(slugify(Flavor::GitHub, "Überblick"), "überblick");
        assert_eq!(slugify(Flavor::GitHub, "日本語 見出し"), "日本語-見出し");
    }

    #[test]
    fn duplicate_suffixes_count_per_slug() {
        let mut anchors = vec![
            header("setup", 1),
            header("usage", 5),
            header("setup", 9),
            header("setup", 13),
        ];
        assign_duplicate_suffixes(&mut anchors);
        let names: Vec<&str> = anchors.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["setup", "usage", "setup-1", "setup-2"]);
    }

    #[test]
    fn strip_dup_no_roundtrip() {
        assert_eq!(strip_anchor_dup_no("setup-1"), Some("setup".to_string()));
        assert_eq!(strip_anchor_dup_no("setup-12"), Some("setup".to_string()));
        assert_eq!(strip_anchor_dup_no("setup"), None);
        assert_eq!(strip_anchor_dup_no("setup-one"), None);
        assert_eq!(strip_anchor_dup_no("setup-"), None);
    }

    #[test]
    fn suggestions_filter_and_order() {
        let candidates = ["section-two", "section-three", "qux"];
        let suggestions = suggest_anchors("section-one", candidates, 0.5);
        assert_eq!(suggestions.first().map(String::as_str), Some("section-two"));
        assert!(suggestions.contains(&"section-three".to_string()));
        assert!(!suggestions.contains(&"qux".to_string()));
    }

    #[test]
    fn suggestions_break_ties_lexicographically() {
        // Same score against the target, so order falls back to the name.
        let suggestions = suggest_anchors("abcd", ["abcx", "abcy"], 0.5);
        assert_eq!(suggestions, vec!["abcx".to_string(), "abcy".to_string()]);
    }

    proptest! {
        #[test]
        fn slug_character_classes(text in ".{0,80}") {
            let slug = slugify(Flavor::GitHub, &text);
            prop_assert!(
                slug.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
            );
            prop_assert!(!slug.chars().any(char::is_uppercase));
        }

        #[test]
        fn slug_is_idempotent(text in ".{0,80}") {
            for flavor in [Flavor::GitHub, Flavor::GitLab] {
                let once = slugify(flavor, &text);
                prop_assert_eq!(slugify(flavor, &once), once.clone());
            }
        }
    }
}
