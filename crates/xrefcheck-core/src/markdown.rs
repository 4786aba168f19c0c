//! Markdown scanning: turns a document into references and anchors.
//!
//! Built on the pulldown-cmark event stream with the offset iterator, so
//! every emitted item carries a line/column position. Scanning never aborts
//! on bad input: annotation mistakes accumulate as parse errors and the
//! partial result is still returned.
//!
//! Annotations are HTML comments of the form `<!-- xrefcheck: OPTION -->`:
//!
//! - `ignore link` excludes the next link;
//! - `ignore paragraph` excludes every link in the next paragraph;
//! - `ignore all` excludes the whole file and is only valid before the
//!   first content block (other comments may precede it).
//!
//! Excluded references are still recorded, with `copy_paste_check` cleared.

use std::path::Path;
use std::sync::LazyLock;

use pulldown_cmark::{Event, HeadingLevel, LinkType, Options, Parser, Tag, TagEnd};
use regex::Regex;

use crate::anchor::{Anchor, AnchorType, Flavor, assign_duplicate_suffixes, slugify};
use crate::config::MarkdownConfig;
use crate::scan::{FileScanner, ParseScanError, ScanErrorKind};
use crate::types::{FileInfo, Position, Reference};
use crate::Result;

/// Recognizes `<a name="…">` and `<a id="…">` in raw HTML.
static HANDMADE_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s+[^>]*?(?:name|id)\s*=\s*["']([^"']+)["']"#)
        .expect("anchor pattern is valid")
});

/// Scanner for Markdown documents.
#[derive(Clone, Copy, Debug)]
pub struct MarkdownScanner {
    flavor: Flavor,
}

impl MarkdownScanner {
    pub fn new(config: &MarkdownConfig) -> Self {
        Self {
            flavor: config.flavor,
        }
    }

    /// Scan a document already loaded into memory.
    pub fn scan_text(&self, text: &str) -> (FileInfo, Vec<ParseScanError>) {
        Gather::new(self.flavor, text).run()
    }
}

impl FileScanner for MarkdownScanner {
    fn extensions(&self) -> &[&'static str] {
        &["md", "markdown"]
    }

    fn scan(&self, path: &Path) -> Result<(FileInfo, Vec<ParseScanError>)> {
        let text = std::fs::read_to_string(path)?;
        Ok(self.scan_text(&text))
    }
}

/// Byte-offset to line/column mapping.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    fn position(&self, offset: usize) -> Position {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let column = offset - self.line_starts[line - 1] + 1;
        Position::new(line, column)
    }
}

/// Annotation directives and their pending state.
#[derive(Clone, Copy, Debug)]
enum Pending {
    IgnoreLink(Position),
    IgnoreParagraph(Position),
}

enum Annotation {
    IgnoreLink,
    IgnoreParagraph,
    IgnoreAll,
    Unrecognised(String),
}

struct LinkInProgress {
    text: String,
    dest: String,
    position: Position,
    ignored: bool,
}

struct HeadingInProgress {
    level: u8,
    text: String,
    position: Position,
}

/// One scan pass over a document.
struct Gather<'a> {
    flavor: Flavor,
    text: &'a str,
    index: LineIndex,
    references: Vec<Reference>,
    /// Header anchors, kept apart so duplicate suffixes only apply to them.
    header_anchors: Vec<Anchor>,
    /// Handmade and bibliography anchors, names taken verbatim.
    anchors: Vec<Anchor>,
    errors: Vec<ParseScanError>,
    link_stack: Vec<LinkInProgress>,
    heading: Option<HeadingInProgress>,
    pending: Option<Pending>,
    ignoring_paragraph: bool,
    ignore_all: bool,
    seen_content_block: bool,
}

impl<'a> Gather<'a> {
    fn new(flavor: Flavor, text: &'a str) -> Self {
        Self {
            flavor,
            text,
            index: LineIndex::new(text),
            references: Vec::new(),
            header_anchors: Vec::new(),
            anchors: Vec::new(),
            errors: Vec::new(),
            link_stack: Vec::new(),
            heading: None,
            pending: None,
            ignoring_paragraph: false,
            ignore_all: false,
            seen_content_block: false,
        }
    }

    fn run(mut self) -> (FileInfo, Vec<ParseScanError>) {
        let options =
            Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
        let parser = Parser::new_ext(self.text, options);

        for (label, definition) in parser.reference_definitions().iter() {
            self.anchors.push(Anchor {
                kind: AnchorType::Biblio,
                name: label.to_string(),
                position: self.index.position(definition.span.start),
            });
        }

        for (event, range) in parser.into_offset_iter() {
            let position = self.index.position(range.start);
            match event {
                Event::Start(Tag::Paragraph) => {
                    if matches!(self.pending, Some(Pending::IgnoreParagraph(_))) {
                        self.ignoring_paragraph = true;
                        self.pending = None;
                    }
                    self.seen_content_block = true;
                }
                Event::End(TagEnd::Paragraph) => {
                    self.ignoring_paragraph = false;
                }

                Event::Start(Tag::Heading { level, .. }) => {
                    self.fail_pending_link();
                    self.fail_pending_paragraph("heading");
                    self.seen_content_block = true;
                    self.heading = Some(HeadingInProgress {
                        level: heading_level(level),
                        text: String::new(),
                        position,
                    });
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(heading) = self.heading.take() {
                        self.header_anchors.push(Anchor {
                            kind: AnchorType::Header(heading.level),
                            name: slugify(self.flavor, heading.text.trim()),
                            position: heading.position,
                        });
                    }
                }

                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    ..
                }) => {
                    self.start_link(link_type, &dest_url, position);
                }
                Event::End(TagEnd::Link) => self.finish_link(),
                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    ..
                }) => {
                    self.start_link(link_type, &dest_url, position);
                }
                Event::End(TagEnd::Image) => self.finish_link(),

                Event::Start(Tag::List(_)) => self.block_node("list"),
                Event::Start(Tag::CodeBlock(_)) => self.block_node("code block"),
                Event::Start(Tag::BlockQuote(_)) => self.block_node("block quote"),
                Event::Start(Tag::Table(_)) => self.block_node("table"),
                Event::Rule => self.block_node("thematic break"),

                Event::Html(html) => self.handle_html(&html, range.start, true),
                Event::InlineHtml(html) => self.handle_html(&html, range.start, false),

                Event::Text(chunk) => {
                    if !chunk.trim().is_empty() && self.link_stack.is_empty() {
                        self.fail_pending_link();
                    }
                    self.push_inline_text(&chunk);
                }
                Event::Code(chunk) => {
                    if self.link_stack.is_empty() {
                        self.fail_pending_link();
                    }
                    self.push_inline_text(&chunk);
                }
                Event::SoftBreak | Event::HardBreak => self.push_inline_text(" "),

                _ => {}
            }
        }

        match self.pending.take() {
            Some(Pending::IgnoreLink(position)) => self.errors.push(ParseScanError {
                position,
                kind: ScanErrorKind::ExpectedLinkAfterIgnoreLink,
            }),
            Some(Pending::IgnoreParagraph(position)) => self.errors.push(ParseScanError {
                position,
                kind: ScanErrorKind::ExpectedParagraphAfterIgnoreParagraph {
                    found: "end of file".to_string(),
                },
            }),
            None => {}
        }

        // Suffixes disambiguate generated header slugs only; explicit anchors
        // keep their names and may legitimately collide with a header.
        assign_duplicate_suffixes(&mut self.header_anchors);
        self.anchors.append(&mut self.header_anchors);
        self.anchors.sort_by_key(|anchor| anchor.position);
        self.references.sort_by_key(|reference| reference.position);

        (
            FileInfo {
                references: self.references,
                anchors: self.anchors,
            },
            self.errors,
        )
    }

    fn start_link(&mut self, link_type: LinkType, dest_url: &str, position: Position) {
        let ignored = self.ignore_all
            || self.ignoring_paragraph
            || matches!(self.pending, Some(Pending::IgnoreLink(_)));
        if matches!(self.pending, Some(Pending::IgnoreLink(_))) {
            self.pending = None;
        }
        let dest = if link_type == LinkType::Email && !dest_url.starts_with("mailto:") {
            format!("mailto:{dest_url}")
        } else {
            dest_url.to_string()
        };
        self.link_stack.push(LinkInProgress {
            text: String::new(),
            dest,
            position,
            ignored,
        });
    }

    fn finish_link(&mut self) {
        let Some(link) = self.link_stack.pop() else {
            return;
        };
        let (target, fragment) = split_fragment(&link.dest);
        self.references.push(Reference {
            text: link.text,
            link: target,
            anchor: fragment,
            position: link.position,
            copy_paste_check: !link.ignored,
        });
    }

    fn push_inline_text(&mut self, chunk: &str) {
        if let Some(heading) = &mut self.heading {
            heading.text.push_str(chunk);
        }
        for link in &mut self.link_stack {
            link.text.push_str(chunk);
        }
    }

    /// A non-paragraph block: fails both kinds of pending annotation.
    fn block_node(&mut self, name: &str) {
        self.fail_pending_link();
        self.fail_pending_paragraph(name);
        self.seen_content_block = true;
    }

    fn fail_pending_link(&mut self) {
        if let Some(Pending::IgnoreLink(position)) = self.pending {
            self.errors.push(ParseScanError {
                position,
                kind: ScanErrorKind::ExpectedLinkAfterIgnoreLink,
            });
            self.pending = None;
        }
    }

    fn fail_pending_paragraph(&mut self, found: &str) {
        if let Some(Pending::IgnoreParagraph(position)) = self.pending {
            self.errors.push(ParseScanError {
                position,
                kind: ScanErrorKind::ExpectedParagraphAfterIgnoreParagraph {
                    found: found.to_string(),
                },
            });
            self.pending = None;
        }
    }

    fn handle_html(&mut self, html: &str, base_offset: usize, is_block: bool) {
        for (offset, body) in comments_in(html) {
            let position = self.index.position(base_offset + offset);
            match parse_annotation(&body) {
                Some(Annotation::IgnoreAll) => {
                    if self.seen_content_block {
                        self.errors.push(ParseScanError {
                            position,
                            kind: ScanErrorKind::IgnoreAllMisplaced,
                        });
                    } else {
                        self.ignore_all = true;
                    }
                }
                Some(Annotation::IgnoreLink) => {
                    self.pending = Some(Pending::IgnoreLink(position));
                }
                Some(Annotation::IgnoreParagraph) => {
                    self.pending = Some(Pending::IgnoreParagraph(position));
                }
                Some(Annotation::Unrecognised(option)) => {
                    self.errors.push(ParseScanError {
                        position,
                        kind: ScanErrorKind::UnrecognisedIgnoreOption { option },
                    });
                }
                None => {}
            }
        }

        for captures in HANDMADE_ANCHOR.captures_iter(html) {
            let offset = captures.get(0).map_or(0, |m| m.start());
            self.anchors.push(Anchor {
                kind: AnchorType::Handmade,
                name: captures[1].to_string(),
                position: self.index.position(base_offset + offset),
            });
        }

        if !is_comment_only(html) {
            self.fail_pending_link();
            if is_block {
                self.fail_pending_paragraph("html block");
                self.seen_content_block = true;
            }
        }
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Split a destination at the first `#`, URL-decoding the fragment.
fn split_fragment(dest: &str) -> (String, Option<String>) {
    match dest.split_once('#') {
        Some((link, fragment)) => {
            let decoded = percent_encoding::percent_decode_str(fragment)
                .decode_utf8_lossy()
                .into_owned();
            (link.to_string(), Some(decoded))
        }
        None => (dest.to_string(), None),
    }
}

/// Yield `(byte offset, body)` for every HTML comment in a chunk.
fn comments_in(html: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut rest = html;
    let mut consumed = 0;
    while let Some(start) = rest.find("<!--") {
        let after = &rest[start + 4..];
        let Some(end) = after.find("-->") else { break };
        out.push((consumed + start, after[..end].to_string()));
        let advanced = start + 4 + end + 3;
        consumed += advanced;
        rest = &rest[advanced..];
    }
    out
}

fn is_comment_only(html: &str) -> bool {
    let mut rest = html.trim();
    while let Some(start) = rest.find("<!--") {
        if !rest[..start].trim().is_empty() {
            return false;
        }
        let after = &rest[start + 4..];
        let Some(end) = after.find("-->") else {
            return false;
        };
        rest = after[end + 3..].trim_start();
    }
    rest.trim().is_empty()
}

fn parse_annotation(body: &str) -> Option<Annotation> {
    let rest = body.trim().strip_prefix("xrefcheck:")?;
    let words: Vec<&str> = rest.split_whitespace().collect();
    Some(match words.as_slice() {
        ["ignore", "link"] => Annotation::IgnoreLink,
        ["ignore", "paragraph"] => Annotation::IgnoreParagraph,
        ["ignore", "all"] => Annotation::IgnoreAll,
        _ => Annotation::Unrecognised(rest.trim().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> (FileInfo, Vec<ParseScanError>) {
        MarkdownScanner::new(&MarkdownConfig {
            flavor: Flavor::GitHub,
        })
        .scan_text(text)
    }

    fn anchor_names(info: &FileInfo) -> Vec<&str> {
        info.anchors.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn headers_become_anchors_with_duplicate_suffixes() {
        let (info, errors) = scan(
            "# Intro\n\n## Setup\n\ntext\n\n## Setup\n\n### Deep Dive\n",
        );
        assert!(errors.is_empty());
        assert_eq!(
            anchor_names(&info),
            vec!["intro", "setup", "setup-1", "deep-dive"]
        );
        assert_eq!(info.anchors[0].kind, AnchorType::Header(1));
        assert_eq!(info.anchors[3].kind, AnchorType::Header(3));
    }

    #[test]
    fn setext_headers_are_recognized() {
        let (info, _) = scan("Big Title\n=========\n\nSub Title\n---------\n");
        assert_eq!(anchor_names(&info), vec!["big-title", "sub-title"]);
        assert_eq!(info.anchors[0].kind, AnchorType::Header(1));
        assert_eq!(info.anchors[1].kind, AnchorType::Header(2));
    }

    #[test]
    fn inline_links_split_fragment_and_decode() {
        let (info, errors) = scan("[go](./a.md#section%20one)\n");
        assert!(errors.is_empty());
        let reference = &info.references[0];
        assert_eq!(reference.text, "go");
        assert_eq!(reference.link, "./a.md");
        assert_eq!(reference.anchor.as_deref(), Some("section one"));
        assert!(reference.copy_paste_check);
        assert_eq!(reference.position.line, 1);
    }

    #[test]
    fn reference_style_links_resolve_definitions() {
        let (info, _) = scan("See [the docs][docs].\n\n[docs]: ./docs/README.md\n");
        let reference = info
            .references
            .iter()
            .find(|r| r.text == "the docs")
            .expect("resolved reference");
        assert_eq!(reference.link, "./docs/README.md");
        // The definition itself is addressable as a bibliography anchor.
        assert!(info
            .anchors
            .iter()
            .any(|a| a.kind == AnchorType::Biblio && a.name == "docs"));
    }

    #[test]
    fn autolinks_and_emails_are_recorded() {
        let (info, _) = scan("<https://example.com> and <dev@example.com>\n");
        assert_eq!(info.references[0].link, "https://example.com");
        assert!(info.references[1].link.starts_with("mailto:"));
    }

    #[test]
    fn images_are_references() {
        let (info, _) = scan("![diagram](./img/arch.png)\n");
        assert_eq!(info.references[0].link, "./img/arch.png");
        assert_eq!(info.references[0].text, "diagram");
    }

    #[test]
    fn links_inside_headers_count_for_both() {
        let (info, _) = scan("## See [docs](./d.md) here\n");
        assert_eq!(anchor_names(&info), vec!["see-docs-here"]);
        assert_eq!(info.references[0].link, "./d.md");
    }

    #[test]
    fn handmade_anchors_are_collected() {
        let (info, _) = scan("<a name=\"top\"></a>\n\nText with <a id=\"mid\"></a> inline.\n");
        let handmade: Vec<&str> = info
            .anchors
            .iter()
            .filter(|a| a.kind == AnchorType::Handmade)
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(handmade, vec!["top", "mid"]);
    }

    #[test]
    fn ignore_link_excludes_the_next_link() {
        let (info, errors) =
            scan("<!-- xrefcheck: ignore link -->\n[dead](./gone.md) and [live](./here.md)\n");
        assert!(errors.is_empty());
        assert!(!info.references[0].copy_paste_check);
        assert!(info.references[1].copy_paste_check);
    }

    #[test]
    fn inline_ignore_link_annotation_works_mid_paragraph() {
        let (info, errors) =
            scan("See <!-- xrefcheck: ignore link --> [dead](./gone.md) for details.\n");
        assert!(errors.is_empty());
        assert!(!info.references[0].copy_paste_check);
    }

    #[test]
    fn ignore_link_without_a_link_is_an_error() {
        let (_, errors) = scan("<!-- xrefcheck: ignore link -->\njust text\n");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0].kind,
            ScanErrorKind::ExpectedLinkAfterIgnoreLink
        ));
    }

    #[test]
    fn ignore_paragraph_excludes_all_its_links() {
        let (info, errors) = scan(
            "<!-- xrefcheck: ignore paragraph -->\n\n[a](./a.md) and [b](./b.md)\n\n[c](./c.md)\n",
        );
        assert!(errors.is_empty());
        assert!(!info.references[0].copy_paste_check);
        assert!(!info.references[1].copy_paste_check);
        assert!(info.references[2].copy_paste_check);
    }

    #[test]
    fn ignore_paragraph_before_a_list_is_an_error() {
        let (_, errors) = scan("<!-- xrefcheck: ignore paragraph -->\n\n- item\n");
        assert_eq!(errors.len(), 1);
        match &errors[0].kind {
            ScanErrorKind::ExpectedParagraphAfterIgnoreParagraph { found } => {
                assert_eq!(found, "list");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn ignore_all_at_top_excludes_every_reference() {
        let (info, errors) = scan(
            "<!-- a comment -->\n<!-- xrefcheck: ignore all -->\n\n# Title\n\n[x](./x.md)\n",
        );
        assert!(errors.is_empty());
        assert!(info.references.iter().all(|r| !r.copy_paste_check));
        // Anchors stay addressable from other files.
        assert_eq!(anchor_names(&info), vec!["title"]);
    }

    #[test]
    fn ignore_all_after_content_is_misplaced() {
        let (_, errors) = scan("# Title\n\n<!-- xrefcheck: ignore all -->\n");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].kind, ScanErrorKind::IgnoreAllMisplaced));
    }

    #[test]
    fn unknown_annotation_options_are_reported() {
        let (_, errors) = scan("<!-- xrefcheck: ignore everything -->\n\ntext\n");
        assert_eq!(errors.len(), 1);
        match &errors[0].kind {
            ScanErrorKind::UnrecognisedIgnoreOption { option } => {
                assert_eq!(option, "ignore everything");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn plain_comments_are_not_annotations() {
        let (info, errors) = scan("<!-- regular comment -->\n\n[a](./a.md)\n");
        assert!(errors.is_empty());
        assert!(info.references[0].copy_paste_check);
    }

    #[test]
    fn errors_do_not_stop_the_scan() {
        let (info, errors) = scan(
            "<!-- xrefcheck: ignore link -->\n\n# Still Scanned\n\n[kept](./kept.md)\n",
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(anchor_names(&info), vec!["still-scanned"]);
        assert_eq!(info.references.len(), 1);
        assert!(info.references[0].copy_paste_check);
    }

    #[test]
    fn positions_point_at_the_construct() {
        let (info, _) = scan("# One\n\nSome [link](./x.md) here.\n");
        let reference = &info.references[0];
        assert_eq!(reference.position.line, 3);
        assert_eq!(reference.position.column, 6);
    }
}
