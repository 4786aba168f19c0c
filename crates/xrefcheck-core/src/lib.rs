//! # xrefcheck-core
//!
//! Core functionality for xrefcheck, a verifier for cross references in
//! repository documentation. The crate scans git-tracked markup files into a
//! reference/anchor graph, then checks that every reference resolves: local
//! paths against the scanned repository, in-document anchors against computed
//! slugs, external URLs against the live network.
//!
//! ## Architecture
//!
//! Data flows linearly through three stages:
//!
//! 1. **Scan** ([`scan`], [`markdown`]): enumerate files through git,
//!    dispatch each to a format scanner, assemble a [`RepoInfo`] plus
//!    accumulated scan errors.
//! 2. **Verify** ([`verify`]): resolve every reference against the graph or
//!    probe it over HTTP, with per-domain rate-limit coordination and a
//!    bounded worker pool.
//! 3. **Report**: the caller renders [`VerifyResult`] and the scan errors;
//!    this crate never prints.
//!
//! Progress counters ([`progress`]) flow upward from the verifier while it
//! runs, for a CLI to display live.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use xrefcheck_core::{
//!     Config, MarkdownScanner, RepoScanner, ScanMode, ScannerRegistry, Verifier, VerifyConfig,
//!     VerifyMode,
//! };
//!
//! # async fn run() -> xrefcheck_core::Result<()> {
//! let config = Config::default();
//! let registry = ScannerRegistry::new(vec![Arc::new(MarkdownScanner::new(
//!     &config.scanners.markdown,
//! ))]);
//! let exclusions = config.exclusions.compile()?;
//! let scanner = RepoScanner::new(registry, ScanMode::OnlyTracked, exclusions.clone());
//! let (repo, scan_errors) = scanner.scan(std::path::Path::new("."))?;
//!
//! let verifier = Verifier::new(VerifyConfig::from_config(&config, VerifyMode::Full), exclusions)?;
//! let result = verifier.verify_repo(&repo, &CancellationToken::new()).await;
//! println!("{} scan errors, {} bad references", scan_errors.len(), result.errors.len());
//! # Ok(())
//! # }
//! ```

/// Anchors, slug computation, and similarity scoring
pub mod anchor;
/// Configuration file format and compiled exclusion patterns
pub mod config;
/// Error types and result alias
pub mod error;
/// Markdown scanner built on pulldown-cmark
pub mod markdown;
/// Path canonicalization and glob/regex matching
pub mod paths;
/// Shared verification progress counters
pub mod progress;
/// Repository enumeration and the scanner registry
pub mod scan;
/// Core data types: references, anchors, the repository graph
pub mod types;
/// Local and external reference verification
pub mod verify;

pub use anchor::{Anchor, AnchorType, Flavor, slugify, strip_anchor_dup_no};
pub use config::{CompiledExclusions, Config, ExclusionConfig, MarkdownConfig, NetworkingConfig};
pub use error::{Error, Result};
pub use markdown::MarkdownScanner;
pub use progress::{Progress, SharedProgress, VerifyProgress};
pub use scan::{
    FileScanner, GatherScanError, ParseScanError, RepoScanner, ScanErrorKind, ScanMode,
    ScannerRegistry,
};
pub use types::{
    DirStatus, FileInfo, FileStatus, LocationType, Position, Reference, RepoInfo,
};
pub use verify::{
    CopyPasteCheckResult, InvalidReference, VerifyConfig, VerifyError, VerifyMode, VerifyResult,
    Verifier, detect_copy_pastes,
};
