//! Reference verification.
//!
//! Local references resolve against the immutable [`RepoInfo`]; external
//! references are probed over HTTP with bounded concurrency. Rate limiting
//! is coordinated process-wide: when any probe receives a 429 for a domain,
//! it publishes a wake time into a shared map and every later probe to that
//! domain sleeps until the time has passed. Writers keep the later time, so
//! the gate only ever moves forward.
//!
//! Verification failures are values, collected and ordered by file and
//! position; a single unreachable host never aborts the run.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode, redirect};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::anchor::{Anchor, strip_anchor_dup_no, suggest_anchors};
use crate::config::{CompiledExclusions, Config, NetworkingConfig};
use crate::paths;
use crate::progress::{SharedProgress, shared};
use crate::types::{FileStatus, LocationType, Reference, RepoInfo};
use crate::{Error, Result};

/// Follow at most this many redirects before giving up on a URL.
const MAX_REDIRECTS: usize = 10;

/// Default bound on concurrently running external probes.
const DEFAULT_CONCURRENCY: usize = 16;

/// Which verification families run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VerifyMode {
    LocalOnly,
    ExternalOnly,
    #[default]
    Full,
}

impl VerifyMode {
    pub fn checks_local(self) -> bool {
        matches!(self, Self::LocalOnly | Self::Full)
    }

    pub fn checks_external(self) -> bool {
        matches!(self, Self::ExternalOnly | Self::Full)
    }
}

/// Why a reference failed verification.
#[derive(Clone, Debug, PartialEq)]
pub enum VerifyError {
    LocalFileDoesNotExist {
        path: PathBuf,
    },
    AnchorDoesNotExist {
        name: String,
        suggestions: Vec<String>,
    },
    AmbiguousAnchorRef {
        matches: Vec<Anchor>,
    },
    ExternalResourceUnavailable {
        code: u16,
        message: String,
    },
    ExternalResourceTimeout,
    ExternalResourceNetworkError(String),
    ExternalResourceSomeError(String),
    RedirectChainTooLong,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalFileDoesNotExist { path } => {
                write!(f, "linked file does not exist: {}", path.display())
            }
            Self::AnchorDoesNotExist { name, suggestions } => {
                write!(f, "anchor `{name}` does not exist")?;
                if !suggestions.is_empty() {
                    write!(f, ", did you mean `{}`?", suggestions.join("`, `"))?;
                }
                Ok(())
            }
            Self::AmbiguousAnchorRef { matches } => {
                write!(f, "anchor reference is ambiguous, matches")?;
                for anchor in matches {
                    write!(f, " {} at {};", anchor.kind, anchor.position)?;
                }
                Ok(())
            }
            Self::ExternalResourceUnavailable { code, message } => {
                write!(f, "external resource unavailable (HTTP {code} {message})")
            }
            Self::ExternalResourceTimeout => f.write_str("external resource check timed out"),
            Self::ExternalResourceNetworkError(message) => {
                write!(f, "network error: {message}")
            }
            Self::ExternalResourceSomeError(message) => f.write_str(message),
            Self::RedirectChainTooLong => f.write_str("too many redirects"),
        }
    }
}

/// A reference together with the failure it produced.
#[derive(Clone, Debug)]
pub struct InvalidReference {
    pub file: PathBuf,
    pub reference: Reference,
    pub error: VerifyError,
}

/// Two references in one file that share a target but not a name.
#[derive(Clone, Debug)]
pub struct CopyPasteCheckResult {
    pub file: PathBuf,
    pub original: Reference,
    pub copied: Reference,
}

/// Everything one verification run produced.
#[derive(Debug, Default)]
pub struct VerifyResult {
    pub errors: Vec<InvalidReference>,
    pub copy_pastes: Vec<CopyPasteCheckResult>,
    /// Set when cancellation cut the run short; collected results are partial.
    pub interrupted: bool,
}

impl VerifyResult {
    /// The collected failures, or `None` when every reference verified.
    pub fn verify_errors(&self) -> Option<&[InvalidReference]> {
        if self.errors.is_empty() {
            None
        } else {
            Some(&self.errors)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && !self.interrupted
    }
}

/// Verifier tuning, extracted from the loaded configuration.
#[derive(Clone, Debug)]
pub struct VerifyConfig {
    pub mode: VerifyMode,
    pub networking: NetworkingConfig,
    pub anchor_similarity_threshold: f64,
    pub max_concurrency: usize,
}

impl VerifyConfig {
    pub fn from_config(config: &Config, mode: VerifyMode) -> Self {
        Self {
            mode,
            networking: config.networking.clone(),
            anchor_similarity_threshold: config.scanners.anchor_similarity_threshold,
            max_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// What one HTTP attempt told us.
enum RequestOutcome {
    Healthy,
    AuthDenied(u16),
    RateLimited(Option<Duration>),
    Unavailable { code: u16, message: String },
    Failed(VerifyError),
}

/// Successful probe metadata.
#[derive(Debug)]
pub struct ProbeReport {
    /// How many rate-limit retries the probe needed.
    pub retries: usize,
}

/// Verifies a scanned repository.
pub struct Verifier {
    config: VerifyConfig,
    exclusions: CompiledExclusions,
    client: Client,
    /// Per-domain earliest next request time, shared across all probes.
    retry_wakeups: Arc<Mutex<HashMap<String, Instant>>>,
    progress: SharedProgress,
}

impl Verifier {
    pub fn new(config: VerifyConfig, exclusions: CompiledExclusions) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("xrefcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| Error::Http(err.to_string()))?;
        Ok(Self {
            config,
            exclusions,
            client,
            retry_wakeups: Arc::new(Mutex::new(HashMap::new())),
            progress: shared(0, 0),
        })
    }

    /// Shared progress handle for a display layer to sample.
    pub fn progress(&self) -> SharedProgress {
        Arc::clone(&self.progress)
    }

    /// Verify every checked reference in the repository.
    pub async fn verify_repo(&self, repo: &RepoInfo, cancel: &CancellationToken) -> VerifyResult {
        let mut result = VerifyResult::default();

        let mut local_work: Vec<(&PathBuf, &Reference)> = Vec::new();
        let mut external_groups: BTreeMap<&str, Vec<(&PathBuf, &Reference)>> = BTreeMap::new();
        let mut external_refs: u64 = 0;
        for (file, info) in repo.scanned_files() {
            if self.exclusions.ignore_refs_from.matches(&repo.root, file) {
                debug!("references from {} are not verified", file.display());
                continue;
            }
            for reference in &info.references {
                if !reference.copy_paste_check {
                    // Excluded through an ignore annotation.
                    continue;
                }
                match reference.location_type() {
                    LocationType::Local | LocationType::Relative | LocationType::Absolute => {
                        if self.config.mode.checks_local() {
                            local_work.push((file, reference));
                        }
                    }
                    LocationType::External => {
                        if self.config.mode.checks_external() {
                            if self.exclusions.ignores_external_url(&reference.link) {
                                debug!("{} accepted by exclusion pattern", reference.link);
                                continue;
                            }
                            external_refs += 1;
                            external_groups
                                .entry(reference.link.as_str())
                                .or_default()
                                .push((file, reference));
                        }
                    }
                    LocationType::Other => {}
                }
            }
        }

        {
            let mut progress = self.progress.lock().expect("progress lock");
            progress.local.total = local_work.len() as u64;
            progress.external.total = external_refs;
        }

        for (file, reference) in local_work {
            if cancel.is_cancelled() {
                result.interrupted = true;
                break;
            }
            let outcome = self.check_local(repo, file, reference);
            let mut progress = self.progress.lock().expect("progress lock");
            progress.local.incr_done();
            if let Some(error) = outcome {
                progress.local.incr_errors();
                drop(progress);
                result.errors.push(InvalidReference {
                    file: file.clone(),
                    reference: reference.clone(),
                    error,
                });
            }
        }

        if !external_groups.is_empty() {
            let stream = futures::stream::iter(external_groups.iter().map(|(url, refs)| {
                async move {
                    let outcome = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        probe = self.probe_external(url) => Some(probe),
                    };
                    (*url, refs, outcome)
                }
            }))
            .buffer_unordered(self.config.max_concurrency);
            futures::pin_mut!(stream);

            while let Some((url, refs, outcome)) = stream.next().await {
                let count = refs.len() as u64;
                match outcome {
                    None => result.interrupted = true,
                    Some(Ok(report)) => {
                        debug!(url, retries = report.retries, "external reference is healthy");
                        self.progress
                            .lock()
                            .expect("progress lock")
                            .external
                            .add_done(count);
                    }
                    Some(Err(error)) => {
                        {
                            let mut progress = self.progress.lock().expect("progress lock");
                            progress.external.add_done(count);
                            progress.external.add_errors(count);
                        }
                        for (file, reference) in refs {
                            result.errors.push(InvalidReference {
                                file: (*file).clone(),
                                reference: (*reference).clone(),
                                error: error.clone(),
                            });
                        }
                    }
                }
            }
        }

        for (file, info) in repo.scanned_files() {
            if self.exclusions.ignore_refs_from.matches(&repo.root, file) {
                continue;
            }
            result
                .copy_pastes
                .extend(detect_copy_pastes(file, &info.references));
        }

        result
            .errors
            .sort_by(|a, b| {
                a.file
                    .cmp(&b.file)
                    .then(a.reference.position.cmp(&b.reference.position))
            });
        result.copy_pastes.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then(a.copied.position.cmp(&b.copied.position))
        });
        result
    }

    /// Resolve one local reference against the scan product.
    fn check_local(
        &self,
        repo: &RepoInfo,
        file: &Path,
        reference: &Reference,
    ) -> Option<VerifyError> {
        let root = &repo.root;
        let decoded = percent_encoding::percent_decode_str(&reference.link)
            .decode_utf8_lossy()
            .into_owned();
        let target = match reference.location_type() {
            LocationType::Local => file.to_path_buf(),
            LocationType::Relative => {
                paths::normalize(&file.parent().unwrap_or(root).join(&decoded))
            }
            LocationType::Absolute => {
                let trimmed = decoded.trim_start_matches(std::path::is_separator);
                paths::join_under_root(root, Path::new(trimmed))
            }
            _ => return None,
        };

        if self.exclusions.ignore_local_refs_to.matches(root, &target) {
            return None;
        }

        let entry = repo.files.get(&target);
        let exists = entry.is_some()
            || target == *root
            || repo.directories.contains_key(&target)
            || self.exclusions.virtual_files.matches(root, &target);
        if !exists {
            return Some(VerifyError::LocalFileDoesNotExist { path: target });
        }

        let anchor_name = reference.anchor.as_ref()?;
        // Anchors can only be checked in files a scanner understood.
        let Some(FileStatus::Scanned(info)) = entry else {
            return None;
        };
        self.check_anchor(info.anchors.as_slice(), anchor_name)
    }

    fn check_anchor(&self, anchors: &[Anchor], name: &str) -> Option<VerifyError> {
        let matches: Vec<&Anchor> = anchors.iter().filter(|a| a.name == name).collect();
        match matches.len() {
            1 => None,
            0 => {
                let mut suggestions = Vec::new();
                if let Some(bare) = strip_anchor_dup_no(name) {
                    if anchors.iter().any(|a| a.name == bare) {
                        suggestions.push(bare);
                    }
                }
                let similar = suggest_anchors(
                    name,
                    anchors.iter().map(|a| a.name.as_str()),
                    self.config.anchor_similarity_threshold,
                );
                for candidate in similar {
                    if !suggestions.contains(&candidate) {
                        suggestions.push(candidate);
                    }
                }
                Some(VerifyError::AnchorDoesNotExist {
                    name: name.to_string(),
                    suggestions,
                })
            }
            _ => Some(VerifyError::AmbiguousAnchorRef {
                matches: matches.into_iter().cloned().collect(),
            }),
        }
    }

    /// Probe one external URL, retrying through rate limits.
    async fn probe_external(&self, url: &str) -> std::result::Result<ProbeReport, VerifyError> {
        let parsed = Url::parse(url).map_err(|err| {
            VerifyError::ExternalResourceSomeError(format!("invalid URL `{url}`: {err}"))
        })?;
        let domain = parsed
            .host_str()
            .ok_or_else(|| {
                VerifyError::ExternalResourceSomeError(format!("URL `{url}` has no host"))
            })?
            .to_string();

        let max_retries = self.config.networking.max_retries;
        let mut retries = 0;
        let mut rate_limited = false;

        let outcome = loop {
            self.wait_for_domain(&domain).await;
            match self.request_once(url).await {
                RequestOutcome::Healthy => break Ok(()),
                RequestOutcome::AuthDenied(code) => {
                    if self.config.networking.ignore_auth_failures {
                        break Ok(());
                    }
                    break Err(VerifyError::ExternalResourceUnavailable {
                        code,
                        message: StatusCode::from_u16(code)
                            .ok()
                            .and_then(|status| status.canonical_reason())
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
                RequestOutcome::RateLimited(retry_after) => {
                    let delay = retry_after
                        .unwrap_or(self.config.networking.default_retry_after);
                    self.schedule_domain_wakeup(&domain, Instant::now() + delay);
                    if !rate_limited {
                        rate_limited = true;
                        self.progress
                            .lock()
                            .expect("progress lock")
                            .external_fixable
                            .incr_total();
                    }
                    if retries >= max_retries {
                        break Err(VerifyError::ExternalResourceUnavailable {
                            code: StatusCode::TOO_MANY_REQUESTS.as_u16(),
                            message: "Too Many Requests".to_string(),
                        });
                    }
                    retries += 1;
                    debug!(url, retries, delay = ?delay, "rate limited, will retry");
                }
                RequestOutcome::Unavailable { code, message } => {
                    break Err(VerifyError::ExternalResourceUnavailable { code, message });
                }
                RequestOutcome::Failed(error) => break Err(error),
            }
        };

        if rate_limited {
            self.progress
                .lock()
                .expect("progress lock")
                .external_fixable
                .incr_done();
        }
        outcome.map(|()| ProbeReport { retries })
    }

    /// One HEAD attempt, falling back to GET when HEAD is not supported.
    async fn request_once(&self, url: &str) -> RequestOutcome {
        let timeout = self.config.networking.external_ref_check_timeout;
        let head = self.client.head(url).timeout(timeout).send().await;
        let response = match head {
            Ok(response)
                if matches!(
                    response.status(),
                    StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
                ) =>
            {
                match self.client.get(url).timeout(timeout).send().await {
                    Ok(response) => response,
                    Err(err) => return RequestOutcome::Failed(classify_request_error(&err)),
                }
            }
            Ok(response) => response,
            Err(err) => return RequestOutcome::Failed(classify_request_error(&err)),
        };

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            RequestOutcome::Healthy
        } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            RequestOutcome::AuthDenied(status.as_u16())
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            RequestOutcome::RateLimited(parse_retry_after(response.headers()))
        } else {
            RequestOutcome::Unavailable {
                code: status.as_u16(),
                message: status.canonical_reason().unwrap_or_default().to_string(),
            }
        }
    }

    async fn wait_for_domain(&self, domain: &str) {
        let wake = {
            let map = self.retry_wakeups.lock().expect("retry map lock");
            map.get(domain).copied()
        };
        if let Some(wake) = wake {
            if wake > Instant::now() {
                debug!(domain, "waiting out a rate-limit window");
                tokio::time::sleep_until(wake).await;
            }
        }
    }

    /// Publish a wake time for a domain, keeping the later one on conflict.
    fn schedule_domain_wakeup(&self, domain: &str, wake: Instant) {
        let mut map = self.retry_wakeups.lock().expect("retry map lock");
        map.entry(domain.to_string())
            .and_modify(|existing| {
                if wake > *existing {
                    *existing = wake;
                }
            })
            .or_insert(wake);
    }
}

fn classify_request_error(err: &reqwest::Error) -> VerifyError {
    if err.is_timeout() {
        VerifyError::ExternalResourceTimeout
    } else if err.is_redirect() {
        VerifyError::RedirectChainTooLong
    } else if err.is_connect() {
        VerifyError::ExternalResourceNetworkError(err.to_string())
    } else {
        VerifyError::ExternalResourceSomeError(err.to_string())
    }
}

/// Parse `Retry-After` as delta seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Find references that were copied without updating their text.
///
/// Checked references are grouped by `(link, anchor)`. Within a group, a
/// reference whose comparable text (lowercased, non-alphanumerics dropped)
/// occurs inside the comparable target is an original candidate; everything
/// else was likely pasted. The first candidate in document order is reported
/// as the original of each such paste. A group without candidates produces
/// nothing, since there is no name to compare against.
pub fn detect_copy_pastes(file: &Path, references: &[Reference]) -> Vec<CopyPasteCheckResult> {
    let mut groups: BTreeMap<(&str, Option<&str>), Vec<&Reference>> = BTreeMap::new();
    for reference in references.iter().filter(|r| r.copy_paste_check) {
        groups
            .entry((reference.link.as_str(), reference.anchor.as_deref()))
            .or_default()
            .push(reference);
    }

    let mut results = Vec::new();
    for ((link, anchor), group) in groups {
        if group.len() < 2 {
            continue;
        }
        let target = comparable(&format!("{link}{}", anchor.unwrap_or_default()));
        let (originals, copies): (Vec<&Reference>, Vec<&Reference>) =
            group.into_iter().partition(|reference| {
                let name = comparable(&reference.text);
                !name.is_empty() && target.contains(&name)
            });
        let Some(original) = originals.first() else {
            continue;
        };
        for copied in copies {
            results.push(CopyPasteCheckResult {
                file: file.to_path_buf(),
                original: (*original).clone(),
                copied: copied.clone(),
            });
        }
    }
    results
}

/// Lowercase and keep only alphanumerics; whitespace and punctuation are
/// irrelevant when comparing a link text against its target.
fn comparable(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}
