//! Configuration: YAML file format, defaults, and the compiled form the
//! pipeline actually consumes.
//!
//! The on-disk format uses camelCase keys:
//!
//! ```yaml
//! exclusions:
//!   ignore: ["vendor/**"]
//!   ignoreRefsFrom: ["CHANGELOG.md"]
//!   ignoreLocalRefsTo: ["generated/**"]
//!   ignoreExternalRefsTo: ["https://localhost.*"]
//! networking:
//!   externalRefCheckTimeout: 10s
//!   ignoreAuthFailures: false
//!   defaultRetryAfter: 30s
//!   maxRetries: 3
//! scanners:
//!   anchorSimilarityThreshold: 0.5
//!   markdown:
//!     flavor: GitHub
//! ```
//!
//! Durations are an integer with a unit suffix (`ms`, `s`, `m`, `h`).
//! Loading validates everything eagerly: globs, regexes, and the similarity
//! threshold fail at startup rather than mid-scan.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::anchor::Flavor;
use crate::paths::{RelativeGlobs, compile_extended_regex};
use crate::{Error, Result};

/// File names probed, in order, when no `--config` is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    ".xrefcheck.yaml",
    "xrefcheck.yaml",
    ".xrefcheck.yml",
    "xrefcheck.yml",
];

/// Top-level configuration, mirroring the YAML layout.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct Config {
    pub exclusions: ExclusionConfig,
    pub networking: NetworkingConfig,
    pub scanners: ScannersConfig,
}

/// Which files and targets are exempt from scanning or verification.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ExclusionConfig {
    /// Globs for files to drop from the scan entirely.
    pub ignore: Vec<String>,
    /// Globs for files whose own references are not verified. Their anchors
    /// still load, so other files may link into them.
    pub ignore_refs_from: Vec<String>,
    /// Globs for local targets accepted without existence checks.
    pub ignore_local_refs_to: Vec<String>,
    /// Extended regexes for external URLs accepted without probing.
    pub ignore_external_refs_to: Vec<String>,
    /// Globs for paths treated as existing even though git does not track
    /// them (generated documentation, mounted volumes).
    pub virtual_files: Vec<String>,
}

/// External probing behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct NetworkingConfig {
    /// Per-attempt timeout for external requests; retries restart it.
    #[serde(with = "duration_text")]
    pub external_ref_check_timeout: Duration,
    /// Treat 401 and 403 responses as healthy.
    pub ignore_auth_failures: bool,
    /// Wait applied to a 429 response that carries no `Retry-After` header.
    #[serde(with = "duration_text")]
    pub default_retry_after: Duration,
    /// How many times a rate-limited request is retried before giving up.
    pub max_retries: usize,
}

impl Default for NetworkingConfig {
    fn default() -> Self {
        Self {
            external_ref_check_timeout: Duration::from_secs(10),
            ignore_auth_failures: false,
            default_retry_after: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Parser selection and tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ScannersConfig {
    /// Minimum similarity, in `[0, 1]`, for an anchor suggestion. Higher
    /// means stricter.
    pub anchor_similarity_threshold: f64,
    pub markdown: MarkdownConfig,
}

impl Default for ScannersConfig {
    fn default() -> Self {
        Self {
            anchor_similarity_threshold: 0.5,
            markdown: MarkdownConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MarkdownConfig {
    pub flavor: Flavor,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::Config(format!("cannot read `{}`: {err}", path.display()))
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|err| {
            Error::Config(format!("cannot parse `{}`: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Find a config file under `root`, probing [`DEFAULT_CONFIG_PATHS`].
    pub fn search(root: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(|name| root.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Eagerly check everything that can only fail at runtime otherwise.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.scanners.anchor_similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "anchorSimilarityThreshold must lie in [0, 1], got {threshold}"
            )));
        }
        self.exclusions.compile()?;
        Ok(())
    }

    /// Render as YAML, the same shape [`Config::load`] accepts.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl ExclusionConfig {
    /// Compile globs and regexes into matchable form.
    pub fn compile(&self) -> Result<CompiledExclusions> {
        Ok(CompiledExclusions {
            ignore: RelativeGlobs::compile(&self.ignore)?,
            ignore_refs_from: RelativeGlobs::compile(&self.ignore_refs_from)?,
            ignore_local_refs_to: RelativeGlobs::compile(&self.ignore_local_refs_to)?,
            ignore_external_refs_to: self
                .ignore_external_refs_to
                .iter()
                .map(|pattern| compile_extended_regex(pattern))
                .collect::<Result<Vec<_>>>()?,
            virtual_files: RelativeGlobs::compile(&self.virtual_files)?,
        })
    }
}

/// Exclusion patterns in compiled form, shared by scanner and verifier.
#[derive(Clone, Debug, Default)]
pub struct CompiledExclusions {
    pub ignore: RelativeGlobs,
    pub ignore_refs_from: RelativeGlobs,
    pub ignore_local_refs_to: RelativeGlobs,
    pub ignore_external_refs_to: Vec<Regex>,
    pub virtual_files: RelativeGlobs,
}

impl CompiledExclusions {
    pub fn ignores_external_url(&self, url: &str) -> bool {
        self.ignore_external_refs_to.iter().any(|re| re.is_match(url))
    }
}

mod duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(de)?;
        humantime::parse_duration(&text).map_err(|err| {
            D::Error::custom(format!("invalid duration `{text}`: {err}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roundtrips_through_yaml() {
        let rendered = Config::default().to_yaml().unwrap();
        let parsed: Config = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(
            parsed.networking.external_ref_check_timeout,
            Duration::from_secs(10)
        );
        assert_eq!(parsed.networking.max_retries, 3);
        assert_eq!(parsed.scanners.markdown.flavor, Flavor::GitHub);
    }

    #[test]
    fn parses_full_file() {
        let yaml = r"
exclusions:
  ignore: ['vendor/**']
  ignoreRefsFrom: ['CHANGELOG.md']
  ignoreLocalRefsTo: ['target/**']
  ignoreExternalRefsTo: ['https://localhost.*']
  virtualFiles: ['generated/**']
networking:
  externalRefCheckTimeout: 3s
  ignoreAuthFailures: true
  defaultRetryAfter: 500ms
  maxRetries: 5
scanners:
  anchorSimilarityThreshold: 0.8
  markdown:
    flavor: GitLab
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.exclusions.ignore, vec!["vendor/**".to_string()]);
        assert_eq!(
            config.networking.external_ref_check_timeout,
            Duration::from_secs(3)
        );
        assert_eq!(
            config.networking.default_retry_after,
            Duration::from_millis(500)
        );
        assert!(config.networking.ignore_auth_failures);
        assert_eq!(config.networking.max_retries, 5);
        assert_eq!(config.scanners.markdown.flavor, Flavor::GitLab);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let yaml = "networking:\n  retires: 3\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn bad_threshold_fails_validation() {
        let yaml = "scanners:\n  anchorSimilarityThreshold: 1.5\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_duration_is_an_error() {
        let yaml = "networking:\n  externalRefCheckTimeout: tomorrow\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn search_probes_names_in_order() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::search(dir.path()), None);

        std::fs::write(dir.path().join("xrefcheck.yaml"), "{}").unwrap();
        std::fs::write(dir.path().join(".xrefcheck.yaml"), "{}").unwrap();
        assert_eq!(
            Config::search(dir.path()),
            Some(dir.path().join(".xrefcheck.yaml"))
        );
    }
}
