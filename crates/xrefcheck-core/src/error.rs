//! Error types for xrefcheck-core operations.
//!
//! Only fatal failures surface as [`Error`]: broken configuration, an
//! unusable repository root, a git invocation that did not succeed. Problems
//! found *inside* documents travel as values instead (scan errors accumulate
//! per file, verification failures accumulate per reference), so a single
//! malformed file never aborts the run.

use thiserror::Error;

/// The main error type for xrefcheck-core operations.
///
/// Every variant maps to the configuration/environment error class: callers
/// that receive an `Error` should report it once and exit with status 2.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed (reading a file, resolving a path).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A git subprocess could not be spawned or exited non-zero.
    #[error("`git {command}` failed: {message}")]
    Git {
        /// Arguments passed to git, space-joined.
        command: String,
        /// Captured stderr or spawn failure description.
        message: String,
    },

    /// Configuration is invalid: unknown keys, bad globs or regexes,
    /// out-of-range thresholds, unparseable durations.
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(String),
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience alias used throughout xrefcheck-core.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn display_includes_context() {
        let err = Error::Git {
            command: "ls-files".into(),
            message: "not a git repository".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("ls-files"));
        assert!(rendered.contains("not a git repository"));

        let err = Error::Config("bad glob `[`".into());
        assert!(err.to_string().contains("bad glob"));
    }

    #[test]
    fn io_errors_convert() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("missing"));
    }
}
