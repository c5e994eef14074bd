//! Error types for the drift-rs library
//!
//! Errors are tagged values, not exceptions-as-flow: workers return them,
//! the scan coordinator aggregates them, and only the command boundary turns
//! the aggregate into a user-visible summary.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for drift-rs operations
#[derive(Error, Debug)]
pub enum Error {
    /// The caller passed something invalid. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced entity (pattern id, project, file) does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What kind of entity was looked up ("pattern", "project", "file")
        kind: &'static str,
        /// The identifier that failed to resolve
        name: String,
    },

    /// A retryable I/O failure. The store boundary retries these up to
    /// three times with exponential backoff before surfacing them.
    #[error("transient I/O error on {path}: {source}")]
    IoTransient {
        /// Path the operation was touching
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A detector failed on a single file. Captured per file and logged;
    /// the scan continues and the failure lands in `ScanResult::errors`.
    #[error("detector {detector} failed on {file}: {message}")]
    DetectorFailure {
        /// Id of the failing detector
        detector: String,
        /// File being analyzed when the failure occurred
        file: PathBuf,
        /// Failure description
        message: String,
    },

    /// An invariant was violated. Surfaces immediately with full context
    /// and is never recovered.
    #[error("internal error: {0}")]
    Internal(String),

    /// Non-transient IO errors (missing directories, permission walls)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors for on-disk artifacts
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An ignore or include glob failed to compile
    #[error("invalid glob pattern '{pattern}': {message}")]
    Glob {
        /// The offending pattern
        pattern: String,
        /// Compiler diagnostic
        message: String,
    },
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] over a pattern id.
    pub fn pattern_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "pattern",
            name: id.into(),
        }
    }

    /// Shorthand for a [`Error::NotFound`] over a project reference.
    pub fn project_not_found(reference: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "project",
            name: reference.into(),
        }
    }

    /// Whether the store boundary may retry this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::IoTransient { .. })
    }

    /// Process exit code for this error when surfaced by the CLI shell.
    ///
    /// `1` for user errors, `10` and up for internal faults.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) | Error::NotFound { .. } => 1,
            Error::Internal(_) => 10,
            _ => 11,
        }
    }
}

/// Type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_formats_kind_and_name() {
        let err = Error::pattern_not_found("api/route-structure/casing");
        assert_eq!(
            err.to_string(),
            "pattern not found: api/route-structure/casing"
        );
    }

    #[test]
    fn transient_classification() {
        let err = Error::IoTransient {
            path: PathBuf::from(".drift/patterns/discovered/api.json"),
            source: std::io::Error::new(std::io::ErrorKind::Interrupted, "interrupted"),
        };
        assert!(err.is_transient());
        assert!(!Error::InvalidArgument("x".into()).is_transient());
    }

    #[test]
    fn exit_codes_follow_contract() {
        assert_eq!(Error::InvalidArgument("bad".into()).exit_code(), 1);
        assert_eq!(Error::project_not_found("p").exit_code(), 1);
        assert_eq!(Error::Internal("broken invariant".into()).exit_code(), 10);
    }
}
