//! Shared data model for patterns, violations, variants, and boundaries
//!
//! Everything the pipeline persists or surfaces lives here: the pattern
//! record with its evidence and counter-evidence, the violation projection,
//! sanctioned variants, and the data-access structures produced by the
//! boundary analyzer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

mod boundary;
mod pattern;
mod variant;
mod violation;

pub use boundary::{
    AccessOperation, AccessPoint, EnvIssue, SecretFinding, SensitiveField, Sensitivity,
};
pub use pattern::{
    Confidence, ConfidenceLevel, Outlier, Pattern, PatternMetadata, PatternStatus,
};
pub use variant::{Variant, VariantScope};
pub use violation::Violation;

/// A position in source code. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// File path, relative to the project root
    pub file: PathBuf,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// End line, when the match spans a range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    /// End column, when the match spans a range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_column: Option<usize>,
}

impl Location {
    /// Creates a point location.
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            end_line: None,
            end_column: None,
        }
    }

    /// Extends this location into a range.
    pub fn with_end(mut self, end_line: usize, end_column: usize) -> Self {
        self.end_line = Some(end_line);
        self.end_column = Some(end_column);
        self
    }

    /// The `(file, line, column)` key used for dedup and variant coverage.
    pub fn key(&self) -> (&PathBuf, usize, usize) {
        (&self.file, self.line, self.column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// Severity attached to a pattern and inherited by its violations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational hint
    Hint,
    /// Informational finding
    Info,
    /// Deviation worth fixing
    Warning,
    /// Deviation that should block
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Hint => "hint",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// The closed set of pattern categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    /// Project structure and module layout
    Structural,
    /// UI component conventions
    Components,
    /// Styling conventions
    Styling,
    /// API shape: routes, envelopes, pagination
    Api,
    /// Authentication, RBAC, ownership
    Auth,
    /// Error handling conventions
    Errors,
    /// ORM usage and SQL access
    DataAccess,
    /// Test topology and tooling
    Testing,
    /// Logging transports and structure
    Logging,
    /// Secrets, crypto, injection surfaces
    Security,
    /// Configuration handling
    Config,
    /// Type-level conventions
    Types,
    /// Caching, memoization, hot paths
    Performance,
    /// Accessibility conventions
    Accessibility,
    /// Documentation conventions
    Documentation,
}

impl PatternCategory {
    /// All categories in their canonical order.
    pub const ALL: [PatternCategory; 15] = [
        PatternCategory::Structural,
        PatternCategory::Components,
        PatternCategory::Styling,
        PatternCategory::Api,
        PatternCategory::Auth,
        PatternCategory::Errors,
        PatternCategory::DataAccess,
        PatternCategory::Testing,
        PatternCategory::Logging,
        PatternCategory::Security,
        PatternCategory::Config,
        PatternCategory::Types,
        PatternCategory::Performance,
        PatternCategory::Accessibility,
        PatternCategory::Documentation,
    ];

    /// The stable kebab-case name used in ids and partition file names.
    pub fn as_str(self) -> &'static str {
        match self {
            PatternCategory::Structural => "structural",
            PatternCategory::Components => "components",
            PatternCategory::Styling => "styling",
            PatternCategory::Api => "api",
            PatternCategory::Auth => "auth",
            PatternCategory::Errors => "errors",
            PatternCategory::DataAccess => "data-access",
            PatternCategory::Testing => "testing",
            PatternCategory::Logging => "logging",
            PatternCategory::Security => "security",
            PatternCategory::Config => "config",
            PatternCategory::Types => "types",
            PatternCategory::Performance => "performance",
            PatternCategory::Accessibility => "accessibility",
            PatternCategory::Documentation => "documentation",
        }
    }

    /// Parses the kebab-case name back into a category.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a detector arrived at its matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// Full or partial syntax-tree analysis
    Ast,
    /// Regular-expression matching
    Regex,
    /// Name- and context-driven heuristics
    Semantic,
    /// Structural / layout analysis
    Structural,
    /// Project-defined custom detector
    Custom,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectionMethod::Ast => "ast",
            DetectionMethod::Regex => "regex",
            DetectionMethod::Semantic => "semantic",
            DetectionMethod::Structural => "structural",
            DetectionMethod::Custom => "custom",
        };
        write!(f, "{}", name)
    }
}
