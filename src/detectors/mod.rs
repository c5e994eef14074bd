//! Detector catalogue
//!
//! A detector takes `(content, path, language, project summary)` and emits
//! pattern evidence plus outliers. Detection happens in two phases: an
//! `observe` pass counts the competing forms a file exhibits, the scanner
//! folds those counts into a [`ProjectSummary`], and the `detect` pass uses
//! the summary to decide dominance and flag only non-dominant occurrences.
//!
//! Universal rules every detector obeys:
//!
//! - matches inside comments are discarded (see [`CommentMap`])
//! - test/spec/story/declaration and vendored files are skipped unless the
//!   detector opts in
//! - below two matching occurrences no violations are emitted
//! - per-file confidence is `1 - violations/matches`, or `0.5` with no
//!   matches
//! - match lists are capped per file and flagged `truncated` beyond the cap
//!
//! Detectors are deterministic and never perform I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::language::Language;
use crate::model::{DetectionMethod, Location, Outlier, PatternCategory, Severity};

mod comments;

pub mod auth;
pub mod envelope;
pub mod errors;
pub mod logging;
pub mod perf;
pub mod routes;

pub use comments::CommentMap;

/// Shared descriptor every detector carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorMeta {
    /// Unique id: `category/subcategory` segments, kebab-case
    pub id: String,
    /// Human name
    pub name: String,
    /// What the detector mines
    pub description: String,
    /// Category of the patterns it emits
    pub category: PatternCategory,
    /// Subcategory of the patterns it emits
    pub subcategory: String,
    /// How it detects
    pub method: DetectionMethod,
    /// Severity its patterns default to
    pub default_severity: Severity,
    /// Languages the detector understands
    pub languages: Vec<Language>,
    /// Whether the detector opts in to excluded (test/vendored) files
    #[serde(default)]
    pub include_excluded_files: bool,
}

/// One counted observation of a competing form, keyed so the scanner can
/// aggregate dominance project-wide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormObservation {
    /// Which competition this belongs to ("url-casing", "envelope-shape", …)
    pub key: String,
    /// The observed form ("kebab", "camel", "standard", …)
    pub form: String,
}

/// Project-wide aggregation handed to the `detect` phase.
#[derive(Debug, Clone, Default)]
pub struct ProjectSummary {
    /// Total files in scan scope
    pub total_files: usize,
    /// competition key -> form -> occurrence count
    pub form_counts: HashMap<String, HashMap<String, usize>>,
}

impl ProjectSummary {
    /// Folds one file's observations into the summary.
    pub fn absorb(&mut self, observations: &[FormObservation]) {
        for obs in observations {
            *self
                .form_counts
                .entry(obs.key.clone())
                .or_default()
                .entry(obs.form.clone())
                .or_insert(0) += 1;
        }
    }

    /// Total occurrences recorded for a competition key.
    pub fn total_for(&self, key: &str) -> usize {
        self.form_counts
            .get(key)
            .map(|forms| forms.values().sum())
            .unwrap_or(0)
    }

    /// The dominant form for a competition key.
    ///
    /// Ties break by `preferred` order; a form must have at least
    /// [`MIN_EVIDENCE`] occurrences to dominate, otherwise `None` and no
    /// violations are emitted for the competition.
    pub fn dominant(&self, key: &str, preferred: &[&str]) -> Option<(String, usize)> {
        let forms = self.form_counts.get(key)?;
        let best_count = *forms.values().max()?;
        if best_count < MIN_EVIDENCE {
            return None;
        }
        let mut winners: Vec<&str> = forms
            .iter()
            .filter(|(_, &count)| count == best_count)
            .map(|(form, _)| form.as_str())
            .collect();
        winners.sort_unstable(); // deterministic fallback when not in `preferred`
        let winner = preferred
            .iter()
            .find(|p| winners.contains(p))
            .copied()
            .or_else(|| winners.first().copied())?;
        Some((winner.to_string(), best_count))
    }
}

/// Minimum occurrences of a form before violations are emitted against it.
pub const MIN_EVIDENCE: usize = 2;

/// Byte-offset to line/column translation for one file.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the start of each line
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Indexes `content` once.
    pub fn build(content: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// 1-based `(line, column)` for a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }

    /// Builds a [`Location`] for a byte offset.
    pub fn location(&self, path: &Path, offset: usize) -> Location {
        let (line, column) = self.line_col(offset);
        Location::new(path.to_path_buf(), line, column)
    }
}

/// Everything a detector sees for one file.
#[derive(Debug)]
pub struct DetectContext<'a> {
    /// File content
    pub content: &'a str,
    /// Path relative to the project root
    pub path: &'a Path,
    /// Detected language
    pub language: Language,
    /// Precomputed in-comment predicate
    pub comments: &'a CommentMap,
    /// Precomputed line index
    pub lines: &'a LineIndex,
    /// Project-wide dominance summary (empty during the observe phase)
    pub summary: &'a ProjectSummary,
    /// Per-file match cap; beyond it output is truncated
    pub max_matches: usize,
    /// Scan timestamp; detectors must not read the clock themselves
    pub now: DateTime<Utc>,
}

/// Evidence that one location follows a convention.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternEvidence {
    /// Local slug, appended to the detector id to form the pattern id
    pub local_slug: String,
    /// Pattern human name
    pub name: String,
    /// Pattern description
    pub description: String,
    /// Where the evidence sits
    pub location: Location,
}

/// Counter-evidence emitted against a pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierEvidence {
    /// Local slug of the pattern being deviated from
    pub local_slug: String,
    /// The deviation record
    pub outlier: Outlier,
}

/// The uniform result of one `detect` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorOutput {
    /// Evidence for the file
    pub matches: Vec<PatternEvidence>,
    /// Counter-evidence for the file
    pub outliers: Vec<OutlierEvidence>,
    /// Per-file confidence, `1 - violations/matches` clamped to `[0, 1]`
    pub confidence: f64,
    /// Whether the per-file cap cut the match list short
    pub truncated: bool,
}

impl DetectorOutput {
    /// Computes the per-file confidence from the evidence counts and caps
    /// the match list at `max_matches`.
    pub fn finalize(mut self, max_matches: usize) -> Self {
        if self.matches.len() > max_matches {
            self.matches.truncate(max_matches);
            self.truncated = true;
        }
        self.confidence = per_file_confidence(self.matches.len(), self.outliers.len());
        self
    }
}

/// `1 - violations/matches` clamped to `[0, 1]`, or `0.5` with no matches.
pub fn per_file_confidence(matches: usize, violations: usize) -> f64 {
    if matches == 0 {
        return 0.5;
    }
    (1.0 - violations as f64 / matches as f64).clamp(0.0, 1.0)
}

/// Whether a path is excluded from detection by default: tests, specs,
/// stories, type declarations, and vendored trees.
pub fn is_excluded_file(path: &Path) -> bool {
    let p = path.to_string_lossy().replace('\\', "/");
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    p.split('/').any(|seg| {
        matches!(
            seg,
            "node_modules" | "vendor" | "__tests__" | "__mocks__" | "testdata" | "fixtures"
        )
    }) || name.ends_with(".test.ts")
        || name.ends_with(".test.tsx")
        || name.ends_with(".test.js")
        || name.ends_with(".test.jsx")
        || name.ends_with(".spec.ts")
        || name.ends_with(".spec.tsx")
        || name.ends_with(".spec.js")
        || name.ends_with(".stories.ts")
        || name.ends_with(".stories.tsx")
        || name.ends_with(".d.ts")
        || name.starts_with("test_") && name.ends_with(".py")
        || name.ends_with("_test.py")
        || name.ends_with("_test.go")
        || name.ends_with("_spec.rb")
}

/// The sealed set of shipped detectors.
///
/// Each variant wraps one convention miner; dispatch is by match, not by
/// virtual call, so the set is closed and exhaustively handled everywhere.
#[derive(Debug)]
pub enum Detector {
    /// Route declarations: casing, plurality, versioning, nesting
    RouteStructure(routes::RouteStructureDetector),
    /// Response envelope and pagination shapes
    ResponseEnvelope(envelope::ResponseEnvelopeDetector),
    /// Auth primitives: roles, ownership, tenant scoping
    AccessControl(auth::AccessControlDetector),
    /// Error handling style
    ErrorHandling(errors::ErrorHandlingDetector),
    /// Memoization and dependency-array hygiene
    Memoization(perf::MemoizationDetector),
    /// Logging transport structure
    LoggingStructure(logging::LoggingDetector),
}

impl Detector {
    /// The descriptor for this detector.
    pub fn meta(&self) -> &DetectorMeta {
        match self {
            Detector::RouteStructure(d) => &d.meta,
            Detector::ResponseEnvelope(d) => &d.meta,
            Detector::AccessControl(d) => &d.meta,
            Detector::ErrorHandling(d) => &d.meta,
            Detector::Memoization(d) => &d.meta,
            Detector::LoggingStructure(d) => &d.meta,
        }
    }

    /// Whether this detector runs for the given file at all. An empty
    /// language list means every supported language, never `Other`.
    pub fn applies_to(&self, path: &Path, language: Language) -> bool {
        let meta = self.meta();
        if meta.languages.is_empty() {
            if language == Language::Other {
                return false;
            }
        } else if !meta.languages.contains(&language) {
            return false;
        }
        meta.include_excluded_files || !is_excluded_file(path)
    }

    /// Observe phase: count competing forms without judging them.
    pub fn observe(&self, ctx: &DetectContext<'_>) -> Vec<FormObservation> {
        match self {
            Detector::RouteStructure(d) => d.observe(ctx),
            Detector::ResponseEnvelope(d) => d.observe(ctx),
            Detector::AccessControl(d) => d.observe(ctx),
            Detector::ErrorHandling(d) => d.observe(ctx),
            Detector::Memoization(d) => d.observe(ctx),
            Detector::LoggingStructure(d) => d.observe(ctx),
        }
    }

    /// Detect phase: emit evidence and outliers using the project summary
    /// for dominance.
    pub fn detect(&self, ctx: &DetectContext<'_>) -> DetectorOutput {
        let out = match self {
            Detector::RouteStructure(d) => d.detect(ctx),
            Detector::ResponseEnvelope(d) => d.detect(ctx),
            Detector::AccessControl(d) => d.detect(ctx),
            Detector::ErrorHandling(d) => d.detect(ctx),
            Detector::Memoization(d) => d.detect(ctx),
            Detector::LoggingStructure(d) => d.detect(ctx),
        };
        out.finalize(ctx.max_matches)
    }

    /// Builds the full shipped catalogue.
    pub fn default_catalogue() -> Vec<Detector> {
        vec![
            Detector::RouteStructure(routes::RouteStructureDetector::new()),
            Detector::ResponseEnvelope(envelope::ResponseEnvelopeDetector::new()),
            Detector::AccessControl(auth::AccessControlDetector::new()),
            Detector::ErrorHandling(errors::ErrorHandlingDetector::new()),
            Detector::Memoization(perf::MemoizationDetector::new()),
            Detector::LoggingStructure(logging::LoggingDetector::new()),
        ]
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Runs observe+detect for a single file with itself as the whole
    /// project, the way most detector unit tests want.
    pub fn run_detector(
        detector: &Detector,
        path: &str,
        content: &str,
        language: Language,
    ) -> DetectorOutput {
        let comments = CommentMap::build(content, language);
        let lines = LineIndex::build(content);
        let mut summary = ProjectSummary {
            total_files: 1,
            ..Default::default()
        };
        let now = Utc::now();
        let path = Path::new(path);
        {
            let ctx = DetectContext {
                content,
                path,
                language,
                comments: &comments,
                lines: &lines,
                summary: &ProjectSummary::default(),
                max_matches: 10_000,
                now,
            };
            let observations = detector.observe(&ctx);
            summary.absorb(&observations);
        }
        let ctx = DetectContext {
            content,
            path,
            language,
            comments: &comments,
            lines: &lines,
            summary: &summary,
            max_matches: 10_000,
            now,
        };
        detector.detect(&ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_formula() {
        assert_eq!(per_file_confidence(0, 0), 0.5);
        assert_eq!(per_file_confidence(4, 1), 0.75);
        assert_eq!(per_file_confidence(2, 4), 0.0);
    }

    #[test]
    fn excluded_files() {
        assert!(is_excluded_file(Path::new("src/user.test.ts")));
        assert!(is_excluded_file(Path::new("src/user.spec.ts")));
        assert!(is_excluded_file(Path::new("src/Button.stories.tsx")));
        assert!(is_excluded_file(Path::new("types/global.d.ts")));
        assert!(is_excluded_file(Path::new("vendor/lib/x.js")));
        assert!(is_excluded_file(Path::new("tests/test_models.py")));
        assert!(!is_excluded_file(Path::new("src/user.service.ts")));
    }

    #[test]
    fn dominance_needs_min_evidence() {
        let mut summary = ProjectSummary::default();
        summary.absorb(&[FormObservation {
            key: "url-casing".into(),
            form: "kebab".into(),
        }]);
        assert_eq!(summary.dominant("url-casing", &["kebab"]), None);

        summary.absorb(&[
            FormObservation {
                key: "url-casing".into(),
                form: "kebab".into(),
            },
            FormObservation {
                key: "url-casing".into(),
                form: "camel".into(),
            },
        ]);
        assert_eq!(
            summary.dominant("url-casing", &["kebab", "camel"]),
            Some(("kebab".into(), 2))
        );
    }

    #[test]
    fn dominance_tie_breaks_by_preferred_order() {
        let mut summary = ProjectSummary::default();
        for form in ["camel", "camel", "kebab", "kebab"] {
            summary.absorb(&[FormObservation {
                key: "url-casing".into(),
                form: form.into(),
            }]);
        }
        assert_eq!(
            summary.dominant("url-casing", &["kebab", "camel"]),
            Some(("kebab".into(), 2))
        );
    }

    #[test]
    fn line_index_round_trip() {
        let src = "first\nsecond line\nthird";
        let idx = LineIndex::build(src);
        assert_eq!(idx.line_col(0), (1, 1));
        assert_eq!(idx.line_col(src.find("second").unwrap()), (2, 1));
        assert_eq!(idx.line_col(src.find("line").unwrap()), (2, 8));
        assert_eq!(idx.line_col(src.find("third").unwrap()), (3, 1));
    }
}
