//! Memoization / performance detector
//!
//! Finds framework memoization primitives and flags the two classic
//! misuses: an empty dependency array (memoizes forever) and inline
//! object/array dependencies (memoizes never).

use regex::Regex;
use std::sync::LazyLock;

use crate::language::Language;
use crate::model::{DetectionMethod, Outlier, PatternCategory, Severity};

use super::{
    DetectContext, DetectorMeta, DetectorOutput, FormObservation, OutlierEvidence,
    PatternEvidence,
};

static MEMO_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:useMemo|useCallback|React\.memo|memo)\s*\(|@lru_cache\b|@cached_property\b|@functools\.lru_cache\b"#)
        .expect("memo call regex")
});

static EMPTY_DEPS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:useMemo|useCallback|useEffect)\s*\([\s\S]{0,400}?,\s*\[\s*\]\s*\)"#)
        .expect("empty deps regex")
});

static INLINE_OBJECT_DEPS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:useMemo|useCallback|useEffect)\s*\([\s\S]{0,400}?,\s*\[[^\]]*[{\[][^\]]*\]\s*\)"#)
        .expect("inline object deps regex")
});

/// Detector for memoization hygiene.
#[derive(Debug)]
pub struct MemoizationDetector {
    /// Shared descriptor
    pub meta: DetectorMeta,
}

impl MemoizationDetector {
    /// Creates the detector with its catalogue descriptor.
    pub fn new() -> Self {
        Self {
            meta: DetectorMeta {
                id: "performance/memoization".into(),
                name: "Memoization".into(),
                description: "Framework memoization primitives and dependency-array misuse"
                    .into(),
                category: PatternCategory::Performance,
                subcategory: "memoization".into(),
                method: DetectionMethod::Regex,
                default_severity: Severity::Warning,
                languages: vec![
                    Language::TypeScript,
                    Language::JavaScript,
                    Language::Python,
                ],
                include_excluded_files: false,
            },
        }
    }

    /// Observe phase: memoization has no competing forms to count.
    pub fn observe(&self, _ctx: &DetectContext<'_>) -> Vec<FormObservation> {
        Vec::new()
    }

    /// Detect phase: evidence per healthy memo site, violations per misuse.
    /// A misused site is counter-evidence only; it never doubles as
    /// evidence at the same location.
    pub fn detect(&self, ctx: &DetectContext<'_>) -> DetectorOutput {
        let mut out = DetectorOutput::default();
        let mut misused = std::collections::HashSet::new();

        for (regex, reason, score) in [
            (
                &*EMPTY_DEPS,
                "empty dependency array: the memoized value never refreshes",
                0.8,
            ),
            (
                &*INLINE_OBJECT_DEPS,
                "inline object in dependency array defeats memoization",
                0.6,
            ),
        ] {
            for m in regex.find_iter(ctx.content) {
                if ctx.comments.contains(m.start()) || !misused.insert(m.start()) {
                    continue;
                }
                out.outliers.push(OutlierEvidence {
                    local_slug: "memo-usage".into(),
                    outlier: Outlier {
                        location: ctx.lines.location(ctx.path, m.start()),
                        reason: reason.into(),
                        deviation_score: score,
                        suggested_fix: None,
                    },
                });
            }
        }

        for m in MEMO_CALL.find_iter(ctx.content) {
            if ctx.comments.contains(m.start()) || misused.contains(&m.start()) {
                continue;
            }
            out.matches.push(PatternEvidence {
                local_slug: "memo-usage".into(),
                name: "Memoization usage".into(),
                description: "Expensive computations are memoized".into(),
                location: ctx.lines.location(ctx.path, m.start()),
            });
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testutil::run_detector;
    use crate::detectors::Detector;

    fn detector() -> Detector {
        Detector::Memoization(MemoizationDetector::new())
    }

    #[test]
    fn empty_deps_flagged() {
        let src = "const v = useMemo(() => compute(data), []);\n";
        let out = run_detector(&detector(), "src/App.tsx", src, Language::TypeScript);
        assert_eq!(out.outliers.len(), 1);
        assert!(out.outliers[0].outlier.reason.contains("empty dependency"));
    }

    #[test]
    fn inline_object_deps_flagged() {
        let src = "const v = useMemo(() => compute(a), [{ a }]);\n";
        let out = run_detector(&detector(), "src/App.tsx", src, Language::TypeScript);
        assert_eq!(out.outliers.len(), 1);
        assert!(out.outliers[0].outlier.reason.contains("inline object"));
    }

    #[test]
    fn healthy_memo_is_evidence_only() {
        let src = "const v = useMemo(() => compute(a, b), [a, b]);\n";
        let out = run_detector(&detector(), "src/App.tsx", src, Language::TypeScript);
        assert!(out.outliers.is_empty());
        assert_eq!(out.matches.len(), 1);
    }

    #[test]
    fn python_lru_cache_counts() {
        let src = "@lru_cache\ndef fib(n):\n    return n\n";
        let out = run_detector(&detector(), "app/math.py", src, Language::Python);
        assert_eq!(out.matches.len(), 1);
    }
}
