//! Error-handling convention detector
//!
//! Mines the dominant error style (thrown/raised exceptions vs wrapped
//! error envelopes) and flags the sites that mix styles or swallow errors
//! outright.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::{DetectionMethod, Outlier, PatternCategory, Severity};

use super::{
    DetectContext, DetectorMeta, DetectorOutput, FormObservation, OutlierEvidence,
    PatternEvidence,
};

static THROWN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bthrow\s+new\s+\w+|\braise\s+\w+|\bpanic!\s*\("#).expect("thrown regex")
});

static WRAPPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"return\s*\{\s*[^}]{0,120}\berror\b|\breturn\s+(?:Err|err)\b|->\s*Result<"#,
    )
    .expect("wrapped regex")
});

static SWALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"catch\s*(?:\([^)]*\))?\s*\{\s*\}|except[^\n:]*:\s*\n?\s*pass\b"#)
        .expect("swallowed regex")
});

/// Detector for error-handling style.
#[derive(Debug)]
pub struct ErrorHandlingDetector {
    /// Shared descriptor
    pub meta: DetectorMeta,
}

impl ErrorHandlingDetector {
    /// Creates the detector with its catalogue descriptor.
    pub fn new() -> Self {
        Self {
            meta: DetectorMeta {
                id: "errors/handling".into(),
                name: "Error handling".into(),
                description: "Dominant error style and sites that mix styles or swallow \
                              failures"
                    .into(),
                category: PatternCategory::Errors,
                subcategory: "handling".into(),
                method: DetectionMethod::Regex,
                default_severity: Severity::Warning,
                languages: Vec::new(),
                include_excluded_files: false,
            },
        }
    }

    fn sites(&self, ctx: &DetectContext<'_>) -> Vec<(usize, &'static str)> {
        let mut sites = Vec::new();
        for m in THROWN.find_iter(ctx.content) {
            if !ctx.comments.contains(m.start()) {
                sites.push((m.start(), "thrown"));
            }
        }
        for m in WRAPPED.find_iter(ctx.content) {
            if !ctx.comments.contains(m.start()) {
                sites.push((m.start(), "wrapped"));
            }
        }
        sites.sort_by_key(|&(offset, _)| offset);
        sites
    }

    /// Observe phase: count thrown vs wrapped sites.
    pub fn observe(&self, ctx: &DetectContext<'_>) -> Vec<FormObservation> {
        self.sites(ctx)
            .into_iter()
            .map(|(_, form)| FormObservation {
                key: "error-style".into(),
                form: form.into(),
            })
            .collect()
    }

    /// Detect phase: evidence for the dominant style, outliers for mixed
    /// styles and swallowed errors.
    pub fn detect(&self, ctx: &DetectContext<'_>) -> DetectorOutput {
        let mut out = DetectorOutput::default();

        let dominant = ctx.summary.dominant("error-style", &["wrapped", "thrown"]);
        if let Some((dominant_form, _)) = &dominant {
            for (offset, form) in self.sites(ctx) {
                if form == dominant_form {
                    out.matches.push(PatternEvidence {
                        local_slug: "error-style".into(),
                        name: "Error style".into(),
                        description: format!("Failures are {} consistently", dominant_form),
                        location: ctx.lines.location(ctx.path, offset),
                    });
                } else {
                    out.outliers.push(OutlierEvidence {
                        local_slug: "error-style".into(),
                        outlier: Outlier {
                            location: ctx.lines.location(ctx.path, offset),
                            reason: format!(
                                "{} error mixed into a {} project",
                                form, dominant_form
                            ),
                            deviation_score: 0.5,
                            suggested_fix: None,
                        },
                    });
                }
            }
        }

        for m in SWALLOWED.find_iter(ctx.content) {
            if ctx.comments.contains(m.start()) {
                continue;
            }
            out.outliers.push(OutlierEvidence {
                local_slug: "swallowed-error".into(),
                outlier: Outlier {
                    location: ctx.lines.location(ctx.path, m.start()),
                    reason: "error is caught and silently discarded".into(),
                    deviation_score: 0.9,
                    suggested_fix: None,
                },
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
    use crate::language::Language;

    fn detector() -> Detector {
        Detector::ErrorHandling(ErrorHandlingDetector::new())
    }

    #[test]
    fn mixed_styles_are_flagged_against_dominance() {
        let src = r#"
function a() { return { data: null, error: 'nope' }; }
function b() { return { data: null, error: 'still no' }; }
function c() { throw new ValidationError('bad'); }
"#;
        let out = run_detector(&detector(), "src/svc.ts", src, Language::TypeScript);
        assert_eq!(out.matches.len(), 2);
        assert_eq!(out.outliers.len(), 1);
        assert!(out.outliers[0].outlier.reason.contains("thrown"));
    }

    #[test]
    fn empty_catch_is_always_flagged() {
        let src = "try { risky(); } catch (e) {}\n";
        let out = run_detector(&detector(), "src/svc.ts", src, Language::TypeScript);
        assert!(out
            .outliers
            .iter()
            .any(|o| o.local_slug == "swallowed-error"));
    }

    #[test]
    fn python_except_pass_is_flagged() {
        let src = "try:\n    risky()\nexcept ValueError:\n    pass\n";
        let out = run_detector(&detector(), "app/svc.py", src, Language::Python);
        assert!(out
            .outliers
            .iter()
            .any(|o| o.local_slug == "swallowed-error"));
    }
}
