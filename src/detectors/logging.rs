//! Logging convention detector
//!
//! Mines the dominant logging transport (structured logger vs bare
//! console/print) and flags stragglers plus log lines that leak obviously
//! sensitive values.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::{DetectionMethod, Outlier, PatternCategory, Severity};

use super::{
    DetectContext, DetectorMeta, DetectorOutput, FormObservation, OutlierEvidence,
    PatternEvidence,
};

static STRUCTURED_LOG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(?:logger|log)\.(?:trace|debug|info|warn|warning|error|fatal|child)\s*\(|\blogging\.getLogger\b|\btracing::(?:trace|debug|info|warn|error)!"#,
    )
    .expect("structured log regex")
});

static BARE_LOG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bconsole\.(?:log|info|warn|error|debug)\s*\(|(?m)^\s*print\s*\("#)
        .expect("bare log regex")
});

static SENSITIVE_IN_LOG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(?:logger|log|console)\.\w+\s*\([^)\n]{0,160}\b(?:password|passwd|secret|token|api_key|apiKey|ssn|credit_card|creditCard)\b"#,
    )
    .expect("sensitive log regex")
});

/// Detector for logging structure.
#[derive(Debug)]
pub struct LoggingDetector {
    /// Shared descriptor
    pub meta: DetectorMeta,
}

impl LoggingDetector {
    /// Creates the detector with its catalogue descriptor.
    pub fn new() -> Self {
        Self {
            meta: DetectorMeta {
                id: "logging/structure".into(),
                name: "Logging structure".into(),
                description: "Dominant logging transport and sensitive values in log lines"
                    .into(),
                category: PatternCategory::Logging,
                subcategory: "structure".into(),
                method: DetectionMethod::Regex,
                default_severity: Severity::Info,
                languages: Vec::new(),
                include_excluded_files: false,
            },
        }
    }

    /// Observe phase: count structured vs bare transports.
    pub fn observe(&self, ctx: &DetectContext<'_>) -> Vec<FormObservation> {
        let mut observations = Vec::new();
        for m in STRUCTURED_LOG.find_iter(ctx.content) {
            if !ctx.comments.contains(m.start()) {
                observations.push(FormObservation {
                    key: "log-transport".into(),
                    form: "structured".into(),
                });
            }
        }
        for m in BARE_LOG.find_iter(ctx.content) {
            if !ctx.comments.contains(m.start()) {
                observations.push(FormObservation {
                    key: "log-transport".into(),
                    form: "console".into(),
                });
            }
        }
        observations
    }

    /// Detect phase: bare calls are outliers when a structured transport
    /// dominates; sensitive values in log lines are always outliers.
    pub fn detect(&self, ctx: &DetectContext<'_>) -> DetectorOutput {
        let mut out = DetectorOutput::default();
        let dominant = ctx
            .summary
            .dominant("log-transport", &["structured", "console"]);

        if let Some((dominant_form, _)) = &dominant {
            for m in STRUCTURED_LOG.find_iter(ctx.content) {
                if ctx.comments.contains(m.start()) {
                    continue;
                }
                if dominant_form == "structured" {
                    out.matches.push(PatternEvidence {
                        local_slug: "log-transport".into(),
                        name: "Logging transport".into(),
                        description: "Logs go through the structured logger".into(),
                        location: ctx.lines.location(ctx.path, m.start()),
                    });
                }
            }
            if dominant_form == "structured" {
                for m in BARE_LOG.find_iter(ctx.content) {
                    if ctx.comments.contains(m.start()) {
                        continue;
                    }
                    out.outliers.push(OutlierEvidence {
                        local_slug: "log-transport".into(),
                        outlier: Outlier {
                            location: ctx.lines.location(ctx.path, m.start()),
                            reason: "bare console/print call where a structured logger is the \
                                     convention"
                                .into(),
                            deviation_score: 0.5,
                            suggested_fix: None,
                        },
                    });
                }
            }
        }

        for m in SENSITIVE_IN_LOG.find_iter(ctx.content) {
            if ctx.comments.contains(m.start()) {
                continue;
            }
            out.outliers.push(OutlierEvidence {
                local_slug: "sensitive-value".into(),
                outlier: Outlier {
                    location: ctx.lines.location(ctx.path, m.start()),
                    reason: "log line references a credential-like value".into(),
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
        Detector::LoggingStructure(LoggingDetector::new())
    }

    #[test]
    fn bare_console_flagged_when_structured_dominates() {
        let src = r#"
logger.info('starting');
logger.warn('careful');
console.log('debugging');
"#;
        let out = run_detector(&detector(), "src/boot.ts", src, Language::TypeScript);
        assert_eq!(out.matches.len(), 2);
        assert_eq!(
            out.outliers
                .iter()
                .filter(|o| o.local_slug == "log-transport")
                .count(),
            1
        );
    }

    #[test]
    fn console_only_projects_are_not_flagged() {
        let src = "console.log('a');\nconsole.log('b');\n";
        let out = run_detector(&detector(), "src/boot.ts", src, Language::TypeScript);
        assert!(out.outliers.is_empty());
    }

    #[test]
    fn credentials_in_logs_always_flagged() {
        let src = "logger.info('user token ' + token);\n";
        let out = run_detector(&detector(), "src/auth.ts", src, Language::TypeScript);
        assert!(out
            .outliers
            .iter()
            .any(|o| o.local_slug == "sensitive-value"));
    }
}
