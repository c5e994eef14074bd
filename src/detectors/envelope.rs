//! Response envelope detector
//!
//! Classifies the shapes handlers respond with (standard `{data, error}`,
//! JSON:API, HAL, GraphQL, custom objects, raw values) and the pagination
//! convention in use, then flags responses that break the dominant shape.

use regex::Regex;
use std::sync::LazyLock;

use crate::language::Language;
use crate::model::{DetectionMethod, Outlier, PatternCategory, Severity};

use super::{
    DetectContext, DetectorMeta, DetectorOutput, FormObservation, OutlierEvidence,
    PatternEvidence,
};

static RESPONSE_SITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(?:res|response|reply)\s*(?:\.status\s*\([^)]*\))?\s*\.\s*(?:json|send)\s*\(|\bjsonify\s*\(|\bNextResponse\.json\s*\("#,
    )
    .expect("response site regex")
});

static OBJECT_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']?([A-Za-z_][A-Za-z0-9_]*)["']?\s*:"#).expect("object key regex")
});

static LINK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:\.set|\.header|headers\[)\s*\(?\s*["']Link["']"#).expect("link header regex")
});

/// Envelope families a response site can exhibit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvelopeShape {
    Standard,
    JsonApi,
    Hal,
    GraphQl,
    Custom,
    Direct,
    Array,
}

impl EnvelopeShape {
    fn form(self) -> &'static str {
        match self {
            EnvelopeShape::Standard => "standard",
            EnvelopeShape::JsonApi => "jsonapi",
            EnvelopeShape::Hal => "hal",
            EnvelopeShape::GraphQl => "graphql",
            EnvelopeShape::Custom => "custom",
            EnvelopeShape::Direct => "direct",
            EnvelopeShape::Array => "array",
        }
    }

    fn is_envelope(self) -> bool {
        matches!(
            self,
            EnvelopeShape::Standard
                | EnvelopeShape::JsonApi
                | EnvelopeShape::Hal
                | EnvelopeShape::GraphQl
        )
    }
}

#[derive(Debug)]
struct ResponseSite {
    offset: usize,
    shape: EnvelopeShape,
    pagination: Option<&'static str>,
}

/// Takes the argument text of a response call: from the opening paren to the
/// balanced close, capped so pathological files stay cheap.
fn argument_text(content: &str, open_paren_end: usize) -> &str {
    let rest = &content[open_paren_end..];
    let cap = rest.len().min(600);
    let mut depth = 1i32;
    for (i, ch) in rest.char_indices().take(cap) {
        match ch {
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return &rest[..i];
                }
            }
            _ => {}
        }
    }
    &rest[..cap]
}

fn classify(argument: &str) -> EnvelopeShape {
    let trimmed = argument.trim_start();
    if trimmed.starts_with('[') {
        return EnvelopeShape::Array;
    }
    if !trimmed.starts_with('{') {
        return EnvelopeShape::Direct;
    }
    let keys: Vec<String> = OBJECT_KEY
        .captures_iter(trimmed)
        .map(|c| c[1].to_string())
        .collect();
    let has = |k: &str| keys.iter().any(|key| key == k);

    if has("_links") || has("_embedded") {
        EnvelopeShape::Hal
    } else if has("attributes") && has("type") {
        EnvelopeShape::JsonApi
    } else if has("data") && has("errors") {
        EnvelopeShape::GraphQl
    } else if has("data") {
        EnvelopeShape::Standard
    } else {
        EnvelopeShape::Custom
    }
}

fn pagination_shape(argument: &str) -> Option<&'static str> {
    let lower = argument.to_ascii_lowercase();
    let has = |needle: &str| lower.contains(needle);
    if has("cursor") {
        Some("cursor")
    } else if has("offset") && has("limit") {
        Some("offset")
    } else if has("page") && (has("perpage") || has("per_page") || has("pagesize") || has("page_size") || has("totalpages") || has("total_pages"))
    {
        Some("page")
    } else {
        None
    }
}

/// Detector for response envelope and pagination conventions.
#[derive(Debug)]
pub struct ResponseEnvelopeDetector {
    /// Shared descriptor
    pub meta: DetectorMeta,
}

impl ResponseEnvelopeDetector {
    /// Creates the detector with its catalogue descriptor.
    pub fn new() -> Self {
        Self {
            meta: DetectorMeta {
                id: "api/response-envelope".into(),
                name: "Response envelope".into(),
                description: "Envelope and pagination shapes of handler responses".into(),
                category: PatternCategory::Api,
                subcategory: "response-envelope".into(),
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

    fn extract(&self, ctx: &DetectContext<'_>) -> Vec<ResponseSite> {
        let mut sites = Vec::new();
        for m in RESPONSE_SITE.find_iter(ctx.content) {
            if ctx.comments.contains(m.start()) {
                continue;
            }
            let argument = argument_text(ctx.content, m.end());
            sites.push(ResponseSite {
                offset: m.start(),
                shape: classify(argument),
                pagination: pagination_shape(argument),
            });
        }
        sites
    }

    /// Observe phase: count envelope and pagination forms.
    pub fn observe(&self, ctx: &DetectContext<'_>) -> Vec<FormObservation> {
        let mut observations = Vec::new();
        for site in self.extract(ctx) {
            observations.push(FormObservation {
                key: "envelope-shape".into(),
                form: site.shape.form().into(),
            });
            if let Some(shape) = site.pagination {
                observations.push(FormObservation {
                    key: "pagination-shape".into(),
                    form: shape.into(),
                });
            }
        }
        if LINK_HEADER.is_match(ctx.content) {
            observations.push(FormObservation {
                key: "pagination-shape".into(),
                form: "link".into(),
            });
        }
        observations
    }

    /// Detect phase: flag raw arrays, mixed envelopes, and missing `data`
    /// keys relative to the dominant shape.
    pub fn detect(&self, ctx: &DetectContext<'_>) -> DetectorOutput {
        let sites = self.extract(ctx);
        let mut out = DetectorOutput::default();
        if sites.is_empty() {
            return out;
        }

        let dominant_envelope = ctx.summary.dominant(
            "envelope-shape",
            &["standard", "jsonapi", "hal", "graphql", "direct", "array", "custom"],
        );
        let dominant_pagination = ctx
            .summary
            .dominant("pagination-shape", &["offset", "cursor", "page", "link"]);

        for site in &sites {
            self.check_envelope(ctx, site, dominant_envelope.as_ref(), &mut out);
            self.check_pagination(ctx, site, dominant_pagination.as_ref(), &mut out);
        }
        out
    }

    fn check_envelope(
        &self,
        ctx: &DetectContext<'_>,
        site: &ResponseSite,
        dominant: Option<&(String, usize)>,
        out: &mut DetectorOutput,
    ) {
        let Some((dominant_form, _)) = dominant else {
            return;
        };
        let dominant_is_envelope = ["standard", "jsonapi", "hal", "graphql"]
            .contains(&dominant_form.as_str());
        let form = site.shape.form();

        if form == dominant_form {
            out.matches.push(PatternEvidence {
                local_slug: "envelope-shape".into(),
                name: "Response envelope".into(),
                description: format!("Responses use the {} envelope", dominant_form),
                location: ctx.lines.location(ctx.path, site.offset),
            });
            return;
        }

        let (slug, reason, score) = match site.shape {
            EnvelopeShape::Array if dominant_is_envelope => (
                "raw-data-response",
                format!(
                    "raw array response where the dominant format is {}",
                    dominant_form
                ),
                0.8,
            ),
            EnvelopeShape::Direct if dominant_is_envelope => (
                "raw-data-response",
                format!(
                    "unwrapped response where the dominant format is {}",
                    dominant_form
                ),
                0.6,
            ),
            EnvelopeShape::Custom if dominant_form == "standard" => (
                "missing-data-field",
                "response object is missing the conventional 'data' field".to_string(),
                0.5,
            ),
            shape if shape.is_envelope() && dominant_is_envelope => (
                "mixed-envelope",
                format!(
                    "{} envelope mixed into a {} project",
                    shape.form(),
                    dominant_form
                ),
                0.7,
            ),
            _ => return,
        };
        out.outliers.push(OutlierEvidence {
            local_slug: "envelope-shape".into(),
            outlier: Outlier {
                location: ctx.lines.location(ctx.path, site.offset),
                reason: format!("{}: {}", slug, reason),
                deviation_score: score,
                suggested_fix: None,
            },
        });
    }

    fn check_pagination(
        &self,
        ctx: &DetectContext<'_>,
        site: &ResponseSite,
        dominant: Option<&(String, usize)>,
        out: &mut DetectorOutput,
    ) {
        let Some(shape) = site.pagination else {
            return;
        };
        let Some((dominant_form, _)) = dominant else {
            return;
        };
        if shape == dominant_form {
            out.matches.push(PatternEvidence {
                local_slug: "pagination-shape".into(),
                name: "Pagination shape".into(),
                description: format!("Paginated responses use {} pagination", dominant_form),
                location: ctx.lines.location(ctx.path, site.offset),
            });
        } else {
            out.outliers.push(OutlierEvidence {
                local_slug: "pagination-shape".into(),
                outlier: Outlier {
                    location: ctx.lines.location(ctx.path, site.offset),
                    reason: format!(
                        "{} pagination mixed into a {} project",
                        shape, dominant_form
                    ),
                    deviation_score: 0.5,
                    suggested_fix: None,
                },
            });
        }
    }
}
